// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Undirected currency graph for multi-hop conversions.
//!
//! Every stored pair becomes an edge usable in both directions: forward with
//! the stored rate, backward with its inverse. Breadth-first search finds the
//! path with the fewest intermediate currencies. That is not necessarily the
//! numerically most precise composition, which is an accepted approximation.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::ExchangeRate;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphPath {
    /// Currencies visited, including both endpoints
    pub currencies: Vec<String>,
    /// Product of the edge factors along the path
    pub factor: f64,
}

#[derive(Debug, Default)]
pub struct RateGraph {
    adjacency: HashMap<String, Vec<(String, f64)>>,
}

impl RateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rates(rates: &[ExchangeRate]) -> Self {
        let mut graph = Self::new();
        for rate in rates {
            graph.add_rate(&rate.from_currency, &rate.to_currency, rate.rate);
        }
        graph
    }

    pub fn add_rate(&mut self, from_currency: &str, to_currency: &str, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 || from_currency == to_currency {
            return;
        }
        self.adjacency
            .entry(from_currency.to_string())
            .or_default()
            .push((to_currency.to_string(), rate));
        self.adjacency
            .entry(to_currency.to_string())
            .or_default()
            .push((from_currency.to_string(), 1.0 / rate));
    }

    pub fn contains(&self, currency: &str) -> bool {
        self.adjacency.contains_key(currency)
    }

    pub fn currency_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Fewest-hop path between two currencies, if one exists
    pub fn shortest_path(&self, from_currency: &str, to_currency: &str) -> Option<GraphPath> {
        if from_currency == to_currency {
            return Some(GraphPath {
                currencies: vec![from_currency.to_string()],
                factor: 1.0,
            });
        }
        if !self.contains(from_currency) || !self.contains(to_currency) {
            return None;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, Vec<&str>, f64)> = VecDeque::new();
        visited.insert(from_currency);
        queue.push_back((from_currency, vec![from_currency], 1.0));

        while let Some((current, path, factor)) = queue.pop_front() {
            let Some(neighbors) = self.adjacency.get(current) else {
                continue;
            };
            for (neighbor, edge) in neighbors {
                if !visited.insert(neighbor.as_str()) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(neighbor.as_str());
                let next_factor = factor * edge;

                if neighbor == to_currency {
                    return Some(GraphPath {
                        currencies: next_path.into_iter().map(str::to_string).collect(),
                        factor: next_factor,
                    });
                }
                queue.push_back((neighbor.as_str(), next_path, next_factor));
            }
        }

        None
    }
}
