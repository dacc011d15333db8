// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Currency normalization engine
//!
//! Resolves a conversion factor between two currencies for a date by trying an
//! ordered chain of strategies, first success wins:
//! - identity
//! - direct stored rate
//! - reverse stored rate (inverted)
//! - two hops through the base currency
//! - breadth-first search over every known pair
//! - external fetch, bounded by a timeout
//! - static table of common pairs
//!
//! Rates found by the graph search, the external fetch or the static table are
//! written back to the rate store so repeated lookups stay cheap.

use anyhow::Result as AnyResult;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::RateFetcher;
use crate::currencies::{RateStore, static_rate};
use crate::error::{BenchmarkError, Result};
use crate::models::{ExchangeRate, RateSource};
use crate::rate_graph::RateGraph;

pub const DEFAULT_BASE_CURRENCY: &str = "EUR";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// How a conversion factor was obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionPath {
    Identity,
    Direct { effective_date: NaiveDate },
    Reverse { effective_date: NaiveDate },
    BaseHop { via: String },
    Graph { currencies: Vec<String> },
    Fetched { effective_date: NaiveDate },
    StaticTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub rate: f64,
    pub path: ResolutionPath,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub converted_amount: f64,
    pub rate_used: f64,
    pub resolution_path: ResolutionPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Identity,
    Direct,
    Reverse,
    BaseHop,
    Graph,
    ExternalFetch,
    StaticTable,
}

impl Strategy {
    /// Priority order of the fallback chain
    pub const CHAIN: [Strategy; 7] = [
        Strategy::Identity,
        Strategy::Direct,
        Strategy::Reverse,
        Strategy::BaseHop,
        Strategy::Graph,
        Strategy::ExternalFetch,
        Strategy::StaticTable,
    ];
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Clone)]
pub struct CurrencyNormalizer {
    store: Arc<dyn RateStore>,
    fetcher: Arc<dyn RateFetcher>,
    base_currency: String,
    fetch_timeout: Duration,
}

impl CurrencyNormalizer {
    pub fn new(store: Arc<dyn RateStore>, fetcher: Arc<dyn RateFetcher>) -> Self {
        Self {
            store,
            fetcher,
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_base_currency(mut self, base_currency: &str) -> Self {
        self.base_currency = normalize_code(base_currency);
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn store(&self) -> &Arc<dyn RateStore> {
        &self.store
    }

    /// Convert an amount, reporting the rate and the strategy that produced it
    pub async fn convert(
        &self,
        amount: f64,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Conversion> {
        let resolution = self.resolve_rate(from_currency, to_currency, as_of).await?;
        Ok(Conversion {
            converted_amount: amount * resolution.rate,
            rate_used: resolution.rate,
            resolution_path: resolution.path,
        })
    }

    /// Walk the strategy chain until one yields a rate
    pub async fn resolve_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Resolution> {
        let from = normalize_code(from_currency);
        let to = normalize_code(to_currency);

        for strategy in Strategy::CHAIN {
            if let Some(resolution) = self.attempt(strategy, &from, &to, as_of).await? {
                debug!(
                    from = %from,
                    to = %to,
                    %as_of,
                    ?strategy,
                    rate = resolution.rate,
                    "Resolved exchange rate"
                );
                return Ok(resolution);
            }
        }

        warn!(from = %from, to = %to, %as_of, "No exchange rate path found");
        Err(BenchmarkError::rate_not_found(&from, &to, as_of))
    }

    /// Run a single strategy; `None` means it had nothing for this pair
    pub async fn attempt(
        &self,
        strategy: Strategy,
        from: &str,
        to: &str,
        as_of: NaiveDate,
    ) -> Result<Option<Resolution>> {
        let resolution = match strategy {
            Strategy::Identity => (from == to).then_some(Resolution {
                rate: 1.0,
                path: ResolutionPath::Identity,
            }),
            Strategy::Direct => self
                .store
                .lookup_rate(from, to, as_of)
                .await?
                .map(|r| Resolution {
                    rate: r.rate,
                    path: ResolutionPath::Direct {
                        effective_date: r.effective_date,
                    },
                }),
            Strategy::Reverse => self
                .store
                .lookup_rate(to, from, as_of)
                .await?
                .filter(|r| r.rate > 0.0)
                .map(|r| Resolution {
                    rate: 1.0 / r.rate,
                    path: ResolutionPath::Reverse {
                        effective_date: r.effective_date,
                    },
                }),
            Strategy::BaseHop => self.base_hop(from, to, as_of).await?,
            Strategy::Graph => self.graph_search(from, to, as_of).await?,
            Strategy::ExternalFetch => self.external_fetch(from, to, as_of).await,
            Strategy::StaticTable => self.static_table(from, to, as_of).await,
        };
        Ok(resolution)
    }

    /// One leg of a hop: the stored rate, or the inverse of the opposite leg
    async fn leg(&self, from: &str, to: &str, as_of: NaiveDate) -> AnyResult<Option<f64>> {
        if let Some(rate) = self.store.lookup_rate(from, to, as_of).await? {
            return Ok(Some(rate.rate));
        }
        Ok(self
            .store
            .lookup_rate(to, from, as_of)
            .await?
            .filter(|r| r.rate > 0.0)
            .map(|r| 1.0 / r.rate))
    }

    async fn base_hop(&self, from: &str, to: &str, as_of: NaiveDate) -> AnyResult<Option<Resolution>> {
        let base = self.base_currency.as_str();
        if from == base || to == base {
            return Ok(None);
        }

        let Some(first) = self.leg(from, base, as_of).await? else {
            return Ok(None);
        };
        let Some(second) = self.leg(base, to, as_of).await? else {
            return Ok(None);
        };

        Ok(Some(Resolution {
            rate: first * second,
            path: ResolutionPath::BaseHop {
                via: base.to_string(),
            },
        }))
    }

    async fn graph_search(
        &self,
        from: &str,
        to: &str,
        as_of: NaiveDate,
    ) -> AnyResult<Option<Resolution>> {
        let rates = self.store.rates_as_of(as_of).await?;
        let graph = RateGraph::from_rates(&rates);

        let Some(path) = graph.shortest_path(from, to) else {
            return Ok(None);
        };

        self.persist(from, to, path.factor, as_of, RateSource::Derived)
            .await;
        Ok(Some(Resolution {
            rate: path.factor,
            path: ResolutionPath::Graph {
                currencies: path.currencies,
            },
        }))
    }

    async fn external_fetch(&self, from: &str, to: &str, as_of: NaiveDate) -> Option<Resolution> {
        let fetched =
            match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_rate(from, to, as_of))
                .await
            {
                Ok(Ok(Some(fetched))) if fetched.rate.is_finite() && fetched.rate > 0.0 => fetched,
                Ok(Ok(_)) => {
                    debug!(from, to, %as_of, "External rate source has no rate");
                    return None;
                }
                Ok(Err(e)) => {
                    warn!(from, to, %as_of, error = %e, "External rate fetch failed");
                    return None;
                }
                Err(_) => {
                    warn!(
                        from,
                        to,
                        %as_of,
                        timeout_ms = self.fetch_timeout.as_millis() as u64,
                        "External rate fetch timed out"
                    );
                    return None;
                }
            };

        self.persist(from, to, fetched.rate, fetched.effective_date, RateSource::Api)
            .await;
        Some(Resolution {
            rate: fetched.rate,
            path: ResolutionPath::Fetched {
                effective_date: fetched.effective_date,
            },
        })
    }

    async fn static_table(&self, from: &str, to: &str, as_of: NaiveDate) -> Option<Resolution> {
        let rate = static_rate(from, to)?;
        self.persist(from, to, rate, as_of, RateSource::Static).await;
        Some(Resolution {
            rate,
            path: ResolutionPath::StaticTable,
        })
    }

    /// Upsert a discovered rate; a failed write does not fail the conversion
    async fn persist(&self, from: &str, to: &str, rate: f64, effective_date: NaiveDate, source: RateSource) {
        let record = ExchangeRate {
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            rate,
            effective_date,
            source,
        };
        match self.store.upsert_rate(&record).await {
            Ok(()) => info!(from, to, rate, %effective_date, %source, "Stored exchange rate"),
            Err(e) => warn!(from, to, error = %e, "Failed to store exchange rate"),
        }
    }
}
