// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Builds a user's benchmark report.
//!
//! A request runs in a single pass: resolve which peer tiers have data,
//! normalize the user's expenses to the report currency, aggregate, compare
//! against every available tier and derive insights from the most specific
//! one. Nothing is persisted apart from rates the normalizer discovers.

use chrono::{Local, NaiveDate};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as FmtWrite;
use std::sync::Arc;
use tracing::{info, warn};

use crate::benchmark::compare_with_peers;
use crate::error::{BenchmarkError, Result};
use crate::expenses::ExpenseSource;
use crate::insights::synthesize_insights;
use crate::models::{
    BenchmarkReport, CategoryComparison, Expense, PeerBenchmark, StandardizedExpense, Tier,
    UnconvertedExpense, UserLocation,
};
use crate::normalizer::{CurrencyNormalizer, normalize_code};
use crate::peers::PeerDataSource;
use crate::statistics::compute_user_statistics;
use crate::timeframe::{Timeframe, validate_period};

pub struct BenchmarkOrchestrator {
    expenses: Arc<dyn ExpenseSource>,
    peers: Arc<dyn PeerDataSource>,
    normalizer: CurrencyNormalizer,
}

impl BenchmarkOrchestrator {
    pub fn new(
        expenses: Arc<dyn ExpenseSource>,
        peers: Arc<dyn PeerDataSource>,
        normalizer: CurrencyNormalizer,
    ) -> Self {
        Self {
            expenses,
            peers,
            normalizer,
        }
    }

    /// Benchmark the user's spending over a timeframe ending today
    pub async fn generate_user_benchmark(
        &self,
        user_id: i64,
        timeframe: Timeframe,
        report_currency: &str,
    ) -> Result<BenchmarkReport> {
        let today = Local::now().date_naive();
        let (start, end) = timeframe.period(today)?;
        self.generate_for_period(user_id, start, end, report_currency)
            .await
    }

    pub async fn generate_for_period(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        report_currency: &str,
    ) -> Result<BenchmarkReport> {
        validate_period(start, end)?;
        let report_currency = normalize_code(report_currency);

        let location = self.expenses.get_user_location(user_id).await?;
        let raw_peers = self.resolve_peer_tiers(&location, start, end).await?;

        let mut notes = Vec::new();
        let peer_benchmarks = self
            .rescale_peers(raw_peers, &report_currency, start, end, &mut notes)
            .await?;

        let expenses = self
            .expenses
            .get_expenses_for_period(user_id, start, end)
            .await?;
        let (standardized, unconverted) = self.standardize(expenses, &report_currency).await;

        let user_statistics = compute_user_statistics(&standardized);

        // Keys iterate most specific first, so the first tier headlines
        let mut headline_tier = Tier::Global;
        let mut insights = Vec::new();
        let mut comparisons = BTreeMap::new();
        for (index, (tier, peer)) in peer_benchmarks.iter().enumerate() {
            let comparison = compare_with_peers(&user_statistics, peer);
            if index == 0 {
                headline_tier = *tier;
                insights = synthesize_insights(
                    *tier,
                    &user_statistics,
                    &comparison,
                    peer,
                    &report_currency,
                );
            }
            comparisons.insert(*tier, comparison);
        }

        if !unconverted.is_empty() {
            let mut currencies: Vec<&str> = unconverted.iter().map(|u| u.currency.as_str()).collect();
            currencies.sort_unstable();
            currencies.dedup();
            notes.push(format!(
                "{} of {} expenses could not be converted to {} and are counted in their original currency ({}).",
                unconverted.len(),
                user_statistics.transaction_count,
                report_currency,
                currencies.join(", ")
            ));
        }

        info!(
            user_id,
            %start,
            %end,
            headline_tier = %headline_tier,
            tiers = peer_benchmarks.len(),
            expenses = user_statistics.transaction_count,
            unconverted = unconverted.len(),
            insights = insights.len(),
            "Generated benchmark report"
        );

        Ok(BenchmarkReport {
            user_id,
            report_currency,
            period_start: start,
            period_end: end,
            user_statistics,
            headline_tier,
            peer_benchmarks,
            comparisons,
            insights,
            unconverted_expenses: unconverted,
            notes,
        })
    }

    /// Fetch every tier the user's location allows; fails when the global
    /// tier has no data
    async fn resolve_peer_tiers(
        &self,
        location: &UserLocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(Tier, PeerBenchmark)>> {
        let lookups = Tier::ALL.into_iter().filter_map(|tier| {
            let key = location.key_for(tier)?.to_string();
            let peers = self.peers.clone();
            Some(async move {
                let peer = peers.get_peer_benchmark(tier, &key, start, end).await?;
                anyhow::Ok((tier, peer))
            })
        });

        let available: Vec<(Tier, PeerBenchmark)> = try_join_all(lookups)
            .await?
            .into_iter()
            .filter_map(|(tier, peer)| peer.filter(|p| p.has_data()).map(|p| (tier, p)))
            .collect();

        if !available.iter().any(|(tier, _)| *tier == Tier::Global) {
            warn!(%start, %end, "No global peer benchmark available");
            return Err(BenchmarkError::PeerDataUnavailable { start, end });
        }

        Ok(available)
    }

    /// Re-express peer figures in the report currency as of the period end.
    /// A local or country tier without a rate is left out with a note; the
    /// global tier without a rate leaves nothing to compare against.
    async fn rescale_peers(
        &self,
        raw_peers: Vec<(Tier, PeerBenchmark)>,
        report_currency: &str,
        start: NaiveDate,
        end: NaiveDate,
        notes: &mut Vec<String>,
    ) -> Result<BTreeMap<Tier, PeerBenchmark>> {
        let mut peer_benchmarks = BTreeMap::new();
        for (tier, peer) in raw_peers {
            match self
                .normalizer
                .convert(1.0, &peer.currency, report_currency, end)
                .await
            {
                Ok(conversion) => {
                    peer_benchmarks.insert(tier, peer.rescaled(conversion.rate_used, report_currency));
                }
                Err(e @ BenchmarkError::RateNotFound { .. }) => {
                    warn!(tier = %tier, currency = %peer.currency, error = %e, "Cannot rescale peer figures");
                    if tier == Tier::Global {
                        return Err(BenchmarkError::PeerDataUnavailable { start, end });
                    }
                    notes.push(format!(
                        "{} peer figures are in {} and could not be converted to {}; that comparison is left out.",
                        tier, peer.currency, report_currency
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(peer_benchmarks)
    }

    /// Resolve one rate per distinct (currency, date) in the expenses. Dates
    /// are walked newest first per currency: stored rates only apply from
    /// their effective date on, so once a currency fails on some date every
    /// earlier date fails too and the chain (fetch timeout included) is
    /// not walked again for it.
    async fn resolve_expense_rates(
        &self,
        expenses: &[Expense],
        report_currency: &str,
    ) -> HashMap<(String, NaiveDate), Result<f64, String>> {
        let mut keys: Vec<(String, NaiveDate)> = expenses
            .iter()
            .map(|e| (normalize_code(&e.currency), e.expense_date))
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let mut rates = HashMap::with_capacity(keys.len());
        let mut failed: HashMap<String, String> = HashMap::new();
        for (currency, date) in keys.into_iter().rev() {
            let outcome = match failed.get(&currency) {
                Some(reason) => Err(reason.clone()),
                None => match self
                    .normalizer
                    .resolve_rate(&currency, report_currency, date)
                    .await
                {
                    Ok(resolution) => Ok(resolution.rate),
                    Err(e) => {
                        failed.insert(currency.clone(), e.to_string());
                        Err(e.to_string())
                    }
                },
            };
            rates.insert((currency, date), outcome);
        }
        rates
    }

    /// Convert every expense to the report currency; failures keep the
    /// original amount and are reported back instead of aborting
    async fn standardize(
        &self,
        expenses: Vec<Expense>,
        report_currency: &str,
    ) -> (Vec<StandardizedExpense>, Vec<UnconvertedExpense>) {
        let rates = self.resolve_expense_rates(&expenses, report_currency).await;
        let mut standardized = Vec::with_capacity(expenses.len());
        let mut unconverted = Vec::new();

        for expense in expenses {
            let key = (normalize_code(&expense.currency), expense.expense_date);
            let outcome = rates
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Err(format!("no rate resolved for {}", key.0)));

            match outcome {
                Ok(rate) => standardized.push(StandardizedExpense {
                    standardized_amount: expense.amount * rate,
                    standardized_currency: report_currency.to_string(),
                    converted: true,
                    expense,
                }),
                Err(reason) => {
                    warn!(
                        expense_id = expense.id,
                        currency = %expense.currency,
                        error = %reason,
                        "Keeping unconverted expense amount"
                    );
                    unconverted.push(UnconvertedExpense {
                        id: expense.id,
                        amount: expense.amount,
                        currency: expense.currency.clone(),
                        expense_date: expense.expense_date,
                        reason,
                    });
                    standardized.push(StandardizedExpense {
                        standardized_amount: expense.amount,
                        standardized_currency: expense.currency.clone(),
                        converted: false,
                        expense,
                    });
                }
            }
        }

        (standardized, unconverted)
    }
}

impl BenchmarkReport {
    /// Plain-text rendering for terminals and chat messages
    pub fn render_text(&self) -> String {
        let stats = &self.user_statistics;
        let currency = &self.report_currency;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Spending benchmark {} to {} ({})",
            self.period_start, self.period_end, currency
        );
        let _ = writeln!(
            out,
            "Total: {:.2} over {} expenses | avg {:.2} | largest {:.2} | {:.2}/day | {:.2}/week",
            stats.total,
            stats.transaction_count,
            stats.avg_expense,
            stats.largest_expense,
            stats.daily_avg,
            stats.weekly_avg
        );

        if !stats.categories.is_empty() {
            let _ = writeln!(out, "\nCategories:");
            for (name, category) in &stats.categories {
                let _ = writeln!(
                    out,
                    "  {:<20} {:>12.2} {:>6.1}% ({} expenses)",
                    name, category.total, category.percentage, category.count
                );
            }
        }

        for (tier, comparison) in &self.comparisons {
            let Some(peer) = self.peer_benchmarks.get(tier) else {
                continue;
            };
            let total = &comparison.total_spent;
            let _ = writeln!(
                out,
                "\n{} peers ({}, {} users): median {:.2}, you are {:+.1}% vs median, {:+.1}% vs average, ~{:.0}th percentile",
                tier,
                peer.location,
                peer.user_count,
                peer.total.median_spent,
                total.vs_median_percent,
                total.vs_avg_percent,
                total.percentile
            );
            for (name, category) in &comparison.categories {
                match category {
                    CategoryComparison::Compared {
                        peer_median,
                        vs_median_percent,
                        ..
                    } => {
                        let _ = writeln!(
                            out,
                            "  {:<20} median {:>10.2}  {:+.1}%",
                            name, peer_median, vs_median_percent
                        );
                    }
                    CategoryComparison::NoData { .. } => {
                        let _ = writeln!(out, "  {:<20} no peer data", name);
                    }
                }
            }
        }

        if !self.insights.is_empty() {
            let _ = writeln!(out, "\nInsights ({} peers):", self.headline_tier);
            for insight in &self.insights {
                let _ = writeln!(out, "  [{:?}] {}", insight.severity, insight.message);
            }
        }

        for note in &self.notes {
            let _ = writeln!(out, "\nNote: {}", note);
        }

        out
    }
}
