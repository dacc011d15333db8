// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Where a stored exchange rate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Manual,
    Static,
    Api,
    /// Composed from other stored rates by the graph search
    Derived,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Manual => "manual",
            RateSource::Static => "static",
            RateSource::Api => "api",
            RateSource::Derived => "derived",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RateSource::Manual),
            "static" => Ok(RateSource::Static),
            "api" => Ok(RateSource::Api),
            "derived" => Ok(RateSource::Derived),
            other => anyhow::bail!("Unknown rate source '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub effective_date: NaiveDate,
    pub source: RateSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub amount: f64,
    pub currency: String,
    pub expense_date: NaiveDate,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardizedExpense {
    pub expense: Expense,
    pub standardized_amount: f64,
    pub standardized_currency: String,
    /// False when no rate could be resolved and the original amount was kept
    pub converted: bool,
}

impl StandardizedExpense {
    /// Wrap an expense that is already in the report currency
    pub fn unchanged(expense: Expense) -> Self {
        Self {
            standardized_amount: expense.amount,
            standardized_currency: expense.currency.clone(),
            converted: true,
            expense,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub total: f64,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatistics {
    pub total: f64,
    pub transaction_count: usize,
    pub avg_expense: f64,
    pub largest_expense: f64,
    pub daily_avg: f64,
    pub weekly_avg: f64,
    pub days_in_period: i64,
    pub categories: BTreeMap<String, CategoryStats>,
}

/// Peer comparison granularity, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Local,
    Country,
    Global,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Local, Tier::Country, Tier::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Local => "local",
            Tier::Country => "country",
            Tier::Global => "global",
        }
    }

    /// Phrase used in insight messages
    pub fn peer_label(&self) -> &'static str {
        match self {
            Tier::Local => "people in your city",
            Tier::Country => "people in your country",
            Tier::Global => "all users",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "city" => Ok(Tier::Local),
            "country" => Ok(Tier::Country),
            "global" => Ok(Tier::Global),
            other => anyhow::bail!("Unknown tier '{}'. Use: local, country or global", other),
        }
    }
}

/// City and country used to pick the local and country tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub city: Option<String>,
    pub country: Option<String>,
}

impl UserLocation {
    pub fn key_for(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Local => self.city.as_deref(),
            Tier::Country => self.country.as_deref(),
            Tier::Global => Some(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerTotals {
    pub avg_spent: f64,
    pub median_spent: f64,
    pub p25_spent: f64,
    pub p75_spent: f64,
    pub avg_transaction_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerCategory {
    pub avg_spent: f64,
    pub median_spent: f64,
}

/// Precomputed peer aggregates for one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerBenchmark {
    pub location: String,
    pub user_count: i64,
    pub currency: String,
    pub total: PeerTotals,
    pub categories: BTreeMap<String, PeerCategory>,
}

impl PeerBenchmark {
    /// Re-express every monetary figure with a conversion factor
    pub fn rescaled(&self, factor: f64, currency: &str) -> Self {
        Self {
            location: self.location.clone(),
            user_count: self.user_count,
            currency: currency.to_string(),
            total: PeerTotals {
                avg_spent: self.total.avg_spent * factor,
                median_spent: self.total.median_spent * factor,
                p25_spent: self.total.p25_spent * factor,
                p75_spent: self.total.p75_spent * factor,
                avg_transaction_count: self.total.avg_transaction_count,
            },
            categories: self
                .categories
                .iter()
                .map(|(name, c)| {
                    (
                        name.clone(),
                        PeerCategory {
                            avg_spent: c.avg_spent * factor,
                            median_spent: c.median_spent * factor,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Scale an aggregate covering a different span to the requested one;
    /// transaction counts scale with the span as well
    pub fn prorated(&self, factor: f64) -> Self {
        let mut scaled = self.rescaled(factor, &self.currency);
        scaled.total.avg_transaction_count *= factor;
        scaled
    }

    pub fn has_data(&self) -> bool {
        self.user_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalComparison {
    pub user_total: f64,
    pub vs_avg: f64,
    pub vs_avg_percent: f64,
    pub vs_median: f64,
    pub vs_median_percent: f64,
    pub percentile: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionCountComparison {
    pub user_count: usize,
    pub peer_avg: f64,
    pub vs_avg_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryComparison {
    Compared {
        user_spent: f64,
        peer_avg: f64,
        peer_median: f64,
        vs_avg_percent: f64,
        vs_median_percent: f64,
    },
    NoData {
        user_spent: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub total_spent: TotalComparison,
    pub transaction_count: TransactionCountComparison,
    pub categories: BTreeMap<String, CategoryComparison>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    OverallHigh,
    OverallLow,
    CategoryHigh,
    CategorySignificant,
    TransactionCountHigh,
    TransactionCountLow,
    SavingOpportunity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub figures: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnconvertedExpense {
    pub id: i64,
    pub amount: f64,
    pub currency: String,
    pub expense_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub user_id: i64,
    pub report_currency: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub user_statistics: UserStatistics,
    pub headline_tier: Tier,
    pub peer_benchmarks: BTreeMap<Tier, PeerBenchmark>,
    pub comparisons: BTreeMap<Tier, ComparisonResult>,
    pub insights: Vec<Insight>,
    pub unconverted_expenses: Vec<UnconvertedExpense>,
    pub notes: Vec<String>,
}
