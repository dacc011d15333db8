// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Turns a peer comparison into severity-ranked, readable insights

use std::collections::BTreeMap;

use crate::benchmark::potential_savings;
use crate::models::{
    CategoryComparison, ComparisonResult, Insight, InsightKind, PeerBenchmark, Severity, Tier,
    UserStatistics,
};

pub const OVERALL_HIGH_THRESHOLD: f64 = 20.0;
pub const OVERALL_MEDIUM_THRESHOLD: f64 = 5.0;
pub const OVERALL_LOW_THRESHOLD: f64 = -20.0;
pub const CATEGORY_HIGH_THRESHOLD: f64 = 50.0;
pub const CATEGORY_MEDIUM_THRESHOLD: f64 = 25.0;
pub const CATEGORY_SHARE_THRESHOLD: f64 = 25.0;
pub const TRANSACTION_COUNT_THRESHOLD: f64 = 30.0;

fn figures(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
    values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn money(amount: f64, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

/// Build insights against one tier, sorted high → medium → low with
/// generation order kept inside each severity
pub fn synthesize_insights(
    tier: Tier,
    user_stats: &UserStatistics,
    comparison: &ComparisonResult,
    peer: &PeerBenchmark,
    currency: &str,
) -> Vec<Insight> {
    let mut insights = Vec::new();
    let peers = tier.peer_label();

    let total = &comparison.total_spent;
    let overall_severity = if total.vs_median_percent > OVERALL_HIGH_THRESHOLD {
        Some(Severity::High)
    } else if total.vs_median_percent > OVERALL_MEDIUM_THRESHOLD {
        Some(Severity::Medium)
    } else {
        None
    };
    if let Some(severity) = overall_severity {
        insights.push(Insight {
            kind: InsightKind::OverallHigh,
            severity,
            message: format!(
                "You spent {} this period, {:.1}% more than the median of {} ({}).",
                money(total.user_total, currency),
                total.vs_median_percent,
                peers,
                money(peer.total.median_spent, currency)
            ),
            category: None,
            figures: figures(&[
                ("user_total", total.user_total),
                ("peer_median", peer.total.median_spent),
                ("vs_median_percent", total.vs_median_percent),
                ("percentile", total.percentile),
            ]),
        });
    } else if total.vs_median_percent < OVERALL_LOW_THRESHOLD {
        insights.push(Insight {
            kind: InsightKind::OverallLow,
            severity: Severity::Low,
            message: format!(
                "Nice work: you spent {} this period, {:.1}% less than the median of {}.",
                money(total.user_total, currency),
                total.vs_median_percent.abs(),
                peers
            ),
            category: None,
            figures: figures(&[
                ("user_total", total.user_total),
                ("peer_median", peer.total.median_spent),
                ("vs_median_percent", total.vs_median_percent),
                ("percentile", total.percentile),
            ]),
        });
    }

    // biggest categories first
    let mut categories: Vec<_> = user_stats.categories.iter().collect();
    categories.sort_by(|a, b| b.1.total.total_cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));

    let mut has_high_category = false;
    for (name, stats) in &categories {
        let Some(CategoryComparison::Compared {
            peer_median,
            vs_median_percent,
            ..
        }) = comparison.categories.get(*name)
        else {
            continue;
        };

        let severity = if *vs_median_percent > CATEGORY_HIGH_THRESHOLD {
            Severity::High
        } else if *vs_median_percent > CATEGORY_MEDIUM_THRESHOLD {
            Severity::Medium
        } else {
            continue;
        };
        has_high_category |= severity == Severity::High;

        insights.push(Insight {
            kind: InsightKind::CategoryHigh,
            severity,
            message: format!(
                "Your {} spending ({}) is {:.1}% above the median of {} ({}).",
                name,
                money(stats.total, currency),
                vs_median_percent,
                peers,
                money(*peer_median, currency)
            ),
            category: Some((*name).clone()),
            figures: figures(&[
                ("user_spent", stats.total),
                ("peer_median", *peer_median),
                ("vs_median_percent", *vs_median_percent),
            ]),
        });
    }

    for (name, stats) in &categories {
        if stats.percentage > CATEGORY_SHARE_THRESHOLD {
            insights.push(Insight {
                kind: InsightKind::CategorySignificant,
                severity: Severity::Medium,
                message: format!(
                    "{} makes up {:.1}% of your spending ({}).",
                    name,
                    stats.percentage,
                    money(stats.total, currency)
                ),
                category: Some((*name).clone()),
                figures: figures(&[
                    ("user_spent", stats.total),
                    ("percentage", stats.percentage),
                ]),
            });
        }
    }

    let count = &comparison.transaction_count;
    if count.vs_avg_percent > TRANSACTION_COUNT_THRESHOLD {
        insights.push(Insight {
            kind: InsightKind::TransactionCountHigh,
            severity: Severity::Medium,
            message: format!(
                "You made {} purchases, {:.0}% more than the average of {} ({:.1}). Many small purchases add up.",
                count.user_count, count.vs_avg_percent, peers, count.peer_avg
            ),
            category: None,
            figures: figures(&[
                ("user_count", count.user_count as f64),
                ("peer_avg", count.peer_avg),
                ("vs_avg_percent", count.vs_avg_percent),
            ]),
        });
    } else if count.vs_avg_percent < -TRANSACTION_COUNT_THRESHOLD {
        insights.push(Insight {
            kind: InsightKind::TransactionCountLow,
            severity: Severity::Low,
            message: format!(
                "You made {} purchases, {:.0}% fewer than the average of {} ({:.1}).",
                count.user_count,
                count.vs_avg_percent.abs(),
                peers,
                count.peer_avg
            ),
            category: None,
            figures: figures(&[
                ("user_count", count.user_count as f64),
                ("peer_avg", count.peer_avg),
                ("vs_avg_percent", count.vs_avg_percent),
            ]),
        });
    }

    if has_high_category {
        let savings = potential_savings(user_stats, peer);
        insights.push(Insight {
            kind: InsightKind::SavingOpportunity,
            severity: Severity::Medium,
            message: format!(
                "Bringing your above-median categories down to what {} typically spend would save about {}.",
                peers,
                money(savings, currency)
            ),
            category: None,
            figures: figures(&[("potential_savings", savings)]),
        });
    }

    // stable sort keeps generation order within a severity
    insights.sort_by_key(|insight| insight.severity);
    insights
}
