// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Peer comparison: percentile estimates, deltas and potential savings

use std::collections::BTreeMap;

use crate::models::{
    CategoryComparison, ComparisonResult, PeerBenchmark, TotalComparison,
    TransactionCountComparison, UserStatistics,
};

pub const MAX_PERCENTILE: f64 = 99.0;

/// Estimate where `value` falls in a peer distribution known only by its
/// quartiles.
///
/// This is an approximation, not an order statistic: the percentile is
/// interpolated linearly within each quartile band, and above p75 it grows
/// with the ratio to p75 until capped at 99 (there is always someone who
/// spent more). Equal quartile boundaries resolve to the boundary percentile
/// rather than dividing by zero, and unordered quartiles are sorted first.
pub fn estimate_percentile(value: f64, p25: f64, median: f64, p75: f64) -> f64 {
    if !value.is_finite() || !p25.is_finite() || !median.is_finite() || !p75.is_finite() {
        return 0.0;
    }

    let mut quartiles = [p25, median, p75];
    quartiles.sort_by(|a, b| a.total_cmp(b));
    let [p25, median, p75] = quartiles;

    let percentile = if value <= p25 {
        if p25 > 0.0 {
            (value / p25) * 25.0
        } else if value <= 0.0 {
            0.0
        } else {
            25.0
        }
    } else if value <= median {
        let span = median - p25;
        if span > 0.0 {
            25.0 + ((value - p25) / span) * 25.0
        } else {
            50.0
        }
    } else if value <= p75 {
        let span = p75 - median;
        if span > 0.0 {
            50.0 + ((value - median) / span) * 25.0
        } else {
            75.0
        }
    } else if p75 > 0.0 {
        75.0 + (value / p75 - 1.0) * 25.0
    } else {
        75.0
    };

    percentile.clamp(0.0, MAX_PERCENTILE)
}

/// Percent difference of `value` against `reference`; zero when the
/// reference is not positive
pub fn percent_difference(value: f64, reference: f64) -> f64 {
    if reference > 0.0 && value.is_finite() {
        ((value - reference) / reference) * 100.0
    } else {
        0.0
    }
}

/// Amount the user would save by bringing every above-median category down
/// to the peer median. Categories the peers have no data for are skipped.
pub fn potential_savings(user_stats: &UserStatistics, peer_benchmark: &PeerBenchmark) -> f64 {
    user_stats
        .categories
        .iter()
        .filter_map(|(name, stats)| {
            let peer = peer_benchmark.categories.get(name)?;
            (stats.total > peer.median_spent).then(|| stats.total - peer.median_spent)
        })
        .sum()
}

/// Compare user aggregates against one tier of peer aggregates
pub fn compare_with_peers(user_stats: &UserStatistics, peer: &PeerBenchmark) -> ComparisonResult {
    let total = user_stats.total;
    let total_spent = TotalComparison {
        user_total: total,
        vs_avg: total - peer.total.avg_spent,
        vs_avg_percent: percent_difference(total, peer.total.avg_spent),
        vs_median: total - peer.total.median_spent,
        vs_median_percent: percent_difference(total, peer.total.median_spent),
        percentile: estimate_percentile(
            total,
            peer.total.p25_spent,
            peer.total.median_spent,
            peer.total.p75_spent,
        ),
    };

    let transaction_count = TransactionCountComparison {
        user_count: user_stats.transaction_count,
        peer_avg: peer.total.avg_transaction_count,
        vs_avg_percent: percent_difference(
            user_stats.transaction_count as f64,
            peer.total.avg_transaction_count,
        ),
    };

    let categories: BTreeMap<String, CategoryComparison> = user_stats
        .categories
        .iter()
        .map(|(name, stats)| {
            let comparison = match peer.categories.get(name) {
                Some(peer_category) => CategoryComparison::Compared {
                    user_spent: stats.total,
                    peer_avg: peer_category.avg_spent,
                    peer_median: peer_category.median_spent,
                    vs_avg_percent: percent_difference(stats.total, peer_category.avg_spent),
                    vs_median_percent: percent_difference(stats.total, peer_category.median_spent),
                },
                None => CategoryComparison::NoData {
                    user_spent: stats.total,
                },
            };
            (name.clone(), comparison)
        })
        .collect();

    ComparisonResult {
        total_spent,
        transaction_count,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryStats, PeerCategory, PeerTotals};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn user_stats(categories: &[(&str, f64, usize)]) -> UserStatistics {
        let total: f64 = categories.iter().map(|c| c.1).sum();
        let count: usize = categories.iter().map(|c| c.2).sum();
        UserStatistics {
            total,
            transaction_count: count,
            avg_expense: if count > 0 { total / count as f64 } else { 0.0 },
            largest_expense: 0.0,
            daily_avg: total / 30.0,
            weekly_avg: total / 30.0 * 7.0,
            days_in_period: 30,
            categories: categories
                .iter()
                .map(|(name, amount, count)| {
                    (
                        name.to_string(),
                        CategoryStats {
                            total: *amount,
                            count: *count,
                            percentage: amount / total * 100.0,
                        },
                    )
                })
                .collect(),
        }
    }

    fn peer(categories: &[(&str, f64, f64)]) -> PeerBenchmark {
        PeerBenchmark {
            location: "Berlin".to_string(),
            user_count: 120,
            currency: "EUR".to_string(),
            total: PeerTotals {
                avg_spent: 350.0,
                median_spent: 320.0,
                p25_spent: 200.0,
                p75_spent: 450.0,
                avg_transaction_count: 20.0,
            },
            categories: categories
                .iter()
                .map(|(name, avg, median)| {
                    (
                        name.to_string(),
                        PeerCategory {
                            avg_spent: *avg,
                            median_spent: *median,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_percentile_at_quartiles() {
        assert_eq!(estimate_percentile(320.0, 200.0, 320.0, 450.0), 50.0);
        assert_eq!(estimate_percentile(450.0, 200.0, 320.0, 450.0), 75.0);
        assert_eq!(estimate_percentile(200.0, 200.0, 320.0, 450.0), 25.0);
        assert_eq!(estimate_percentile(0.0, 200.0, 320.0, 450.0), 0.0);
    }

    #[test]
    fn test_percentile_interpolates_between_quartiles() {
        assert_relative_eq!(estimate_percentile(100.0, 200.0, 320.0, 450.0), 12.5);
        assert_relative_eq!(estimate_percentile(260.0, 200.0, 320.0, 450.0), 37.5);
        assert_relative_eq!(
            estimate_percentile(400.0, 200.0, 320.0, 450.0),
            50.0 + 80.0 / 130.0 * 25.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(estimate_percentile(540.0, 200.0, 320.0, 450.0), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_percentile_caps_at_99() {
        assert_eq!(estimate_percentile(10_000.0, 200.0, 320.0, 450.0), 99.0);
    }

    #[test]
    fn test_percentile_degenerate_quartiles() {
        // p25 of zero
        assert_eq!(estimate_percentile(0.0, 0.0, 10.0, 20.0), 0.0);
        assert_eq!(estimate_percentile(5.0, 0.0, 10.0, 20.0), 37.5);
        // all quartiles equal
        assert_eq!(estimate_percentile(100.0, 100.0, 100.0, 100.0), 25.0);
        assert_eq!(estimate_percentile(150.0, 100.0, 100.0, 100.0), 87.5);
        // everything zero
        assert_eq!(estimate_percentile(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(estimate_percentile(10.0, 0.0, 0.0, 0.0), 75.0);
        // garbage in
        assert_eq!(estimate_percentile(f64::NAN, 1.0, 2.0, 3.0), 0.0);
    }

    #[test]
    fn test_percentile_sorts_unordered_quartiles() {
        assert_eq!(
            estimate_percentile(320.0, 450.0, 320.0, 200.0),
            estimate_percentile(320.0, 200.0, 320.0, 450.0)
        );
    }

    #[test]
    fn test_potential_savings() {
        let stats = user_stats(&[("Food", 300.0, 10), ("Transport", 100.0, 5), ("Pets", 50.0, 1)]);
        let peers = peer(&[("Food", 220.0, 200.0), ("Transport", 150.0, 120.0)]);
        assert_relative_eq!(potential_savings(&stats, &peers), 100.0);
    }

    #[test]
    fn test_potential_savings_zero_when_below_median() {
        let stats = user_stats(&[("Food", 150.0, 10), ("Transport", 100.0, 5)]);
        let peers = peer(&[("Food", 220.0, 200.0), ("Transport", 150.0, 120.0)]);
        assert_eq!(potential_savings(&stats, &peers), 0.0);
    }

    #[test]
    fn test_compare_with_peers() {
        let stats = user_stats(&[("Food", 300.0, 18), ("Transport", 100.0, 8)]);
        let peers = peer(&[("Food", 190.0, 180.0)]);
        let comparison = compare_with_peers(&stats, &peers);

        assert_relative_eq!(comparison.total_spent.vs_median, 80.0);
        assert_relative_eq!(comparison.total_spent.vs_median_percent, 25.0);
        assert_relative_eq!(comparison.total_spent.vs_avg, 50.0);
        assert_relative_eq!(comparison.total_spent.vs_avg_percent, 50.0 / 350.0 * 100.0);
        assert_relative_eq!(comparison.total_spent.percentile, 50.0 + 80.0 / 130.0 * 25.0);
        assert_relative_eq!(comparison.transaction_count.vs_avg_percent, 30.0, epsilon = 1e-9);

        match &comparison.categories["Food"] {
            CategoryComparison::Compared {
                vs_median_percent, ..
            } => assert_relative_eq!(*vs_median_percent, 300.0 / 180.0 * 100.0 - 100.0, epsilon = 1e-9),
            other => panic!("expected comparison, got {:?}", other),
        }
        assert_eq!(
            comparison.categories["Transport"],
            CategoryComparison::NoData { user_spent: 100.0 }
        );
    }

    #[test]
    fn test_percent_difference_guards_zero_reference() {
        assert_eq!(percent_difference(50.0, 0.0), 0.0);
        assert_eq!(percent_difference(50.0, -10.0), 0.0);
        assert_relative_eq!(percent_difference(75.0, 50.0), 50.0);
    }

    proptest! {
        #[test]
        fn prop_percentile_in_range_and_monotonic(
            a in 0.0f64..1000.0,
            b in 0.0f64..1000.0,
            p25 in 0.0f64..500.0,
            d1 in 0.0f64..500.0,
            d2 in 0.0f64..500.0,
        ) {
            let median = p25 + d1;
            let p75 = median + d2;
            let pa = estimate_percentile(a, p25, median, p75);
            let pb = estimate_percentile(b, p25, median, p75);

            prop_assert!((0.0..=99.0).contains(&pa));
            prop_assert!(pa.is_finite());
            if a <= b {
                prop_assert!(pa <= pb + 1e-9);
            }
        }
    }
}
