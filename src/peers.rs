// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Read access to precomputed peer aggregates.
//!
//! The quartiles and averages are produced by an external aggregation job in
//! a fixed base currency; this module only reads and (for seeding) writes them.
//! A lookup takes the stored period that best fits the requested one and
//! scales it by the ratio of days when the lengths differ.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

use crate::db::{format_date, parse_date};
use crate::models::{PeerBenchmark, PeerCategory, PeerTotals, Tier};

#[async_trait]
pub trait PeerDataSource: Send + Sync {
    /// Aggregates for the tier and location covering the period, if any.
    /// `location_key` is the city for local, the country for country and
    /// empty for global.
    async fn get_peer_benchmark(
        &self,
        tier: Tier,
        location_key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<PeerBenchmark>>;
}

pub struct SqlitePeerSource {
    pool: SqlitePool,
}

impl SqlitePeerSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type PeerRow = (String, String, String, i64, f64, f64, f64, f64, f64);

#[async_trait]
impl PeerDataSource for SqlitePeerSource {
    async fn get_peer_benchmark(
        &self,
        tier: Tier,
        location_key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<PeerBenchmark>> {
        let rows = sqlx::query_as::<_, PeerRow>(
            r#"
            SELECT period_start, period_end, currency, user_count,
                   avg_spent, median_spent, p25_spent, p75_spent, avg_transaction_count
            FROM peer_benchmarks
            WHERE tier = ?
            AND location_key = ?
            AND period_start <= ?
            AND period_end >= ?
            ORDER BY period_end DESC
            "#,
        )
        .bind(tier.as_str())
        .bind(location_key)
        .bind(format_date(end))
        .bind(format_date(start))
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let span = (parse_date(&row.0)?, parse_date(&row.1)?);
            candidates.push((span, row));
        }

        let Some((
            (aggregate_start, aggregate_end),
            (
                period_start,
                period_end,
                currency,
                user_count,
                avg_spent,
                median_spent,
                p25_spent,
                p75_spent,
                avg_transaction_count,
            ),
        )) = closest_fit(candidates, start, end)
        else {
            return Ok(None);
        };

        let categories = sqlx::query_as::<_, (String, f64, f64)>(
            r#"
            SELECT category, avg_spent, median_spent
            FROM peer_category_benchmarks
            WHERE tier = ?
            AND location_key = ?
            AND period_start = ?
            AND period_end = ?
            ORDER BY category
            "#,
        )
        .bind(tier.as_str())
        .bind(location_key)
        .bind(&period_start)
        .bind(&period_end)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(category, avg_spent, median_spent)| {
            (
                category,
                PeerCategory {
                    avg_spent,
                    median_spent,
                },
            )
        })
        .collect();

        let location = if location_key.is_empty() {
            "Global".to_string()
        } else {
            location_key.to_string()
        };

        let benchmark = PeerBenchmark {
            location,
            user_count,
            currency,
            total: PeerTotals {
                avg_spent,
                median_spent,
                p25_spent,
                p75_spent,
                avg_transaction_count,
            },
            categories,
        };

        let requested_days = span_days(start, end);
        let aggregate_days = span_days(aggregate_start, aggregate_end);
        if requested_days == aggregate_days {
            return Ok(Some(benchmark));
        }

        debug!(
            tier = %tier,
            location_key,
            %aggregate_start,
            %aggregate_end,
            requested_days,
            aggregate_days,
            "Prorating peer aggregate to the requested period"
        );
        Ok(Some(benchmark.prorated(requested_days as f64 / aggregate_days as f64)))
    }
}

/// Inclusive length of a period in days
fn span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// Pick the aggregate that best matches the requested period: the most
/// overlapping days, then the closest length, then the most recent end
fn closest_fit<T>(
    candidates: Vec<((NaiveDate, NaiveDate), T)>,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<((NaiveDate, NaiveDate), T)> {
    let requested_days = span_days(start, end);
    candidates
        .into_iter()
        .min_by_key(|((from, to), _)| {
            let overlap = span_days((*from).max(start), (*to).min(end));
            let length_gap = (span_days(*from, *to) - requested_days).abs();
            (Reverse(overlap), length_gap, Reverse(*to))
        })
}

/// Store one tier's aggregates, replacing any previous row for the same key
pub async fn upsert_peer_benchmark(
    pool: &SqlitePool,
    tier: Tier,
    location_key: &str,
    period_start: NaiveDate,
    period_end: NaiveDate,
    benchmark: &PeerBenchmark,
) -> Result<()> {
    let start = format_date(period_start);
    let end = format_date(period_end);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO peer_benchmarks (
            tier, location_key, period_start, period_end, currency, user_count,
            avg_spent, median_spent, p25_spent, p75_spent, avg_transaction_count
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tier, location_key, period_start, period_end) DO UPDATE SET
            currency = excluded.currency,
            user_count = excluded.user_count,
            avg_spent = excluded.avg_spent,
            median_spent = excluded.median_spent,
            p25_spent = excluded.p25_spent,
            p75_spent = excluded.p75_spent,
            avg_transaction_count = excluded.avg_transaction_count,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(tier.as_str())
    .bind(location_key)
    .bind(&start)
    .bind(&end)
    .bind(&benchmark.currency)
    .bind(benchmark.user_count)
    .bind(benchmark.total.avg_spent)
    .bind(benchmark.total.median_spent)
    .bind(benchmark.total.p25_spent)
    .bind(benchmark.total.p75_spent)
    .bind(benchmark.total.avg_transaction_count)
    .execute(&mut *tx)
    .await?;

    for (category, figures) in &benchmark.categories {
        sqlx::query(
            r#"
            INSERT INTO peer_category_benchmarks (
                tier, location_key, period_start, period_end, category, avg_spent, median_spent
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tier, location_key, period_start, period_end, category) DO UPDATE SET
                avg_spent = excluded.avg_spent,
                median_spent = excluded.median_spent
            "#,
        )
        .bind(tier.as_str())
        .bind(location_key)
        .bind(&start)
        .bind(&end)
        .bind(category)
        .bind(figures.avg_spent)
        .bind(figures.median_spent)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// One row of a peer aggregate export. Rows with an empty `category` carry
/// the tier totals; the others carry per-category figures.
#[derive(Debug, Deserialize)]
struct PeerCsvRecord {
    tier: String,
    #[serde(default)]
    location_key: String,
    period_start: String,
    period_end: String,
    currency: String,
    #[serde(default)]
    category: String,
    user_count: Option<i64>,
    avg_spent: f64,
    median_spent: f64,
    p25_spent: Option<f64>,
    p75_spent: Option<f64>,
    avg_transaction_count: Option<f64>,
}

/// Import peer aggregates from the aggregation job's CSV export
pub async fn import_peer_csv(pool: &SqlitePool, file_path: &str) -> Result<usize> {
    let mut reader = csv::Reader::from_path(file_path)
        .with_context(|| format!("Failed to open CSV file: {}", file_path))?;
    let records: Vec<PeerCsvRecord> = reader
        .deserialize()
        .collect::<Result<_, _>>()
        .with_context(|| format!("Failed to parse CSV file: {}", file_path))?;

    // group rows into one benchmark per (tier, location, period)
    let mut grouped: BTreeMap<(Tier, String, NaiveDate, NaiveDate), PeerBenchmark> = BTreeMap::new();
    for record in records {
        let tier: Tier = record.tier.parse()?;
        let key = (
            tier,
            record.location_key.clone(),
            parse_date(&record.period_start)?,
            parse_date(&record.period_end)?,
        );
        let entry = grouped.entry(key).or_insert_with(|| PeerBenchmark {
            location: record.location_key.clone(),
            user_count: 0,
            currency: record.currency.clone(),
            total: PeerTotals {
                avg_spent: 0.0,
                median_spent: 0.0,
                p25_spent: 0.0,
                p75_spent: 0.0,
                avg_transaction_count: 0.0,
            },
            categories: BTreeMap::new(),
        });

        if record.category.is_empty() {
            entry.user_count = record.user_count.unwrap_or(0);
            entry.currency = record.currency;
            entry.total = PeerTotals {
                avg_spent: record.avg_spent,
                median_spent: record.median_spent,
                p25_spent: record.p25_spent.unwrap_or(record.median_spent),
                p75_spent: record.p75_spent.unwrap_or(record.median_spent),
                avg_transaction_count: record.avg_transaction_count.unwrap_or(0.0),
            };
        } else {
            entry.categories.insert(
                record.category,
                PeerCategory {
                    avg_spent: record.avg_spent,
                    median_spent: record.median_spent,
                },
            );
        }
    }

    let progress = ProgressBar::new(grouped.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} peer groups")?
            .progress_chars("#>-"),
    );

    for ((tier, location_key, start, end), benchmark) in &grouped {
        upsert_peer_benchmark(pool, *tier, location_key, *start, *end, benchmark).await?;
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(grouped.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn pool() -> Result<SqlitePool> {
        let pool = db::create_test_pool().await?;
        db::migrate_database(&pool).await?;
        Ok(pool)
    }

    fn sample(median: f64) -> PeerBenchmark {
        let mut categories = BTreeMap::new();
        categories.insert(
            "Food".to_string(),
            PeerCategory {
                avg_spent: 190.0,
                median_spent: 180.0,
            },
        );
        PeerBenchmark {
            location: "Madrid".to_string(),
            user_count: 42,
            currency: "EUR".to_string(),
            total: PeerTotals {
                avg_spent: 350.0,
                median_spent: median,
                p25_spent: 200.0,
                p75_spent: 450.0,
                avg_transaction_count: 22.5,
            },
            categories,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_and_overlap_lookup() -> Result<()> {
        let pool = pool().await?;
        upsert_peer_benchmark(&pool, Tier::Local, "Madrid", date(2025, 3, 1), date(2025, 3, 31), &sample(320.0)).await?;
        upsert_peer_benchmark(&pool, Tier::Local, "Madrid", date(2025, 4, 1), date(2025, 4, 30), &sample(330.0)).await?;

        let source = SqlitePeerSource::new(pool);
        let found = source
            .get_peer_benchmark(Tier::Local, "Madrid", date(2025, 3, 10), date(2025, 4, 8))
            .await?
            .unwrap();
        // March overlaps 22 of the 30 requested days, April only 8
        assert_relative_eq!(found.total.median_spent, 320.0 * 30.0 / 31.0, epsilon = 1e-9);
        assert_eq!(found.user_count, 42);
        assert_relative_eq!(found.categories["Food"].median_spent, 180.0 * 30.0 / 31.0, epsilon = 1e-9);

        let other_city = source
            .get_peer_benchmark(Tier::Local, "Seville", date(2025, 3, 10), date(2025, 4, 8))
            .await?;
        assert!(other_city.is_none());

        let outside = source
            .get_peer_benchmark(Tier::Local, "Madrid", date(2025, 6, 1), date(2025, 6, 30))
            .await?;
        assert!(outside.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_yearly_aggregate_is_prorated_to_month() -> Result<()> {
        let pool = pool().await?;
        let mut yearly = sample(3840.0);
        yearly.total.p25_spent = 2400.0;
        yearly.total.p75_spent = 5400.0;
        yearly.total.avg_transaction_count = 365.0;
        upsert_peer_benchmark(&pool, Tier::Global, "", date(2025, 1, 1), date(2025, 12, 31), &yearly).await?;

        let source = SqlitePeerSource::new(pool);
        let march = source
            .get_peer_benchmark(Tier::Global, "", date(2025, 3, 1), date(2025, 3, 31))
            .await?
            .unwrap();

        let factor = 31.0 / 365.0;
        assert_eq!(march.location, "Global");
        assert_eq!(march.user_count, 42);
        assert_relative_eq!(march.total.median_spent, 3840.0 * factor, epsilon = 1e-9);
        assert_relative_eq!(march.total.p25_spent, 2400.0 * factor, epsilon = 1e-9);
        assert_relative_eq!(march.total.p75_spent, 5400.0 * factor, epsilon = 1e-9);
        assert_relative_eq!(march.total.avg_transaction_count, 31.0, epsilon = 1e-9);
        assert_relative_eq!(march.categories["Food"].median_spent, 180.0 * factor, epsilon = 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_matching_month_preferred_over_year() -> Result<()> {
        let pool = pool().await?;
        upsert_peer_benchmark(&pool, Tier::Country, "ES", date(2025, 1, 1), date(2025, 12, 31), &sample(3840.0)).await?;
        upsert_peer_benchmark(&pool, Tier::Country, "ES", date(2025, 3, 1), date(2025, 3, 31), &sample(310.0)).await?;
        upsert_peer_benchmark(&pool, Tier::Country, "ES", date(2025, 3, 15), date(2026, 3, 14), &sample(4000.0)).await?;

        let source = SqlitePeerSource::new(pool);
        let march = source
            .get_peer_benchmark(Tier::Country, "ES", date(2025, 3, 1), date(2025, 3, 31))
            .await?
            .unwrap();
        assert_relative_eq!(march.total.median_spent, 310.0);
        assert_relative_eq!(march.total.avg_transaction_count, 22.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_peer_csv() -> Result<()> {
        let pool = pool().await?;
        let mut file = NamedTempFile::new()?;
        writeln!(file, "tier,location_key,period_start,period_end,currency,category,user_count,avg_spent,median_spent,p25_spent,p75_spent,avg_transaction_count")?;
        writeln!(file, "global,,2025-01-01,2025-12-31,EUR,,1000,400,350,220,520,25")?;
        writeln!(file, "global,,2025-01-01,2025-12-31,EUR,Food,,150,140,,,")?;
        writeln!(file, "country,DE,2025-01-01,2025-12-31,EUR,,300,420,360,230,530,24")?;

        let imported = import_peer_csv(&pool, file.path().to_str().unwrap()).await?;
        assert_eq!(imported, 2);

        let source = SqlitePeerSource::new(pool);
        let global = source
            .get_peer_benchmark(Tier::Global, "", date(2025, 1, 1), date(2025, 12, 31))
            .await?
            .unwrap();
        assert_eq!(global.user_count, 1000);
        assert_relative_eq!(global.total.p75_spent, 520.0);
        assert_relative_eq!(global.categories["Food"].avg_spent, 150.0);

        Ok(())
    }
}
