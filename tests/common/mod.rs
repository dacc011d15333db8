// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Common test utilities and helpers
//!
//! Temporary databases with the full schema, plus seeding helpers for
//! rates, expenses, user locations and peer aggregates.

#![allow(dead_code)]

use anyhow::Result;
use chrono::NaiveDate;
use spend_benchmark::currencies::{RateStore, SqliteRateStore};
use spend_benchmark::db;
use spend_benchmark::expenses::{insert_expense, upsert_user_location};
use spend_benchmark::models::{
    ExchangeRate, PeerBenchmark, PeerCategory, PeerTotals, RateSource, Tier, UserLocation,
};
use spend_benchmark::peers::upsert_peer_benchmark;
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use tempfile::TempDir;

/// Creates a temporary SQLite database with migrations applied
pub async fn create_test_db() -> Result<(SqlitePool, TempDir)> {
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = db::create_db_pool(&db_url).await?;

    Ok((pool, temp_dir))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn seed_rate(pool: &SqlitePool, from: &str, to: &str, rate: f64, effective: NaiveDate) -> Result<()> {
    SqliteRateStore::new(pool.clone())
        .upsert_rate(&ExchangeRate {
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            rate,
            effective_date: effective,
            source: RateSource::Manual,
        })
        .await
}

/// Inserts `(amount, currency, date, category)` expenses for a user
pub async fn seed_expenses(
    pool: &SqlitePool,
    user_id: i64,
    expenses: &[(f64, &str, NaiveDate, &str)],
) -> Result<()> {
    for (amount, currency, expense_date, category) in expenses {
        insert_expense(pool, user_id, *amount, currency, *expense_date, category).await?;
    }
    Ok(())
}

pub async fn seed_location(pool: &SqlitePool, user_id: i64, city: Option<&str>, country: Option<&str>) -> Result<()> {
    let location = UserLocation {
        city: city.map(str::to_string),
        country: country.map(str::to_string),
    };
    upsert_user_location(pool, user_id, &location).await
}

/// Peer aggregate with the given total quartiles and per-category medians
/// (category averages are set 10% above the medians)
pub fn peer_benchmark(
    location: &str,
    currency: &str,
    (p25, median, p75): (f64, f64, f64),
    categories: &[(&str, f64)],
) -> PeerBenchmark {
    PeerBenchmark {
        location: location.to_string(),
        user_count: 250,
        currency: currency.to_string(),
        total: PeerTotals {
            avg_spent: median * 1.1,
            median_spent: median,
            p25_spent: p25,
            p75_spent: p75,
            avg_transaction_count: 2.0,
        },
        categories: categories
            .iter()
            .map(|(name, median)| {
                (
                    name.to_string(),
                    PeerCategory {
                        avg_spent: median * 1.1,
                        median_spent: *median,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>(),
    }
}

pub async fn seed_peers(
    pool: &SqlitePool,
    tier: Tier,
    location_key: &str,
    period: (NaiveDate, NaiveDate),
    benchmark: &PeerBenchmark,
) -> Result<()> {
    upsert_peer_benchmark(pool, tier, location_key, period.0, period.1, benchmark).await
}
