// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Rate store: historical exchange rates keyed by (from, to, effective date)

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::db::{format_date, parse_date};
use crate::models::ExchangeRate;

#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recent rate for the pair with effective_date <= as_of
    async fn lookup_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ExchangeRate>>;

    /// Insert or replace the rate for (from, to, effective_date)
    async fn upsert_rate(&self, rate: &ExchangeRate) -> Result<()>;

    /// Latest rate per pair with effective_date <= as_of
    async fn rates_as_of(&self, as_of: NaiveDate) -> Result<Vec<ExchangeRate>>;
}

fn validate_rate(rate: &ExchangeRate) -> Result<()> {
    if !rate.rate.is_finite() || rate.rate <= 0.0 {
        anyhow::bail!(
            "Rate for {}/{} must be positive, got {}",
            rate.from_currency,
            rate.to_currency,
            rate.rate
        );
    }
    if rate.from_currency == rate.to_currency {
        anyhow::bail!("Cannot store a rate from {} to itself", rate.from_currency);
    }
    Ok(())
}

/// Keep only the newest entry per (from, to) pair
fn latest_per_pair(rates: impl IntoIterator<Item = ExchangeRate>) -> Vec<ExchangeRate> {
    let mut latest: HashMap<(String, String), ExchangeRate> = HashMap::new();
    for rate in rates {
        let key = (rate.from_currency.clone(), rate.to_currency.clone());
        match latest.get(&key) {
            Some(existing) if existing.effective_date >= rate.effective_date => {}
            _ => {
                latest.insert(key, rate);
            }
        }
    }

    let mut rates: Vec<ExchangeRate> = latest.into_values().collect();
    rates.sort_by(|a, b| {
        (&a.from_currency, &a.to_currency).cmp(&(&b.from_currency, &b.to_currency))
    });
    rates
}

pub struct SqliteRateStore {
    pool: SqlitePool,
}

impl SqliteRateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type RateRow = (String, String, f64, String, String);

fn rate_from_row(row: RateRow) -> Result<ExchangeRate> {
    let (from_currency, to_currency, rate, effective_date, source) = row;
    Ok(ExchangeRate {
        from_currency,
        to_currency,
        rate,
        effective_date: parse_date(&effective_date)?,
        source: source.parse()?,
    })
}

#[async_trait]
impl RateStore for SqliteRateStore {
    async fn lookup_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let row = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT from_currency, to_currency, rate, effective_date, source
            FROM exchange_rates
            WHERE from_currency = ?
            AND to_currency = ?
            AND effective_date <= ?
            ORDER BY effective_date DESC
            LIMIT 1
            "#,
        )
        .bind(from_currency)
        .bind(to_currency)
        .bind(format_date(as_of))
        .fetch_optional(&self.pool)
        .await?;

        row.map(rate_from_row).transpose()
    }

    async fn upsert_rate(&self, rate: &ExchangeRate) -> Result<()> {
        validate_rate(rate)?;

        sqlx::query(
            r#"
            INSERT INTO exchange_rates (from_currency, to_currency, rate, effective_date, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(from_currency, to_currency, effective_date) DO UPDATE SET
                rate = excluded.rate,
                source = excluded.source,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&rate.from_currency)
        .bind(&rate.to_currency)
        .bind(rate.rate)
        .bind(format_date(rate.effective_date))
        .bind(rate.source.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rates_as_of(&self, as_of: NaiveDate) -> Result<Vec<ExchangeRate>> {
        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT from_currency, to_currency, rate, effective_date, source
            FROM exchange_rates
            WHERE effective_date <= ?
            ORDER BY from_currency, to_currency, effective_date DESC
            "#,
        )
        .bind(format_date(as_of))
        .fetch_all(&self.pool)
        .await?;

        let rates = rows
            .into_iter()
            .map(rate_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(latest_per_pair(rates))
    }
}

/// Rate store held in memory, for embedding and tests
#[derive(Default)]
pub struct InMemoryRateStore {
    rates: RwLock<HashMap<(String, String, NaiveDate), ExchangeRate>>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rates(rates: impl IntoIterator<Item = ExchangeRate>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.rates.write() {
            for rate in rates {
                map.insert(
                    (
                        rate.from_currency.clone(),
                        rate.to_currency.clone(),
                        rate.effective_date,
                    ),
                    rate,
                );
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.rates.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn lookup_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let map = self
            .rates
            .read()
            .map_err(|_| anyhow::anyhow!("rate store lock poisoned"))?;
        Ok(map
            .values()
            .filter(|r| {
                r.from_currency == from_currency
                    && r.to_currency == to_currency
                    && r.effective_date <= as_of
            })
            .max_by_key(|r| r.effective_date)
            .cloned())
    }

    async fn upsert_rate(&self, rate: &ExchangeRate) -> Result<()> {
        validate_rate(rate)?;
        let mut map = self
            .rates
            .write()
            .map_err(|_| anyhow::anyhow!("rate store lock poisoned"))?;
        map.insert(
            (
                rate.from_currency.clone(),
                rate.to_currency.clone(),
                rate.effective_date,
            ),
            rate.clone(),
        );
        Ok(())
    }

    async fn rates_as_of(&self, as_of: NaiveDate) -> Result<Vec<ExchangeRate>> {
        let map = self
            .rates
            .read()
            .map_err(|_| anyhow::anyhow!("rate store lock poisoned"))?;
        Ok(latest_per_pair(
            map.values().filter(|r| r.effective_date <= as_of).cloned(),
        ))
    }
}

/// Static table of common pairs, used when the external source is unavailable
pub fn get_rate_map() -> HashMap<String, f64> {
    let mut rate_map = HashMap::new();

    rate_map.insert("EUR/USD".to_string(), 1.1);
    rate_map.insert("EUR/GBP".to_string(), 0.85);
    rate_map.insert("EUR/JPY".to_string(), 160.0);
    rate_map.insert("EUR/CHF".to_string(), 0.95);
    rate_map.insert("EUR/SEK".to_string(), 11.4);
    rate_map.insert("EUR/NOK".to_string(), 11.6);
    rate_map.insert("EUR/DKK".to_string(), 7.46);
    rate_map.insert("EUR/PLN".to_string(), 4.3);
    rate_map.insert("USD/CAD".to_string(), 1.36);
    rate_map.insert("USD/CNY".to_string(), 7.2);
    rate_map.insert("USD/INR".to_string(), 83.0);
    rate_map.insert("USD/BRL".to_string(), 5.0);
    rate_map.insert("AUD/USD".to_string(), 0.66);

    rate_map
}

/// Look up a pair in the static table, directly or through its inverse
pub fn static_rate(from_currency: &str, to_currency: &str) -> Option<f64> {
    let rate_map = get_rate_map();

    if let Some(&rate) = rate_map.get(&format!("{}/{}", from_currency, to_currency)) {
        return Some(rate);
    }

    rate_map
        .get(&format!("{}/{}", to_currency, from_currency))
        .filter(|rate| **rate > 0.0)
        .map(|rate| 1.0 / rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::RateSource;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rate(from: &str, to: &str, value: f64, effective_date: NaiveDate) -> ExchangeRate {
        ExchangeRate {
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            rate: value,
            effective_date,
            source: RateSource::Manual,
        }
    }

    async fn sqlite_store() -> Result<SqliteRateStore> {
        let pool = db::create_test_pool().await?;
        db::migrate_database(&pool).await?;
        Ok(SqliteRateStore::new(pool))
    }

    #[tokio::test]
    async fn test_lookup_picks_most_recent_not_after_date() -> Result<()> {
        let store = sqlite_store().await?;
        store.upsert_rate(&rate("EUR", "USD", 1.05, date(2025, 1, 1))).await?;
        store.upsert_rate(&rate("EUR", "USD", 1.08, date(2025, 2, 1))).await?;
        store.upsert_rate(&rate("EUR", "USD", 1.12, date(2025, 3, 1))).await?;

        let found = store.lookup_rate("EUR", "USD", date(2025, 2, 15)).await?;
        let found = found.unwrap();
        assert_relative_eq!(found.rate, 1.08, epsilon = 0.00001);
        assert_eq!(found.effective_date, date(2025, 2, 1));

        let too_early = store.lookup_rate("EUR", "USD", date(2024, 12, 31)).await?;
        assert!(too_early.is_none());

        let missing = store.lookup_rate("USD", "EUR", date(2025, 2, 15)).await?;
        assert!(missing.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_date() -> Result<()> {
        let store = sqlite_store().await?;
        store.upsert_rate(&rate("GBP", "EUR", 1.17, date(2025, 1, 10))).await?;

        let mut updated = rate("GBP", "EUR", 1.19, date(2025, 1, 10));
        updated.source = RateSource::Api;
        store.upsert_rate(&updated).await?;

        let found = store.lookup_rate("GBP", "EUR", date(2025, 1, 10)).await?.unwrap();
        assert_relative_eq!(found.rate, 1.19, epsilon = 0.00001);
        assert_eq!(found.source, RateSource::Api);
        assert_eq!(store.rates_as_of(date(2025, 1, 10)).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_non_positive_rate() -> Result<()> {
        let store = sqlite_store().await?;
        assert!(store.upsert_rate(&rate("EUR", "USD", 0.0, date(2025, 1, 1))).await.is_err());
        assert!(store.upsert_rate(&rate("EUR", "USD", -1.0, date(2025, 1, 1))).await.is_err());
        assert!(store.upsert_rate(&rate("EUR", "EUR", 1.0, date(2025, 1, 1))).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_rates_as_of_keeps_latest_per_pair() -> Result<()> {
        let store = sqlite_store().await?;
        store.upsert_rate(&rate("EUR", "USD", 1.05, date(2025, 1, 1))).await?;
        store.upsert_rate(&rate("EUR", "USD", 1.08, date(2025, 2, 1))).await?;
        store.upsert_rate(&rate("USD", "JPY", 150.0, date(2025, 1, 15))).await?;
        store.upsert_rate(&rate("USD", "JPY", 155.0, date(2025, 6, 1))).await?;

        let rates = store.rates_as_of(date(2025, 3, 1)).await?;
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].from_currency, "EUR");
        assert_relative_eq!(rates[0].rate, 1.08, epsilon = 0.00001);
        assert_eq!(rates[1].from_currency, "USD");
        assert_relative_eq!(rates[1].rate, 150.0, epsilon = 0.00001);

        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_store_matches_sqlite_semantics() -> Result<()> {
        let store = InMemoryRateStore::with_rates(vec![
            rate("EUR", "USD", 1.05, date(2025, 1, 1)),
            rate("EUR", "USD", 1.08, date(2025, 2, 1)),
        ]);

        let found = store.lookup_rate("EUR", "USD", date(2025, 1, 20)).await?.unwrap();
        assert_relative_eq!(found.rate, 1.05, epsilon = 0.00001);

        store.upsert_rate(&rate("EUR", "USD", 1.07, date(2025, 2, 1))).await?;
        assert_eq!(store.len(), 2);
        let rates = store.rates_as_of(date(2025, 12, 31)).await?;
        assert_eq!(rates.len(), 1);
        assert_relative_eq!(rates[0].rate, 1.07, epsilon = 0.00001);

        Ok(())
    }

    #[test]
    fn test_static_rate_lookup() {
        assert_relative_eq!(static_rate("EUR", "USD").unwrap(), 1.1, epsilon = 0.0001);
        assert_relative_eq!(static_rate("USD", "EUR").unwrap(), 1.0 / 1.1, epsilon = 0.0001);
        assert_relative_eq!(static_rate("JPY", "EUR").unwrap(), 1.0 / 160.0, epsilon = 0.000001);
        assert!(static_rate("XXX", "USD").is_none());
    }
}
