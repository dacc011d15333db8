// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::api::{FMPClient, ForexQuote};
use crate::currencies::RateStore;
use crate::models::{ExchangeRate, RateSource};
use crate::normalizer::normalize_code;

/// Anything that can list the latest forex quotes
#[async_trait]
pub trait ForexQuoteSource: Send + Sync {
    async fn get_exchange_rates(&self) -> Result<Vec<ForexQuote>>;
}

#[async_trait]
impl ForexQuoteSource for FMPClient {
    async fn get_exchange_rates(&self) -> Result<Vec<ForexQuote>> {
        FMPClient::get_exchange_rates(self).await
    }
}

/// Store the current forex quotes as API rates effective on `date`.
///
/// Only pairs where both sides are in `currencies` are kept (every pair when
/// it is empty). Returns the number of rates written; malformed quotes are
/// skipped.
pub async fn update_exchange_rates(
    quotes: &dyn ForexQuoteSource,
    store: &dyn RateStore,
    currencies: &[String],
    date: NaiveDate,
) -> Result<usize> {
    let tracked = |code: &str| currencies.is_empty() || currencies.iter().any(|c| c == code);

    info!("Fetching current exchange rates");
    let exchange_rates = quotes
        .get_exchange_rates()
        .await
        .context("Failed to fetch exchange rates")?;

    let mut stored = 0;
    for quote in exchange_rates {
        let (Some((from_currency, to_currency)), Some(price)) = (quote.pair(), quote.price) else {
            continue;
        };
        if !tracked(&from_currency) || !tracked(&to_currency) {
            continue;
        }
        if !price.is_finite() || price <= 0.0 || from_currency == to_currency {
            warn!(name = ?quote.name, price, "Skipping unusable forex quote");
            continue;
        }

        store
            .upsert_rate(&ExchangeRate {
                from_currency,
                to_currency,
                rate: price,
                effective_date: date,
                source: RateSource::Api,
            })
            .await?;
        stored += 1;
    }

    info!(stored, %date, "Exchange rates updated");
    Ok(stored)
}

/// Record an operator-supplied rate
pub async fn add_manual_rate(
    store: &dyn RateStore,
    from_currency: &str,
    to_currency: &str,
    rate: f64,
    effective_date: NaiveDate,
) -> Result<ExchangeRate> {
    let rate = ExchangeRate {
        from_currency: normalize_code(from_currency),
        to_currency: normalize_code(to_currency),
        rate,
        effective_date,
        source: RateSource::Manual,
    };
    store.upsert_rate(&rate).await?;
    info!(
        from = %rate.from_currency,
        to = %rate.to_currency,
        rate = rate.rate,
        %effective_date,
        "Stored manual exchange rate"
    );
    Ok(rate)
}
