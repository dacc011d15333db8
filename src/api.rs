// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! External exchange rate source (Financial Modeling Prep)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reqwest::Client;
use serde::Deserialize;

use crate::db::format_date;

pub const DEFAULT_FMP_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

/// A rate obtained from the external source
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRate {
    pub rate: f64,
    pub effective_date: NaiveDate,
}

#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Rate for the pair as of (or nearest before) the date; `None` when the
    /// source has nothing for it
    async fn fetch_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FetchedRate>>;
}

/// Stand-in used when no API key is configured
pub struct NoopFetcher;

#[async_trait]
impl RateFetcher for NoopFetcher {
    async fn fetch_rate(&self, _: &str, _: &str, _: NaiveDate) -> Result<Option<FetchedRate>> {
        Ok(None)
    }
}

pub struct FMPClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForexQuote {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub timestamp: Option<i64>,
}

impl ForexQuote {
    /// Split "EUR/USD" into its two currency codes
    pub fn pair(&self) -> Option<(String, String)> {
        let name = self.name.as_deref()?;
        let (from, to) = name.split_once('/')?;
        let (from, to) = (from.trim(), to.trim());
        if from.len() != 3 || to.len() != 3 {
            return None;
        }
        Some((from.to_uppercase(), to.to_uppercase()))
    }
}

#[derive(Debug, Deserialize)]
struct HistoricalPrices {
    #[serde(default)]
    historical: Vec<HistoricalPrice>,
}

#[derive(Debug, Deserialize)]
struct HistoricalPrice {
    date: String,
    close: Option<f64>,
}

impl FMPClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_FMP_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Latest quotes for all forex pairs
    pub async fn get_exchange_rates(&self) -> Result<Vec<ForexQuote>> {
        let url = format!("{}/quotes/forex?apikey={}", self.base_url, self.api_key);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to get response text")?;

        if !status.is_success() {
            anyhow::bail!("API request failed with status {}: {}", status, text);
        }

        let quotes: Vec<ForexQuote> =
            serde_json::from_str(&text).context("Failed to parse forex quotes response")?;
        Ok(quotes)
    }

    /// Daily closes for a pair over a date window, newest first
    async fn get_historical_closes(
        &self,
        from_currency: &str,
        to_currency: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let url = format!(
            "{}/historical-price-full/{}{}?from={}&to={}&apikey={}",
            self.base_url,
            from_currency,
            to_currency,
            format_date(start),
            format_date(end),
            self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to get response text")?;

        if !status.is_success() {
            anyhow::bail!("API request failed with status {}: {}", status, text);
        }

        // FMP answers `{}` for unknown pairs
        let prices: HistoricalPrices =
            serde_json::from_str(&text).context("Failed to parse historical forex response")?;

        let mut closes: Vec<(NaiveDate, f64)> = prices
            .historical
            .into_iter()
            .filter_map(|p| {
                let date = NaiveDate::parse_from_str(&p.date, "%Y-%m-%d").ok()?;
                let close = p.close.filter(|c| c.is_finite() && *c > 0.0)?;
                Some((date, close))
            })
            .collect();
        closes.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(closes)
    }
}

/// Window looked back over so weekends and holidays still find a close
const LOOKBACK_DAYS: i64 = 7;

#[async_trait]
impl RateFetcher for FMPClient {
    async fn fetch_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FetchedRate>> {
        let start = as_of - Duration::days(LOOKBACK_DAYS);
        let closes = self
            .get_historical_closes(from_currency, to_currency, start, as_of)
            .await?;

        Ok(closes
            .into_iter()
            .find(|(date, _)| *date <= as_of)
            .map(|(effective_date, rate)| FetchedRate {
                rate,
                effective_date,
            }))
    }
}
