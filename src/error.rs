// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("No exchange rate found for {from_currency} to {to_currency} as of {date}")]
    RateNotFound {
        from_currency: String,
        to_currency: String,
        date: NaiveDate,
    },
    #[error("Insufficient data: no usable global peer benchmark for {start} to {end}")]
    PeerDataUnavailable { start: NaiveDate, end: NaiveDate },
    #[error("Invalid period: end date {end} is before start date {start}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl BenchmarkError {
    pub fn rate_not_found(from_currency: &str, to_currency: &str, date: NaiveDate) -> Self {
        BenchmarkError::RateNotFound {
            from_currency: from_currency.to_string(),
            to_currency: to_currency.to_string(),
            date,
        }
    }
}

pub type Result<T, E = BenchmarkError> = std::result::Result<T, E>;
