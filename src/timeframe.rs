// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;

use crate::error::{BenchmarkError, Result};

/// Benchmark period: a rolling window ending at the reference date, or an
/// explicit date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Week,
    Month,
    Quarter,
    Year,
    Custom { start: NaiveDate, end: NaiveDate },
}

impl Timeframe {
    pub fn days(&self) -> i64 {
        match self {
            Timeframe::Week => 7,
            Timeframe::Month => 30,
            Timeframe::Quarter => 90,
            Timeframe::Year => 365,
            Timeframe::Custom { start, end } => (*end - *start).num_days() + 1,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Quarter => "quarter",
            Timeframe::Year => "year",
            Timeframe::Custom { .. } => "custom",
        }
    }

    /// Inclusive (start, end) dates of the period
    pub fn period(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        match *self {
            Timeframe::Custom { start, end } => validate_period(start, end).map(|()| (start, end)),
            _ => Ok((today - Duration::days(self.days() - 1), today)),
        }
    }
}

pub fn validate_period(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(BenchmarkError::InvalidPeriod { start, end });
    }
    Ok(())
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Custom { start, end } => write!(f, "{} to {}", start, end),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "week" | "7d" => Ok(Timeframe::Week),
            "month" | "30d" => Ok(Timeframe::Month),
            "quarter" | "90d" => Ok(Timeframe::Quarter),
            "year" | "1y" | "365d" => Ok(Timeframe::Year),
            other => {
                // "YYYY-MM-DD..YYYY-MM-DD"
                let (start, end) = other.split_once("..").ok_or_else(|| {
                    anyhow::anyhow!(
                        "Invalid timeframe '{}'. Use: week, month, quarter, year or START..END",
                        s
                    )
                })?;
                let start = crate::db::parse_date(start)?;
                let end = crate::db::parse_date(end)?;
                Ok(Timeframe::Custom { start, end })
            }
        }
    }
}
