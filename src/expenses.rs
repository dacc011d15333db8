// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use crate::db::{format_date, parse_date};
use crate::models::{Expense, UserLocation};

#[async_trait]
pub trait ExpenseSource: Send + Sync {
    /// Expenses dated within [start, end], newest first
    async fn get_expenses_for_period(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Expense>>;

    async fn get_user_location(&self, user_id: i64) -> Result<UserLocation>;
}

pub struct SqliteExpenseSource {
    pool: SqlitePool,
}

impl SqliteExpenseSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpenseSource for SqliteExpenseSource {
    async fn get_expenses_for_period(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Expense>> {
        let rows = sqlx::query_as::<_, (i64, f64, String, String, String)>(
            r#"
            SELECT id, amount, currency, expense_date, category
            FROM expenses
            WHERE user_id = ?
            AND expense_date BETWEEN ? AND ?
            ORDER BY expense_date DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, amount, currency, expense_date, category)| {
                Ok(Expense {
                    id,
                    amount,
                    currency,
                    expense_date: parse_date(&expense_date)?,
                    category,
                })
            })
            .collect()
    }

    async fn get_user_location(&self, user_id: i64) -> Result<UserLocation> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT city, country FROM user_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|(city, country)| UserLocation { city, country })
            .unwrap_or_default())
    }
}

/// Insert an expense and return its id
pub async fn insert_expense(
    pool: &SqlitePool,
    user_id: i64,
    amount: f64,
    currency: &str,
    expense_date: NaiveDate,
    category: &str,
) -> Result<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        anyhow::bail!("Expense amount must be positive, got {}", amount);
    }

    let result = sqlx::query(
        r#"
        INSERT INTO expenses (user_id, amount, currency, expense_date, category)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(currency.trim().to_uppercase())
    .bind(format_date(expense_date))
    .bind(category)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn upsert_user_location(
    pool: &SqlitePool,
    user_id: i64,
    location: &UserLocation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, city, country)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            city = excluded.city,
            country = excluded.country,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(user_id)
    .bind(location.city.as_deref())
    .bind(location.country.as_deref())
    .execute(pool)
    .await?;

    Ok(())
}

/// Expense row as exported by the bot's CSV backup
#[derive(Debug, Deserialize)]
struct ExpenseCsvRecord {
    user_id: i64,
    amount: f64,
    currency: String,
    date: String,
    category: String,
}

/// Import expenses from a CSV file with columns
/// `user_id,amount,currency,date,category`
pub async fn import_expenses_csv(pool: &SqlitePool, file_path: &str) -> Result<usize> {
    let mut reader = csv::Reader::from_path(file_path)
        .with_context(|| format!("Failed to open CSV file: {}", file_path))?;
    let records: Vec<ExpenseCsvRecord> = reader
        .deserialize()
        .collect::<Result<_, _>>()
        .with_context(|| format!("Failed to parse CSV file: {}", file_path))?;

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} expenses")?
            .progress_chars("#>-"),
    );

    for record in &records {
        let date = parse_date(&record.date)?;
        insert_expense(
            pool,
            record.user_id,
            record.amount,
            &record.currency,
            date,
            &record.category,
        )
        .await
        .with_context(|| format!("Failed to import expense dated {}", record.date))?;
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(records.len())
}
