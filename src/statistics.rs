// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use std::collections::BTreeMap;

use crate::models::{CategoryStats, StandardizedExpense, UserStatistics};

/// Reduce a user's standardized expenses into period aggregates.
///
/// The period spans the oldest to the newest expense date inclusive, so input
/// order does not matter.
pub fn compute_user_statistics(expenses: &[StandardizedExpense]) -> UserStatistics {
    let mut total = 0.0f64;
    let mut largest_expense = 0.0f64;
    let mut categories: BTreeMap<String, CategoryStats> = BTreeMap::new();

    for expense in expenses {
        let amount = expense.standardized_amount;
        total += amount;
        largest_expense = largest_expense.max(amount);

        let entry = categories
            .entry(expense.expense.category.clone())
            .or_default();
        entry.total += amount;
        entry.count += 1;
    }

    for stats in categories.values_mut() {
        stats.percentage = if total > 0.0 {
            (stats.total / total) * 100.0
        } else {
            0.0
        };
    }

    let transaction_count = expenses.len();
    let avg_expense = if transaction_count > 0 {
        total / transaction_count as f64
    } else {
        0.0
    };

    let oldest = expenses.iter().map(|e| e.expense.expense_date).min();
    let newest = expenses.iter().map(|e| e.expense.expense_date).max();
    let days_in_period = match (oldest, newest) {
        (Some(oldest), Some(newest)) => ((newest - oldest).num_days() + 1).max(1),
        _ => 1,
    };

    let daily_avg = total / days_in_period as f64;

    UserStatistics {
        total,
        transaction_count,
        avg_expense,
        largest_expense,
        daily_avg,
        weekly_avg: daily_avg * 7.0,
        days_in_period,
        categories,
    }
}
