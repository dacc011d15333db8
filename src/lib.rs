// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

pub mod api;
pub mod benchmark;
pub mod config;
pub mod currencies;
pub mod db;
pub mod error;
pub mod exchange_rates;
pub mod expenses;
pub mod insights;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod peers;
pub mod rate_graph;
pub mod statistics;
pub mod timeframe;

pub use benchmark::{compare_with_peers, estimate_percentile, potential_savings};
pub use error::{BenchmarkError, Result};
pub use normalizer::{Conversion, CurrencyNormalizer, ResolutionPath};
pub use orchestrator::BenchmarkOrchestrator;
pub use statistics::compute_user_statistics;
pub use timeframe::Timeframe;
