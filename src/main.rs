// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::env;
use std::sync::Arc;

use spend_benchmark::api::{FMPClient, NoopFetcher, RateFetcher};
use spend_benchmark::config::Config;
use spend_benchmark::currencies::{RateStore, SqliteRateStore};
use spend_benchmark::db;
use spend_benchmark::exchange_rates;
use spend_benchmark::expenses::{self, SqliteExpenseSource};
use spend_benchmark::models::UserLocation;
use spend_benchmark::peers::{self, SqlitePeerSource};
use spend_benchmark::{BenchmarkOrchestrator, CurrencyNormalizer, Timeframe};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Benchmark a user's spending against their peers
    Benchmark {
        #[arg(long)]
        user: i64,
        /// week, month, quarter, year or START..END (YYYY-MM-DD)
        #[arg(long, default_value = "month")]
        timeframe: Timeframe,
        /// Report currency (defaults to the configured one)
        #[arg(long)]
        currency: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert an amount between currencies
    Convert {
        amount: f64,
        from: String,
        to: String,
        /// Rate date (YYYY-MM-DD format), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Store a manual exchange rate
    AddRate {
        from: String,
        to: String,
        rate: f64,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List the latest rate per currency pair
    ListRates {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Fetch current exchange rates from the external source
    FetchRates {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Import expenses from CSV (user_id,amount,currency,date,category)
    ImportExpenses { file: String },
    /// Import peer aggregates from CSV
    ImportPeers { file: String },
    /// Set the city and country used for local and country peers
    SetLocation {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
}

fn fmp_client(config: &Config) -> Option<FMPClient> {
    let api_key = env::var("FINANCIALMODELINGPREP_API_KEY").ok()?;
    Some(FMPClient::with_base_url(api_key, &config.rate_api_base_url))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load_or_default();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:benchmark.db".to_string());
    let pool = db::create_db_pool(&db_url).await?;
    let store = Arc::new(SqliteRateStore::new(pool.clone()));
    let today = Local::now().date_naive();

    let fetcher: Arc<dyn RateFetcher> = match fmp_client(&config) {
        Some(client) => Arc::new(client),
        None => Arc::new(NoopFetcher),
    };
    let normalizer = CurrencyNormalizer::new(store.clone(), fetcher)
        .with_base_currency(&config.base_currency)
        .with_fetch_timeout(config.fetch_timeout());

    match cli.command {
        Commands::Benchmark {
            user,
            timeframe,
            currency,
            json,
        } => {
            let orchestrator = BenchmarkOrchestrator::new(
                Arc::new(SqliteExpenseSource::new(pool.clone())),
                Arc::new(SqlitePeerSource::new(pool.clone())),
                normalizer,
            );
            let currency = currency.unwrap_or_else(|| config.default_report_currency.clone());
            let report = orchestrator
                .generate_user_benchmark(user, timeframe, &currency)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_text());
            }
        }
        Commands::Convert {
            amount,
            from,
            to,
            date,
        } => {
            let conversion = normalizer
                .convert(amount, &from, &to, date.unwrap_or(today))
                .await?;
            println!(
                "{:.2} {} = {:.4} {} (rate {:.6}, via {})",
                amount,
                from.to_uppercase(),
                conversion.converted_amount,
                to.to_uppercase(),
                conversion.rate_used,
                serde_json::to_string(&conversion.resolution_path)?
            );
        }
        Commands::AddRate {
            from,
            to,
            rate,
            date,
        } => {
            let stored = exchange_rates::add_manual_rate(
                store.as_ref(),
                &from,
                &to,
                rate,
                date.unwrap_or(today),
            )
            .await?;
            println!(
                "✅ Stored {}/{} = {} effective {}",
                stored.from_currency, stored.to_currency, stored.rate, stored.effective_date
            );
        }
        Commands::ListRates { date } => {
            let rates = store.rates_as_of(date.unwrap_or(today)).await?;
            if rates.is_empty() {
                println!("No exchange rates stored.");
            }
            for rate in rates {
                println!(
                    "{}/{}: {:.6} ({}, {})",
                    rate.from_currency, rate.to_currency, rate.rate, rate.effective_date, rate.source
                );
            }
        }
        Commands::FetchRates { date } => {
            let Some(client) = fmp_client(&config) else {
                anyhow::bail!("FINANCIALMODELINGPREP_API_KEY must be set to fetch rates");
            };
            let stored = exchange_rates::update_exchange_rates(
                &client,
                store.as_ref(),
                &config.tracked_currencies,
                date.unwrap_or(today),
            )
            .await?;
            println!("✅ {} exchange rates updated", stored);
        }
        Commands::ImportExpenses { file } => {
            let imported = expenses::import_expenses_csv(&pool, &file).await?;
            println!("✅ Imported {} expenses from {}", imported, file);
        }
        Commands::ImportPeers { file } => {
            let imported = peers::import_peer_csv(&pool, &file).await?;
            println!("✅ Imported {} peer benchmarks from {}", imported, file);
        }
        Commands::SetLocation {
            user,
            city,
            country,
        } => {
            let location = UserLocation { city, country };
            expenses::upsert_user_location(&pool, user, &location).await?;
            println!("✅ Location updated for user {}", user);
        }
    }

    Ok(())
}
