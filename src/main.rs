mod cli;
mod config;
mod db;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::IngestOptions;
use crate::config::Config;
use crate::services::CsvKind;

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Ingest NBA teams, schedules and box scores into a local database")]
struct Cli {
    /// Database URL, overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more seasons from the stats API
    Ingest {
        /// Season label such as 2023-24; repeatable
        #[arg(short, long = "season")]
        seasons: Vec<String>,
        #[arg(long)]
        start_year: Option<i32>,
        #[arg(long)]
        end_year: Option<i32>,
        /// Skip seasons whose last run finished
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        skip_existing: bool,
        /// Seconds to wait between seasons
        #[arg(long, default_value = "5")]
        season_delay: u64,
        /// Also print the per-season reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import teams, players, games or box scores from a CSV file
    ImportCsv {
        #[arg(value_enum)]
        kind: CsvKind,
        path: PathBuf,
    },
    /// Show row counts per table and per season
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Initialize the database
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Ingest {
            seasons,
            start_year,
            end_year,
            skip_existing,
            season_delay,
            json,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current step");
                    on_signal.cancel();
                }
            });

            let options = IngestOptions {
                seasons,
                start_year,
                end_year,
                skip_existing,
                season_delay: Duration::from_secs(season_delay),
                json,
            };
            cli::ingest_seasons(&config, options, cancel).await?;
        }
        Commands::ImportCsv { kind, path } => {
            cli::import_file(&config, kind, &path).await?;
        }
        Commands::Stats { json } => {
            cli::show_stats(&config, json).await?;
        }
        Commands::InitDb => {
            tracing::info!("Initializing database...");
            db::init_database(&config.database_url).await?;
        }
    }

    Ok(())
}
