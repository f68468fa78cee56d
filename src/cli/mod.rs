use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::{self, init_database};
use crate::models::{SeasonCounts, TableCounts};
use crate::services::{
    import_csv, CsvKind, IngestReport, Ingestor, NbaStatsClient, RateLimiter, ResilientFetcher,
};
use crate::utils::{current_season, parse_season, season_from_start_year};

pub struct IngestOptions {
    pub seasons: Vec<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub skip_existing: bool,
    pub season_delay: Duration,
    pub json: bool,
}

/// Game count of a season whose last run finished. An interrupted season has
/// games stored but no completion marker, and is picked up again.
pub async fn completed_season_games(pool: &SqlitePool, season: &str) -> Result<Option<i64>> {
    if !db::is_season_complete(pool, season).await? {
        return Ok(None);
    }
    Ok(Some(db::season_game_count(pool, season).await?))
}

/// Seasons named explicitly win; otherwise the start/end year range; otherwise
/// the season in progress on `today`.
pub fn resolve_seasons(
    seasons: &[String],
    start_year: Option<i32>,
    end_year: Option<i32>,
    today: NaiveDate,
) -> Result<Vec<String>> {
    if !seasons.is_empty() {
        for label in seasons {
            parse_season(label)?;
        }
        return Ok(seasons.to_vec());
    }

    match (start_year, end_year) {
        (None, None) => Ok(vec![current_season(today)]),
        (Some(start), end) => {
            let end = end.unwrap_or(start);
            if end < start {
                bail!("--end-year {} is before --start-year {}", end, start);
            }
            Ok((start..=end).map(season_from_start_year).collect())
        }
        (None, Some(_)) => bail!("--end-year requires --start-year"),
    }
}

pub async fn ingest_seasons(config: &Config, options: IngestOptions, cancel: CancellationToken) -> Result<()> {
    let seasons = resolve_seasons(
        &options.seasons,
        options.start_year,
        options.end_year,
        Local::now().date_naive(),
    )?;
    let pool = init_database(&config.database_url).await?;

    let client = NbaStatsClient::new(&config.stats_base_url, config.request_timeout)?;
    let fetcher = ResilientFetcher::new(
        client,
        RateLimiter::new(config.rate_limiter()),
        config.retry_policy(),
    );
    let mut ingestor = Ingestor::new(pool.clone(), fetcher, config.ingest(), cancel.clone());

    println!("🏀 Ingesting {} season(s): {}", seasons.len(), seasons.join(", "));

    let mut reports: Vec<IngestReport> = Vec::new();
    for (i, season) in seasons.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        if options.skip_existing {
            if let Some(games) = completed_season_games(&pool, season).await? {
                println!("⏭️  {} already ingested ({} games), skipping", season, games);
                continue;
            }
        }

        println!("\n📥 Season {} ({}/{})", season, i + 1, seasons.len());
        let report = ingestor.ingest_season(season).await?;
        print_report(&report);
        let cancelled = report.cancelled;
        reports.push(report);

        if cancelled {
            break;
        }

        if i + 1 < seasons.len() && !options.season_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(options.season_delay) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }

    let games: usize = reports.iter().map(|r| r.games_created).sum();
    let box_scores: usize = reports.iter().map(|r| r.box_scores_inserted).sum();

    if cancel.is_cancelled() {
        println!("\n🛑 Interrupted. Committed data is kept; re-run to resume.");
    } else {
        println!("\n✅ Ingestion complete!");
    }
    println!("   Seasons ingested: {}", reports.len());
    println!("   Games added: {}", games);
    println!("   Box scores added: {}", box_scores);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("   Teams created: {}", report.teams_created);
    println!("   Players created: {}", report.players_created);
    println!(
        "   Games: {} found, {} new",
        report.games_found, report.games_created
    );
    println!(
        "   Box scores: {} inserted over {} games ({} without data)",
        report.box_scores_inserted, report.games_processed, report.games_without_box_scores
    );
    println!("   Elapsed: {:.1}s", report.elapsed.as_secs_f64());
}

pub async fn import_file(config: &Config, kind: CsvKind, path: &Path) -> Result<()> {
    let pool = init_database(&config.database_url).await?;

    println!("📄 Importing {:?} from {}", kind, path.display());
    let summary = import_csv(&pool, kind, path, config.writer()).await?;

    println!(
        "✅ {} rows read, {} imported, {} skipped",
        summary.rows, summary.imported, summary.skipped
    );
    Ok(())
}

#[derive(Serialize)]
struct StatsSummary {
    totals: TableCounts,
    seasons: Vec<SeasonCounts>,
}

pub async fn show_stats(config: &Config, json: bool) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let counts = db::table_counts(&pool).await?;

    if json {
        let summary = StatsSummary {
            totals: counts,
            seasons: db::season_counts(&pool).await?,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("📊 Database: {}", config.database_url);
    println!("   Teams:      {}", counts.teams);
    println!("   Players:    {}", counts.players);
    println!("   Games:      {}", counts.games);
    println!("   Box scores: {}", counts.box_scores);

    let seasons = db::season_counts(&pool).await?;
    if seasons.is_empty() {
        println!("\n📭 No games stored yet. Try: courtside ingest --season 2023-24");
        return Ok(());
    }

    println!("\n📅 By season:");
    for s in seasons {
        println!("   {}  {:>5} games  {:>7} box scores", s.season, s.games, s.box_scores);
    }
    Ok(())
}
