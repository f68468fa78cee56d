use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::db;
use crate::models::NewBoxScore;
use crate::services::batch_writer::{BatchWriter, WriterConfig};
use crate::services::fetcher::ResilientFetcher;
use crate::services::payload::{PlayerPayload, StatRow, TeamPayload};
use crate::services::resolver::EntityResolver;
use crate::services::schedule::{ScheduleConfig, ScheduleDiscoverer};
use crate::services::source::StatsSource;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Games between two progress reports.
    pub progress_every: usize,
    /// A roster sweep yielding fewer players than this falls back to the
    /// league-wide player list.
    pub min_plausible_players: usize,
    pub schedule: ScheduleConfig,
    pub writer: WriterConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            progress_every: 25,
            min_plausible_players: 200,
            schedule: ScheduleConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// What one season run added to the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub season: String,
    pub teams_created: usize,
    pub players_created: usize,
    pub games_found: usize,
    pub games_created: usize,
    pub games_processed: usize,
    pub games_without_box_scores: usize,
    pub box_scores_inserted: usize,
    pub cancelled: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Drives one season through teams, players, schedule and box scores.
pub struct Ingestor<S> {
    pool: SqlitePool,
    fetcher: ResilientFetcher<S>,
    config: IngestConfig,
    cancel: CancellationToken,
}

impl<S: StatsSource> Ingestor<S> {
    pub fn new(
        pool: SqlitePool,
        fetcher: ResilientFetcher<S>,
        config: IngestConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            fetcher,
            config,
            cancel,
        }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &ResilientFetcher<S> {
        &self.fetcher
    }

    pub async fn ingest_season(&mut self, season: &str) -> Result<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport {
            season: season.to_string(),
            ..IngestReport::default()
        };
        let mut resolver = EntityResolver::load(&self.pool).await?;

        tracing::info!(phase = "teams", season, "Ingesting teams");
        self.ingest_teams(&mut resolver).await?;

        if !self.cancel.is_cancelled() {
            tracing::info!(phase = "players", season, "Ingesting players");
            self.ingest_players(&mut resolver, season).await?;
        }

        let games = if self.cancel.is_cancelled() {
            Vec::new()
        } else {
            tracing::info!(phase = "schedule", season, "Discovering games");
            self.ingest_games(&mut resolver, season, &mut report).await?
        };

        if !self.cancel.is_cancelled() {
            tracing::info!(phase = "box_scores", season, games = games.len(), "Ingesting box scores");
            self.ingest_box_scores(&mut resolver, &games, &mut report).await?;
        }

        let created = resolver.created();
        report.teams_created = created.teams;
        report.players_created = created.players;
        report.games_created = created.games;
        report.cancelled = self.cancel.is_cancelled();
        report.elapsed = started.elapsed();

        // An empty schedule is not marked, so a later run looks again.
        if !report.cancelled && report.games_found > 0 {
            db::mark_season_complete(
                &self.pool,
                season,
                report.games_processed as i64,
                report.box_scores_inserted as i64,
            )
            .await?;
        }

        tracing::info!(
            season,
            games = report.games_processed,
            box_scores_inserted = report.box_scores_inserted,
            cancelled = report.cancelled,
            breaker_trips = self.fetcher.limiter().breaker_trips(),
            "Season ingestion finished in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    async fn ingest_teams(&mut self, resolver: &mut EntityResolver) -> Result<()> {
        let records = self.fetcher.fetch_teams().await;
        for team in records.iter().filter_map(TeamPayload::from_raw) {
            resolver.resolve_team(&self.pool, &team).await?;
        }
        tracing::info!(teams = resolver.team_count(), "Teams resolved");
        Ok(())
    }

    async fn ingest_players(&mut self, resolver: &mut EntityResolver, season: &str) -> Result<()> {
        let mut seen: HashSet<String> = HashSet::new();

        for team_id in resolver.upstream_team_ids() {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let roster = self.fetcher.fetch_roster(&team_id, season).await;
            for record in &roster {
                let Some(mut player) = PlayerPayload::from_raw(record) else {
                    continue;
                };
                player.upstream_team_id.get_or_insert_with(|| team_id.clone());
                resolver.resolve_player(&self.pool, &player).await?;
                seen.insert(player.name);
            }
        }

        if seen.len() < self.config.min_plausible_players {
            tracing::warn!(
                found = seen.len(),
                expected_at_least = self.config.min_plausible_players,
                "Roster sweep came back thin, fetching league player list"
            );
            let records = self.fetcher.fetch_all_players(season).await;
            for player in records.iter().filter_map(PlayerPayload::from_raw) {
                resolver.resolve_player(&self.pool, &player).await?;
                seen.insert(player.name);
            }
        }

        tracing::info!(players = seen.len(), "Players resolved");
        Ok(())
    }

    /// Resolve every discovered game; returns (upstream id, internal id) pairs
    /// in discovery order.
    async fn ingest_games(
        &mut self,
        resolver: &mut EntityResolver,
        season: &str,
        report: &mut IngestReport,
    ) -> Result<Vec<(String, i64)>> {
        let discoverer = ScheduleDiscoverer::new(self.config.schedule.clone());
        let schedule = discoverer
            .discover_season_games(&mut self.fetcher, season, &self.cancel)
            .await?;
        report.games_found = schedule.games.len();

        let mut seen = HashSet::new();
        let mut games = Vec::with_capacity(schedule.games.len());
        for game in &schedule.games {
            let Some(upstream_id) = game.upstream_id.clone() else {
                continue;
            };
            if !seen.insert(upstream_id.clone()) {
                continue;
            }
            if let Some(id) = resolver.resolve_game(&self.pool, game).await? {
                games.push((upstream_id, id));
            }
        }

        tracing::info!(
            found = report.games_found,
            resolved = games.len(),
            created = resolver.created().games,
            "Games resolved"
        );
        Ok(games)
    }

    async fn ingest_box_scores(
        &mut self,
        resolver: &mut EntityResolver,
        games: &[(String, i64)],
        report: &mut IngestReport,
    ) -> Result<()> {
        let mut writer = BatchWriter::new(self.config.writer.clone());
        let total = games.len();

        for (upstream_id, game_id) in games {
            if self.cancel.is_cancelled() {
                tracing::warn!(processed = report.games_processed, total, "Box score ingestion cancelled");
                break;
            }

            let rows = self.fetcher.fetch_box_score(upstream_id).await;
            if rows.is_empty() {
                report.games_without_box_scores += 1;
            }

            let mut candidates = Vec::with_capacity(rows.len());
            for stat in rows.iter().filter_map(StatRow::from_raw) {
                let player = PlayerPayload {
                    upstream_id: stat.upstream_player_id.clone(),
                    name: stat.player_name.clone(),
                    team_abbreviation: stat.team_abbreviation.clone(),
                    upstream_team_id: None,
                    position: None,
                    height: None,
                    weight: None,
                    birth_date: None,
                };
                let Some(player_id) = resolver.resolve_player(&self.pool, &player).await? else {
                    continue;
                };
                candidates.push(NewBoxScore {
                    game_id: *game_id,
                    player_id,
                    minutes: stat.minutes,
                    stats: stat.stats,
                });
            }

            report.box_scores_inserted += writer.push(&self.pool, candidates).await?;
            report.box_scores_inserted += writer.note_game_processed(&self.pool).await?;
            report.games_processed += 1;

            if report.games_processed % self.config.progress_every.max(1) == 0 {
                let limiter = self.fetcher.limiter();
                tracing::info!(
                    phase = "box_scores",
                    games_processed = report.games_processed,
                    total,
                    box_scores_inserted = report.box_scores_inserted,
                    pending = writer.pending_len(),
                    requests = limiter.requests(),
                    slow_requests = limiter.slow_requests(),
                    breaker_open = limiter.is_breaker_open(),
                    delay_ms = limiter.current_delay().as_millis() as u64,
                    "Progress"
                );
            }
        }

        report.box_scores_inserted += writer.flush(&self.pool).await?;
        tracing::debug!(
            inserted = writer.total_inserted(),
            tracked_pairs = writer.tracked_pairs(),
            "Box score writer drained"
        );
        Ok(())
    }
}
