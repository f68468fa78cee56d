use anyhow::Result;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::services::fetcher::ResilientFetcher;
use crate::services::payload::{GamePayload, TeamLineScore};
use crate::services::source::{RawRecord, StatsSource};
use crate::utils::season_bounds;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Consecutive game-less days after which the season is considered over.
    pub empty_day_streak: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { empty_day_streak: 7 }
    }
}

/// Outcome of one calendar walk.
#[derive(Debug, Clone, Default)]
pub struct SeasonSchedule {
    pub games: Vec<GamePayload>,
    pub days_scanned: u32,
    pub stopped_early: bool,
    pub cancelled: bool,
}

pub struct ScheduleDiscoverer {
    config: ScheduleConfig,
}

impl ScheduleDiscoverer {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    /// Walk the season's calendar one day at a time, from October 1 to June 30,
    /// collecting every game found. Days that fail upstream count as empty.
    /// Games come back in discovery order, which is ascending by date.
    pub async fn discover_season_games<S: StatsSource>(
        &self,
        fetcher: &mut ResilientFetcher<S>,
        season: &str,
        cancel: &CancellationToken,
    ) -> Result<SeasonSchedule> {
        let (start, end) = season_bounds(season)?;
        tracing::info!("Discovering {} schedule ({} to {})", season, start, end);

        let mut schedule = SeasonSchedule::default();
        let mut empty_streak = 0u32;

        for day in start.iter_days().take_while(|d| *d <= end) {
            if cancel.is_cancelled() {
                tracing::warn!(%day, "Schedule discovery cancelled");
                schedule.cancelled = true;
                break;
            }

            let rows = fetcher.fetch_schedule(day).await;
            schedule.days_scanned += 1;

            let games = pair_line_scores(day, &rows);
            if games.is_empty() {
                empty_streak += 1;
                if empty_streak >= self.config.empty_day_streak {
                    tracing::info!(
                        %day,
                        empty_days = empty_streak,
                        "No games for {} straight days, ending discovery",
                        empty_streak
                    );
                    schedule.stopped_early = day < end;
                    break;
                }
                continue;
            }

            empty_streak = 0;
            tracing::debug!(%day, games = games.len(), "Schedule day");
            schedule.games.extend(games);
        }

        if schedule.games.is_empty() && !schedule.cancelled {
            tracing::warn!(
                season,
                days_scanned = schedule.days_scanned,
                "No games found; a season starting more than {} days after {} is missed",
                self.config.empty_day_streak,
                start
            );
        }

        tracing::info!(
            season,
            games = schedule.games.len(),
            days_scanned = schedule.days_scanned,
            "Schedule discovery finished"
        );
        Ok(schedule)
    }
}

/// Join a day's per-team line scores into one game per game id. The home side
/// comes from the row's home flag when present; otherwise the first row of a
/// game is the visitor, which is the order the scoreboard lists them in.
pub fn pair_line_scores(day: NaiveDate, rows: &[RawRecord]) -> Vec<GamePayload> {
    let mut grouped: Vec<(String, Vec<TeamLineScore>)> = Vec::new();

    for line in rows.iter().filter_map(TeamLineScore::from_raw) {
        match grouped.iter_mut().find(|(id, _)| *id == line.game_id) {
            Some((_, lines)) => lines.push(line),
            None => grouped.push((line.game_id.clone(), vec![line])),
        }
    }

    grouped
        .into_iter()
        .filter_map(|(game_id, lines)| {
            let [first, second] = <[TeamLineScore; 2]>::try_from(lines).ok()?;
            let (home, away) = match (first.is_home, second.is_home) {
                (Some(true), _) | (_, Some(false)) => (first, second),
                _ => (second, first),
            };
            if home.team_abbreviation == away.team_abbreviation {
                return None;
            }

            Some(GamePayload {
                upstream_id: Some(game_id),
                game_date: home.game_date.or(away.game_date).unwrap_or(day),
                home_abbreviation: home.team_abbreviation,
                away_abbreviation: away.team_abbreviation,
                home_score: home.points,
                away_score: away.points,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fetcher::RetryPolicy;
    use crate::services::rate_limiter::{RateLimiter, RateLimiterConfig};
    use crate::services::test_support::{line_score, record, ScriptedSource};
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn fetcher(source: ScriptedSource) -> ResilientFetcher<ScriptedSource> {
        let limiter = RateLimiter::new(RateLimiterConfig {
            base_delay: std::time::Duration::ZERO,
            ..RateLimiterConfig::default()
        });
        ResilientFetcher::new(source, limiter, RetryPolicy::default())
    }

    #[test]
    fn test_pairing_uses_home_flag() {
        let rows = vec![
            line_score("0022300001", "LAL", 110, true),
            line_score("0022300001", "BOS", 101, false),
        ];
        let games = pair_line_scores(d(2024, 1, 15), &rows);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].home_abbreviation, "LAL");
        assert_eq!(games[0].away_abbreviation, "BOS");
        assert_eq!(games[0].home_score, Some(110));
        assert_eq!(games[0].game_date, d(2024, 1, 15));
    }

    #[test]
    fn test_pairing_without_flag_lists_visitor_first() {
        let rows = vec![
            record(json!({"GAME_ID": "0022300002", "TEAM_ABBREVIATION": "MIA", "PTS": 99})),
            record(json!({"GAME_ID": "0022300002", "TEAM_ABBREVIATION": "NYK", "PTS": 104})),
            record(json!({"GAME_ID": "0022300003", "TEAM_ABBREVIATION": "DEN"})),
        ];
        let games = pair_line_scores(d(2024, 1, 15), &rows);
        assert_eq!(games.len(), 1, "a game with one side is dropped");
        assert_eq!(games[0].home_abbreviation, "NYK");
        assert_eq!(games[0].away_abbreviation, "MIA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_stops_after_empty_streak() {
        let source = ScriptedSource::new();
        source.set_schedule(
            d(2023, 10, 3),
            vec![
                line_score("0012300001", "LAL", 100, true),
                line_score("0012300001", "GSW", 90, false),
            ],
        );
        source.set_schedule(
            d(2023, 10, 5),
            vec![
                line_score("0012300002", "BOS", 100, true),
                line_score("0012300002", "NYK", 95, false),
            ],
        );

        let mut f = fetcher(source);
        let schedule = ScheduleDiscoverer::new(ScheduleConfig::default())
            .discover_season_games(&mut f, "2023-24", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(schedule.games.len(), 2);
        assert_eq!(schedule.games[0].game_date, d(2023, 10, 3));
        assert_eq!(schedule.games[1].game_date, d(2023, 10, 5));
        assert!(schedule.stopped_early);
        // Oct 1..=5, then Oct 6..=12 empty
        assert_eq!(schedule.days_scanned, 12);
        assert_eq!(f.source().schedule_calls(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_days_count_as_empty() {
        let source = ScriptedSource::new();
        source.set_schedule(
            d(2023, 10, 1),
            vec![
                line_score("0012300001", "LAL", 100, true),
                line_score("0012300001", "GSW", 90, false),
            ],
        );
        for day in 2..=8 {
            source.fail_schedule(d(2023, 10, day));
        }

        let mut f = fetcher(source);
        let schedule = ScheduleDiscoverer::new(ScheduleConfig::default())
            .discover_season_games(&mut f, "2023-24", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(schedule.games.len(), 1);
        assert_eq!(schedule.days_scanned, 8);
        assert!(schedule.stopped_early);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_day() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut f = fetcher(ScriptedSource::new());
        let schedule = ScheduleDiscoverer::new(ScheduleConfig::default())
            .discover_season_games(&mut f, "2023-24", &cancel)
            .await
            .unwrap();

        assert!(schedule.cancelled);
        assert_eq!(schedule.days_scanned, 0);
    }

    #[tokio::test]
    async fn test_bad_season_label_is_an_error() {
        let mut f = fetcher(ScriptedSource::new());
        let result = ScheduleDiscoverer::new(ScheduleConfig::default())
            .discover_season_games(&mut f, "2023-25", &CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
