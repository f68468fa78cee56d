use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::services::payload::minutes_played;
use crate::services::rate_limiter::RateLimiter;
use crate::services::source::{FailureKind, RawRecord, SourceError, StatsSource};
use crate::utils::is_valid_game_id;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, first one included.
    pub max_attempts: u32,
    /// Backoff base after a timeout; doubles per attempt.
    pub timeout_backoff: Duration,
    /// Backoff base after any other transient failure; doubles per attempt.
    pub generic_backoff: Duration,
    /// Failure run length that earns an extra cooldown once retries are spent.
    pub cooldown_threshold: u32,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_backoff: Duration::from_secs(5),
            generic_backoff: Duration::from_secs(2),
            cooldown_threshold: 5,
            cooldown: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn backoff(&self, kind: FailureKind, attempt: u32) -> Duration {
        let base = match kind {
            FailureKind::Timeout => self.timeout_backoff,
            _ => self.generic_backoff,
        };
        base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// One upstream call.
#[derive(Debug, Clone)]
pub enum Request {
    Teams,
    Roster { team_id: String, season: String },
    AllPlayers { season: String },
    Schedule(NaiveDate),
    BoxScore(String),
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Teams => write!(f, "teams"),
            Request::Roster { team_id, season } => write!(f, "roster {} {}", team_id, season),
            Request::AllPlayers { season } => write!(f, "all players {}", season),
            Request::Schedule(date) => write!(f, "schedule {}", date),
            Request::BoxScore(game_id) => write!(f, "box score {}", game_id),
        }
    }
}

async fn dispatch<S: StatsSource>(source: &S, request: &Request) -> Result<Vec<RawRecord>, SourceError> {
    match request {
        Request::Teams => source.get_teams().await,
        Request::Roster { team_id, season } => source.get_roster(team_id, season).await,
        Request::AllPlayers { season } => source.get_all_players(season).await,
        Request::Schedule(date) => source.get_schedule_for_date(*date).await,
        Request::BoxScore(game_id) => source.get_box_score(game_id).await,
    }
}

/// Wraps every upstream call in rate limiting, retry with backoff and error
/// classification. Failures never escape: a request that cannot be served
/// yields an empty list, which callers treat as "no data".
pub struct ResilientFetcher<S> {
    source: S,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl<S: StatsSource> ResilientFetcher<S> {
    pub fn new(source: S, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self { source, limiter, retry }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch_teams(&mut self) -> Vec<RawRecord> {
        self.fetch(Request::Teams).await
    }

    pub async fn fetch_roster(&mut self, team_id: &str, season: &str) -> Vec<RawRecord> {
        self.fetch(Request::Roster {
            team_id: team_id.to_string(),
            season: season.to_string(),
        })
        .await
    }

    pub async fn fetch_all_players(&mut self, season: &str) -> Vec<RawRecord> {
        self.fetch(Request::AllPlayers { season: season.to_string() }).await
    }

    pub async fn fetch_schedule(&mut self, date: NaiveDate) -> Vec<RawRecord> {
        self.fetch(Request::Schedule(date)).await
    }

    /// Stat rows of players who actually played. Malformed game ids are
    /// refused without touching the network.
    pub async fn fetch_box_score(&mut self, game_id: &str) -> Vec<RawRecord> {
        if !is_valid_game_id(game_id) {
            tracing::warn!(game_id, "Malformed game id, skipping box score");
            return Vec::new();
        }

        let rows = self.fetch(Request::BoxScore(game_id.to_string())).await;
        let total = rows.len();
        let played: Vec<RawRecord> = rows
            .into_iter()
            .filter(|row| minutes_played(row).is_some())
            .collect();

        if played.len() < total {
            tracing::debug!(game_id, dropped = total - played.len(), "Dropped rows without minutes");
        }
        played
    }

    pub async fn fetch(&mut self, request: Request) -> Vec<RawRecord> {
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            self.limiter.acquire().await;
            let started = Instant::now();

            match dispatch(&self.source, &request).await {
                Ok(rows) => {
                    self.limiter.record_success(started.elapsed());
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "{} succeeded after retry", request);
                    }
                    return rows;
                }
                Err(e) if e.kind() == FailureKind::Permanent => {
                    tracing::debug!(error = %e, "{}: no data", request);
                    return Vec::new();
                }
                Err(e) => {
                    self.limiter.record_failure();
                    let is_last = attempt + 1 == attempts;

                    if is_last {
                        tracing::warn!(
                            error = %e,
                            attempts,
                            consecutive_failures = self.limiter.consecutive_failures(),
                            breaker_open = self.limiter.is_breaker_open(),
                            "{} failed after all retry attempts",
                            request
                        );
                    } else {
                        let delay = self.retry.backoff(e.kind(), attempt);
                        tracing::warn!(
                            error = %e,
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "{} failed, retrying",
                            request
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if self.limiter.consecutive_failures() >= self.retry.cooldown_threshold {
            tracing::warn!(
                cooldown_secs = self.retry.cooldown.as_secs(),
                "Upstream failing repeatedly, cooling down"
            );
            tokio::time::sleep(self.retry.cooldown).await;
        }

        Vec::new()
    }
}
