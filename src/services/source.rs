use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;

/// One upstream row, keyed by the header names of the endpoint that produced it.
/// Field names differ between endpoints; `payload` owns the aliasing.
pub type RawRecord = Map<String, Value>;

/// How the fetch layer should treat a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No data will ever come back for this request. Not retried.
    Permanent,
    /// Request timed out; retried with the long backoff.
    Timeout,
    /// Anything else worth another attempt.
    Transient,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request or response: {0}")]
    Invalid(String),

    #[error("rejected by upstream (HTTP {0})")]
    Rejected(u16),

    #[error("request timed out")]
    Timeout,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("connection error: {0}")]
    Connection(String),
}

impl SourceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::NotFound(_) | SourceError::Invalid(_) | SourceError::Rejected(_) => {
                FailureKind::Permanent
            }
            SourceError::Timeout => FailureKind::Timeout,
            SourceError::Status(_) | SourceError::Connection(_) => FailureKind::Transient,
        }
    }

    /// Map an HTTP status to an error. 400/404/410/422 mean the resource does
    /// not exist or the request can never succeed; 401/403 are refusals;
    /// everything else (429, 5xx, ...) is transient.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            404 | 410 => SourceError::NotFound(context.to_string()),
            400 | 422 => SourceError::Invalid(format!("{} (HTTP {})", context, status)),
            401 | 403 => SourceError::Rejected(status),
            _ => SourceError::Status(status),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if let Some(status) = e.status() {
            SourceError::from_status(status.as_u16(), "request")
        } else if e.is_decode() {
            SourceError::Invalid(e.to_string())
        } else {
            SourceError::Connection(e.to_string())
        }
    }
}

/// The upstream statistics API as seen by the ingestion core.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn get_teams(&self) -> Result<Vec<RawRecord>, SourceError>;

    /// Players on one team's roster for a season. `team_id` is the upstream id.
    async fn get_roster(&self, team_id: &str, season: &str) -> Result<Vec<RawRecord>, SourceError>;

    /// League-wide player list, used when the per-team sweep comes back thin.
    async fn get_all_players(&self, season: &str) -> Result<Vec<RawRecord>, SourceError>;

    /// Per-team line-score rows for every game played on `date`.
    async fn get_schedule_for_date(&self, date: NaiveDate) -> Result<Vec<RawRecord>, SourceError>;

    /// Per-player stat rows for one game.
    async fn get_box_score(&self, game_id: &str) -> Result<Vec<RawRecord>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(SourceError::from_status(404, "x").kind(), FailureKind::Permanent);
        assert_eq!(SourceError::from_status(400, "x").kind(), FailureKind::Permanent);
        assert_eq!(SourceError::from_status(403, "x").kind(), FailureKind::Permanent);
        assert_eq!(SourceError::from_status(429, "x").kind(), FailureKind::Transient);
        assert_eq!(SourceError::from_status(503, "x").kind(), FailureKind::Transient);
        assert_eq!(SourceError::Timeout.kind(), FailureKind::Timeout);
    }
}
