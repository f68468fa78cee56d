use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::services::batch_writer::WriterConfig;
use crate::services::fetcher::RetryPolicy;
use crate::services::ingestor::IngestConfig;
use crate::services::rate_limiter::RateLimiterConfig;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/courtside.db";
pub const DEFAULT_STATS_BASE_URL: &str = "https://stats.nba.com/stats";

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub stats_base_url: String,
    pub request_timeout: Duration,
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            stats_base_url: DEFAULT_STATS_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            base_delay: Duration::from_millis(600),
            max_attempts: 3,
            batch_size: 200,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            stats_base_url: lookup("NBA_STATS_BASE_URL").unwrap_or(defaults.stats_base_url),
            request_timeout: Duration::from_secs(parsed(&lookup, "NBA_STATS_TIMEOUT_SECS", 15u64)),
            base_delay: Duration::from_millis(parsed(&lookup, "INGEST_BASE_DELAY_MS", 600u64)),
            max_attempts: parsed(&lookup, "INGEST_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            batch_size: parsed(&lookup, "INGEST_BATCH_SIZE", defaults.batch_size).max(1),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            base_delay: self.base_delay,
            ..RateLimiterConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
    }

    pub fn writer(&self) -> WriterConfig {
        WriterConfig {
            batch_size: self.batch_size,
            ..WriterConfig::default()
        }
    }

    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            writer: self.writer(),
            ..IngestConfig::default()
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring {}={:?}, using default {}", key, raw, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let c = config(&[]);
        assert_eq!(c.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(c.request_timeout, Duration::from_secs(15));
        assert_eq!(c.retry_policy().max_attempts, 3);
        assert_eq!(c.ingest().writer.batch_size, 200);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let c = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("INGEST_BASE_DELAY_MS", "250"),
            ("INGEST_MAX_ATTEMPTS", "five"),
            ("INGEST_BATCH_SIZE", "0"),
        ]);
        assert_eq!(c.database_url, "sqlite::memory:");
        assert_eq!(c.rate_limiter().base_delay, Duration::from_millis(250));
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.batch_size, 1);
    }
}
