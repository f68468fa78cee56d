//! Adaptive request pacing for the upstream API.
//!
//! The upstream throttles without documenting how, so the pacing is driven by
//! what we observe: slow responses and runs of transient failures stretch the
//! delay between requests, and a long enough failure run opens the breaker,
//! which parks the whole pipeline for a fixed interval.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum spacing between two requests under normal conditions.
    pub base_delay: Duration,
    /// A successful request slower than this counts as "slow".
    pub slow_threshold: Duration,
    /// Consecutive failures that open the breaker.
    pub breaker_threshold: u32,
    /// How long an open breaker parks the pipeline.
    pub breaker_pause: Duration,
    pub severe_failure_threshold: u32, // 6..=9 failures
    pub severe_failure_multiplier: f64,
    pub failure_threshold: u32, // 3..=5 failures
    pub failure_multiplier: f64,
    pub heavy_slow_count: u32, // slow count strictly above this
    pub heavy_slow_multiplier: f64,
    pub light_slow_count: u32,
    pub light_slow_multiplier: f64,
    /// Past this many requests the delay creeps up linearly...
    pub volume_threshold: u64,
    /// ...by this much per request over the threshold...
    pub volume_step: f64,
    /// ...never beyond this multiplier.
    pub volume_ceiling: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(600),
            slow_threshold: Duration::from_secs(3),
            breaker_threshold: 10,
            breaker_pause: Duration::from_secs(30),
            severe_failure_threshold: 6,
            severe_failure_multiplier: 8.0,
            failure_threshold: 3,
            failure_multiplier: 4.0,
            heavy_slow_count: 5,
            heavy_slow_multiplier: 2.0,
            light_slow_count: 2,
            light_slow_multiplier: 1.5,
            volume_threshold: 100,
            volume_step: 0.002,
            volume_ceiling: 2.0,
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    requests: u64,
    slow_requests: u32,
    consecutive_failures: u32,
    breaker_open: bool,
    breaker_trips: u32,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            requests: 0,
            slow_requests: 0,
            consecutive_failures: 0,
            breaker_open: false,
            breaker_trips: 0,
            last_request: None,
        }
    }

    /// Wait until the next upstream request may go out. Never fails.
    pub async fn acquire(&mut self) {
        if self.breaker_open {
            self.breaker_trips += 1;
            tracing::warn!(
                consecutive_failures = self.consecutive_failures,
                pause_secs = self.config.breaker_pause.as_secs(),
                "Circuit breaker open, pausing ingestion"
            );
            tokio::time::sleep(self.config.breaker_pause).await;
            self.consecutive_failures = 0;
            self.breaker_open = false;
            tracing::info!("Circuit breaker closed, resuming");
        }

        let delay = self.current_delay();
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }

        self.last_request = Some(Instant::now());
        self.requests += 1;
    }

    /// Multiplier applied to the base delay. Tiers are checked from most to
    /// least severe; the first match wins.
    pub fn multiplier(&self) -> f64 {
        let c = &self.config;
        if self.consecutive_failures >= c.severe_failure_threshold {
            c.severe_failure_multiplier
        } else if self.consecutive_failures >= c.failure_threshold {
            c.failure_multiplier
        } else if self.slow_requests > c.heavy_slow_count {
            c.heavy_slow_multiplier
        } else if self.slow_requests > c.light_slow_count {
            c.light_slow_multiplier
        } else if self.requests > c.volume_threshold {
            let over = (self.requests - c.volume_threshold) as f64;
            (1.0 + over * c.volume_step).min(c.volume_ceiling)
        } else {
            1.0
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.config.base_delay.mul_f64(self.multiplier())
    }

    /// A request came back. Slow ones push the slow counter up; fast ones let
    /// it decay.
    pub fn record_success(&mut self, latency: Duration) {
        self.consecutive_failures = 0;
        if latency > self.config.slow_threshold {
            self.slow_requests += 1;
            tracing::debug!(latency_ms = latency.as_millis() as u64, slow = self.slow_requests, "Slow upstream response");
        } else {
            self.slow_requests = self.slow_requests.saturating_sub(1);
        }
    }

    /// Opens the breaker once the failure run reaches the threshold; the next
    /// `acquire` serves the pause and closes it.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.breaker_threshold {
            self.breaker_open = true;
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn slow_requests(&self) -> u32 {
        self.slow_requests
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn is_breaker_open(&self) -> bool {
        self.breaker_open
    }

    pub fn breaker_trips(&self) -> u32 {
        self.breaker_trips
    }
}
