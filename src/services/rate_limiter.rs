//! Token bucket rate limiter
//!
//! Bounds request throughput to `refill_rate` tokens per `refill_interval_ms`
//! with a burst allowance of `capacity`. Refill is lazy: every access credits
//! the whole intervals elapsed since the last refill and advances the refill
//! clock by exactly those intervals, so partial progress toward the next
//! interval is kept.

use crate::utils::error::RateLimiterError;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfig {
    /// Maximum tokens held (burst size)
    pub capacity: u32,
    /// Tokens added per interval
    pub refill_rate: f64,
    pub refill_interval_ms: u64,
    /// Longest `acquire` may wait before failing
    pub max_wait_time_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterPreset::Default.config()
    }
}

impl RateLimiterConfig {
    /// Validate configuration validity
    pub fn validate(&self) -> Result<(), RateLimiterError> {
        if self.capacity == 0 {
            return Err(RateLimiterError::InvalidConfig("capacity must be positive".to_string()));
        }
        check_refill_rate(self.refill_rate)?;
        if self.refill_interval_ms == 0 {
            return Err(RateLimiterError::InvalidConfig("refillIntervalMs must be positive".to_string()));
        }
        if self.max_wait_time_ms == 0 {
            return Err(RateLimiterError::InvalidConfig("maxWaitTimeMs must be positive".to_string()));
        }
        Ok(())
    }
}

fn check_refill_rate(rate: f64) -> Result<(), RateLimiterError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(RateLimiterError::InvalidConfig("refillRate must be a positive number".to_string()))
    }
}

/// Named configuration profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimiterPreset {
    /// One request per second, bursts of 60
    #[default]
    Default,
    /// Ten requests per minute, for shared or free-tier keys
    Conservative,
    /// Generous limits for local development
    Development,
}

impl RateLimiterPreset {
    pub fn config(&self) -> RateLimiterConfig {
        match self {
            RateLimiterPreset::Default => RateLimiterConfig {
                capacity: 60,
                refill_rate: 1.0,
                refill_interval_ms: 1000,
                max_wait_time_ms: 30_000,
            },
            RateLimiterPreset::Conservative => RateLimiterConfig {
                capacity: 10,
                refill_rate: 1.0,
                refill_interval_ms: 6000,
                max_wait_time_ms: 60_000,
            },
            RateLimiterPreset::Development => RateLimiterConfig {
                capacity: 100,
                refill_rate: 10.0,
                refill_interval_ms: 1000,
                max_wait_time_ms: 10_000,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimiterPreset::Default => "default",
            RateLimiterPreset::Conservative => "conservative",
            RateLimiterPreset::Development => "development",
        }
    }
}

impl std::str::FromStr for RateLimiterPreset {
    type Err = RateLimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(RateLimiterPreset::Default),
            "conservative" => Ok(RateLimiterPreset::Conservative),
            "development" | "dev" => Ok(RateLimiterPreset::Development),
            other => Err(RateLimiterError::InvalidConfig(format!("unknown rate limit preset: {}", other))),
        }
    }
}

/// Partial configuration update; `None` fields are left unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfigUpdate {
    pub capacity: Option<u32>,
    pub refill_rate: Option<f64>,
    pub refill_interval_ms: Option<u64>,
    pub max_wait_time_ms: Option<u64>,
}

impl RateLimiterConfigUpdate {
    /// Changed property names and their new values, for logging
    pub fn changes(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut changes = Vec::new();
        if let Some(v) = self.capacity {
            changes.push(("capacity", v.into()));
        }
        if let Some(v) = self.refill_rate {
            changes.push(("refillRate", v.into()));
        }
        if let Some(v) = self.refill_interval_ms {
            changes.push(("refillIntervalMs", v.into()));
        }
        if let Some(v) = self.max_wait_time_ms {
            changes.push(("maxWaitTimeMs", v.into()));
        }
        changes
    }
}

/// Point-in-time view of the limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub available_tokens: f64,
    pub capacity: u32,
    pub time_until_next_token_ms: u64,
    pub config: RateLimiterConfig,
}

struct BucketState {
    config: RateLimiterConfig,
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.config.refill_interval_ms)
    }

    fn refill(&mut self, now: Instant) {
        let interval_ms = u128::from(self.config.refill_interval_ms);
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_millis();
        let whole_intervals = elapsed_ms / interval_ms;
        if whole_intervals == 0 {
            return;
        }

        let capacity = f64::from(self.config.capacity);
        self.tokens = (self.tokens + whole_intervals as f64 * self.config.refill_rate).min(capacity);
        // u64 milliseconds cover any realistic uptime
        let advance_ms = u64::try_from(whole_intervals * interval_ms).unwrap_or(u64::MAX);
        self.last_refill += Duration::from_millis(advance_ms);

        trace!(tokens = self.tokens, intervals = whole_intervals as u64, "Token bucket refilled");
    }

    /// Time until the next interval boundary; assumes `refill` ran at `now`
    fn until_next_interval(&self, now: Instant) -> Duration {
        self.interval()
            .saturating_sub(now.saturating_duration_since(self.last_refill))
    }

    /// Time until one more whole token is held; assumes `refill` ran at `now`
    fn time_until_next_token(&self, now: Instant) -> Duration {
        let capacity = f64::from(self.config.capacity);
        if self.tokens >= capacity {
            return Duration::ZERO;
        }
        let target = (self.tokens.floor() + 1.0).min(capacity);
        self.time_until_available(target, now)
    }

    /// Time until `n` tokens are held; assumes `refill` ran at `now`
    fn time_until_available(&self, n: f64, now: Instant) -> Duration {
        let needed = n - self.tokens;
        if needed <= 0.0 {
            return Duration::ZERO;
        }
        let intervals = (needed / self.config.refill_rate).ceil() as u32;
        self.until_next_interval(now) + self.interval() * intervals.saturating_sub(1)
    }
}

/// Token bucket shared by every call of one client
pub struct RateLimiter {
    state: Mutex<BucketState>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RateLimiter")
            .field("config", &state.config)
            .field("tokens", &state.tokens)
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_config_unchecked(RateLimiterConfig::default())
    }
}

impl RateLimiter {
    /// Create a full bucket
    pub fn new(config: RateLimiterConfig) -> Result<Self, RateLimiterError> {
        config.validate()?;
        Ok(Self::with_config_unchecked(config))
    }

    pub fn from_preset(preset: RateLimiterPreset) -> Self {
        Self::with_config_unchecked(preset.config())
    }

    fn with_config_unchecked(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                config,
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // Every mutation leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for `n` tokens and consume them
    ///
    /// Returns how long the caller was suspended. Fails immediately when `n`
    /// exceeds capacity, or as soon as the total wait would pass `max_wait_time_ms`.
    pub async fn acquire(&self, n: u32) -> Result<Duration, RateLimiterError> {
        let started = Instant::now();

        loop {
            let wait = {
                let mut state = self.lock();
                if n > state.config.capacity {
                    return Err(RateLimiterError::ExceedsCapacity {
                        requested: n,
                        capacity: state.config.capacity,
                    });
                }

                let now = Instant::now();
                state.refill(now);

                let requested = f64::from(n);
                if state.tokens >= requested {
                    state.tokens -= requested;
                    debug!(acquired = n, remaining = state.tokens, "Token bucket: acquired tokens");
                    return Ok(now.saturating_duration_since(started));
                }

                let wait = state.time_until_available(requested, now);
                let total = now.saturating_duration_since(started) + wait;
                let max_wait = Duration::from_millis(state.config.max_wait_time_ms);
                if total > max_wait {
                    return Err(RateLimiterError::WaitTimeExceeded {
                        wait_ms: total.as_millis() as u64,
                        max_wait_ms: state.config.max_wait_time_ms,
                    });
                }
                wait
            };

            debug!(wait_ms = wait.as_millis() as u64, requested = n, "Token bucket: waiting for tokens");
            tokio::time::sleep(wait).await;
        }
    }

    /// Whether `n` tokens are available right now; consumes nothing
    pub fn can_acquire(&self, n: u32) -> bool {
        let mut state = self.lock();
        state.refill(Instant::now());
        state.tokens >= f64::from(n)
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock();
        state.refill(Instant::now());
        state.tokens
    }

    /// Time until at least one more token is credited; zero when full
    pub fn time_until_next_token(&self) -> Duration {
        let mut state = self.lock();
        let now = Instant::now();
        state.refill(now);
        state.time_until_next_token(now)
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.lock().config
    }

    pub fn status(&self) -> RateLimitStatus {
        let mut state = self.lock();
        let now = Instant::now();
        state.refill(now);
        RateLimitStatus {
            available_tokens: state.tokens,
            capacity: state.config.capacity,
            time_until_next_token_ms: state.time_until_next_token(now).as_millis() as u64,
            config: state.config,
        }
    }

    /// Apply a partial update; tokens clamp down to a smaller capacity
    pub fn update_config(&self, update: RateLimiterConfigUpdate) -> Result<RateLimiterConfig, RateLimiterError> {
        let mut state = self.lock();

        let mut next = state.config;
        if let Some(capacity) = update.capacity {
            next.capacity = capacity;
        }
        if let Some(rate) = update.refill_rate {
            next.refill_rate = rate;
        }
        if let Some(interval) = update.refill_interval_ms {
            next.refill_interval_ms = interval;
        }
        if let Some(max_wait) = update.max_wait_time_ms {
            next.max_wait_time_ms = max_wait;
        }
        next.validate()?;

        // Credit progress under the old schedule before switching
        state.refill(Instant::now());
        state.config = next;
        state.tokens = state.tokens.min(f64::from(next.capacity));
        debug!(?next, tokens = state.tokens, "Rate limiter config updated");
        Ok(next)
    }

    /// Refill to capacity and restart the refill clock
    pub fn reset(&self) {
        let mut state = self.lock();
        state.tokens = f64::from(state.config.capacity);
        state.last_refill = Instant::now();
        debug!(tokens = state.tokens, "Rate limiter reset");
    }
}
