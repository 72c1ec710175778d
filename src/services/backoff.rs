//! Backoff timing
//!
//! Exponential delay schedule and the sleep seam used between attempts

use async_trait::async_trait;
use std::time::Duration;

/// Sleeps between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// `base * 2^retry_index`, where index 0 is the first retry
pub fn backoff_delay(base: Duration, retry_index: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(retry_index))
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    let secs = value?.trim().parse::<f64>().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs.ceil() as u64)
    } else {
        None
    }
}
