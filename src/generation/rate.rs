//! Shared request budget: a token bucket refilled at the sustained rate.

use crate::config::RateConfig;
use crate::error::GenerationError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Used when the configured requests-per-minute is zero.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// One budget per generator; every worker draws from it.
pub struct RateBudget {
    per_second: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateBudget {
    pub fn new(requests_per_minute: u32, burst: usize) -> Self {
        let requests_per_minute = effective_requests_per_minute(requests_per_minute);
        let burst = burst.max(1) as f64;
        Self {
            per_second: f64::from(requests_per_minute) / 60.0,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Burst equals max concurrency so a full pool can start without queuing.
    pub fn from_config(config: &RateConfig) -> Self {
        Self::new(config.requests_per_minute, config.max_concurrency)
    }

    pub fn per_second(&self) -> f64 {
        self.per_second
    }

    pub fn burst(&self) -> usize {
        self.burst as usize
    }

    /// Take one unit, or report how long until one is available.
    fn take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.burst);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_second))
    }

    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Wait for one unit. Returns `Cancelled` as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), GenerationError> {
        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            let wait = match self.take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            debug!(wait_ms = wait.as_millis() as u64, "Waiting for rate budget");
            tokio::select! {
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                _ = sleep(wait) => {}
            }
        }
    }
}

pub fn effective_requests_per_minute(requests_per_minute: u32) -> u32 {
    if requests_per_minute == 0 {
        DEFAULT_REQUESTS_PER_MINUTE
    } else {
        requests_per_minute
    }
}
