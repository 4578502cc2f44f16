//! Retry classification and backoff.
//!
//! Classification works on the rendered error text so that transient failures
//! surfaced by any provider (or by the transport under it) are recognised the
//! same way.

use crate::config::PipelineConfig;
use crate::error::{GenerationError, ProviderError};
use std::time::Duration;

/// Lowercase fragments that mark an error as transient.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection reset",
    "connection refused",
    "temporarily unavailable",
    "rate limit",
    "too many requests",
    "429",
    "502",
    "503",
    "504",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "network",
    "socket",
    "eof",
    "broken pipe",
];

const RATE_LIMIT_SIGNATURES: &[&str] = &["rate limit", "429"];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Minimum wait after a rate-limit-class error.
    pub rate_limit_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_delay(),
            multiplier: config.backoff_multiplier,
            rate_limit_delay: config.rate_limit_delay(),
        }
    }

    pub fn is_retryable(&self, error: &GenerationError) -> bool {
        match error {
            GenerationError::Cancelled => false,
            GenerationError::Timeout(_) => true,
            GenerationError::WriteFailed { .. } => false,
            GenerationError::Provider(ProviderError::RateLimit(_)) => true,
            GenerationError::Provider(ProviderError::AuthFailed(_)) => false,
            GenerationError::RetriesExhausted { .. } => false,
            other => matches_any(&other.to_string(), TRANSIENT_SIGNATURES),
        }
    }

    pub fn is_rate_limited(&self, error: &GenerationError) -> bool {
        matches!(error, GenerationError::Provider(ProviderError::RateLimit(_)))
            || matches_any(&error.to_string(), RATE_LIMIT_SIGNATURES)
    }

    /// Delay before the attempt following failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32, error: &GenerationError) -> Duration {
        let factor = f64::from(attempt.max(1)) * self.multiplier.max(0.0);
        let computed = scaled(self.base_delay, factor);
        if self.is_rate_limited(error) && self.rate_limit_delay > computed {
            return self.rate_limit_delay;
        }
        computed
    }

    /// `Some(delay)` if another attempt should follow `attempt`, `None` if the item is done.
    pub fn next_delay(&self, attempt: u32, error: &GenerationError) -> Option<Duration> {
        if attempt >= self.max_attempts || !self.is_retryable(error) {
            return None;
        }
        Some(self.delay_for(attempt, error))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// `base × factor`, saturating at `Duration::MAX` instead of panicking on overflow.
fn scaled(base: Duration, factor: f64) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

fn matches_any(message: &str, signatures: &[&str]) -> bool {
    let message = message.to_lowercase();
    signatures.iter().any(|signature| message.contains(signature))
}
