/// Preset configurations for courier delivery
use crate::backoff::ExponentialBackoff;
use crate::retry::RetryConfig;
use std::time::Duration;

/// Whole-pass retries of the courier dispatch loop
///
/// - First retry after ~500ms, growing by 1.5x, randomized ±50%
/// - Single interval capped at 60s
/// - Gives up after 15 minutes of continuous failure
pub fn dispatch_backoff() -> ExponentialBackoff {
    ExponentialBackoff::default()
}

/// Transport-level retries against third-party HTTP providers (SMS gateways)
///
/// - Retry: 3 attempts, 1s → 30s backoff with jitter
/// - Only meant for transient failures (5xx, 429, network)
pub fn http_provider_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(30),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}
