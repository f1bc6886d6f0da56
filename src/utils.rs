use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use crate::models::retry::RetryConfig;

const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Backoff before retry number `attempts`, without jitter.
pub fn backoff_base_delay(config: &RetryConfig, attempts: u32) -> Duration {
    let factor = config
        .backoff_multiplier
        .saturating_pow(attempts.min(MAX_BACKOFF_EXPONENT));

    Duration::from_millis(config.base_delay_ms.saturating_mul(factor))
}

/// `base_delay * multiplier^attempts` plus a random offset in `0..=jitter_ms`.
pub fn backoff_delay(config: &RetryConfig, attempts: u32) -> Duration {
    let jitter = if config.jitter_ms == 0 {
        0
    } else {
        rand::random_range(0..=config.jitter_ms)
    };

    backoff_base_delay(config, attempts) + Duration::from_millis(jitter)
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .init();
}
