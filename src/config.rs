use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{
    circuit_breaker::CircuitBreakerConfig, queue::QueueConfig, retry::RetryConfig,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "defaults::max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    #[serde(default = "defaults::batch_interval_ms")]
    pub batch_interval_ms: u64,
    #[serde(default = "defaults::retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "defaults::cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    #[serde(default = "defaults::base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    #[serde(default = "defaults::retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,
    #[serde(default = "defaults::retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    #[serde(default = "defaults::dedup_window_seconds")]
    pub dedup_window_seconds: u64,
    #[serde(default = "defaults::metrics_retention_seconds")]
    pub metrics_retention_seconds: u64,
    #[serde(default = "defaults::dead_letter_capacity")]
    pub dead_letter_capacity: usize,
    #[serde(default = "defaults::urgent_dispatch_enabled")]
    pub urgent_dispatch_enabled: bool,

    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "defaults::webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    #[serde(default = "defaults::circuit_breaker_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "defaults::circuit_breaker_timeout_seconds")]
    pub circuit_breaker_timeout_seconds: u64,
    #[serde(default = "defaults::circuit_breaker_success_threshold")]
    pub circuit_breaker_success_threshold: u32,

    #[serde(default)]
    pub connectivity_probe_url: Option<String>,
    #[serde(default = "defaults::connectivity_probe_interval_ms")]
    pub connectivity_probe_interval_ms: u64,

    #[serde(default = "defaults::server_port")]
    pub server_port: u16,
}

mod defaults {
    pub fn max_queue_size() -> usize {
        1000
    }
    pub fn batch_size() -> usize {
        10
    }
    pub fn batch_interval_ms() -> u64 {
        2000
    }
    pub fn retry_interval_ms() -> u64 {
        1000
    }
    pub fn cleanup_interval_ms() -> u64 {
        60_000
    }
    pub fn base_retry_delay_ms() -> u64 {
        1000
    }
    pub fn retry_backoff_multiplier() -> u64 {
        2
    }
    pub fn retry_jitter_ms() -> u64 {
        250
    }
    pub fn dedup_window_seconds() -> u64 {
        60
    }
    pub fn metrics_retention_seconds() -> u64 {
        300
    }
    pub fn dead_letter_capacity() -> usize {
        100
    }
    pub fn urgent_dispatch_enabled() -> bool {
        true
    }
    pub fn webhook_timeout_ms() -> u64 {
        5000
    }
    pub fn circuit_breaker_failure_threshold() -> u32 {
        5
    }
    pub fn circuit_breaker_timeout_seconds() -> u64 {
        30
    }
    pub fn circuit_breaker_success_threshold() -> u32 {
        2
    }
    pub fn connectivity_probe_interval_ms() -> u64 {
        5000
    }
    pub fn server_port() -> u16 {
        8080
    }
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_queue_size == 0 {
            return Err(anyhow!("MAX_QUEUE_SIZE must be greater than zero"));
        }

        if self.batch_size == 0 {
            return Err(anyhow!("BATCH_SIZE must be greater than zero"));
        }

        if self.base_retry_delay_ms == 0 {
            return Err(anyhow!("BASE_RETRY_DELAY_MS must be greater than zero"));
        }

        if self.retry_backoff_multiplier < 2 {
            return Err(anyhow!("RETRY_BACKOFF_MULTIPLIER must be at least 2"));
        }

        if self.batch_interval_ms == 0 || self.retry_interval_ms == 0 || self.cleanup_interval_ms == 0
        {
            return Err(anyhow!("Timer intervals must be greater than zero"));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            base_delay_ms: self.base_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
            jitter_ms: self.retry_jitter_ms,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_queue_size: self.max_queue_size,
            batch_size: self.batch_size,
            batch_interval: Duration::from_millis(self.batch_interval_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
            dedup_window: Duration::from_secs(self.dedup_window_seconds),
            metrics_retention: Duration::from_secs(self.metrics_retention_seconds),
            dead_letter_capacity: self.dead_letter_capacity,
            urgent_dispatch: self.urgent_dispatch_enabled,
            retry: self.retry_config(),
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            timeout_seconds: self.circuit_breaker_timeout_seconds,
            success_threshold: self.circuit_breaker_success_threshold,
        }
    }
}
