use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{priority::Priority, retry::RetryConfig};

/// Construction parameters for a `PriorityQueueManager`.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub retry_interval: Duration,
    pub cleanup_interval: Duration,
    pub dedup_window: Duration,
    pub metrics_retention: Duration,
    pub dead_letter_capacity: usize,
    pub urgent_dispatch: bool,
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            batch_size: 10,
            batch_interval: Duration::from_millis(2000),
            retry_interval: Duration::from_millis(1000),
            cleanup_interval: Duration::from_secs(60),
            dedup_window: Duration::from_secs(60),
            metrics_retention: Duration::from_secs(300),
            dead_letter_capacity: 100,
            urgent_dispatch: true,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadyProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchOutcome {
    Skipped {
        reason: SkipReason,
    },
    Completed {
        selected: usize,
        sent: usize,
        failed: usize,
        expired: usize,
        duration_ms: u64,
    },
}

impl BatchOutcome {
    pub fn sent(&self) -> usize {
        match self {
            BatchOutcome::Completed { sent, .. } => *sent,
            BatchOutcome::Skipped { .. } => 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, BatchOutcome::Skipped { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub expired_queued: usize,
    pub expired_retries: usize,
    pub dedup_entries: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued_by_priority: [usize; Priority::LEVELS],
    pub total_queued: usize,
    pub retry_pending: usize,
    pub in_flight: usize,
    pub online: bool,
    pub processing: bool,
    pub enqueued: u64,
    pub duplicates_rejected: u64,
    pub sent: u64,
    pub failed_attempts: u64,
    pub retried: u64,
    pub dropped: u64,
    pub expired: u64,
    pub evicted: u64,
    pub batches: u64,
    pub avg_batch_duration_ms: Option<f64>,
    pub dead_letters: usize,
}
