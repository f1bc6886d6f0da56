use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::priority::Priority;

/// Where a notification currently lives inside the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Queued {
        priority: Priority,
        position: usize,
    },
    Retrying {
        priority: Priority,
        attempts: u32,
        eligible_at: DateTime<Utc>,
    },
    InFlight,
}

/// Final outcome of a single delivery attempt, used in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    Retrying,
    Dropped,
    Expired,
    Evicted,
}

impl Display for DeliveryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryOutcome::Sent => write!(f, "sent"),
            DeliveryOutcome::Failed => write!(f, "failed"),
            DeliveryOutcome::Retrying => write!(f, "retrying"),
            DeliveryOutcome::Dropped => write!(f, "dropped"),
            DeliveryOutcome::Expired => write!(f, "expired"),
            DeliveryOutcome::Evicted => write!(f, "evicted"),
        }
    }
}
