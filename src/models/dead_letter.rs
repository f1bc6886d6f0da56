use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::notification::Notification;

/// Record of a notification dropped after exhausting its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub notification: Notification,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}
