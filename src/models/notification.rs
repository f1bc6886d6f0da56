use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::priority::{BusinessImpact, CustomerTier, Priority, PriorityHints};

/// Time-to-live below which a notification gets a priority boost.
pub const SHORT_TTL_MS: u64 = 5 * 60 * 1000;

/// Longest accepted time-to-live (30 days).
pub const MAX_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Upper bound for a per-request `max_retries` override.
pub const MAX_RETRIES_CAP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SecurityAlert,
    PaymentFailed,
    SystemOutage,
    DeliveryFailed,

    OrderCreated,
    OrderUpdated,
    OrderCancelled,
    DeliveryUpdate,
    CustomerComplaint,

    OrderDelivered,
    ReviewReceived,
    AccountUpdate,
    RestaurantUpdate,

    Promotion,
    AnalyticsReport,
    WeeklyReport,

    BulkAnnouncement,
    Newsletter,

    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn base_priority(self) -> Priority {
        use NotificationType::*;

        match self {
            SecurityAlert | PaymentFailed | SystemOutage | DeliveryFailed => Priority::new(4),
            OrderCreated | OrderUpdated | OrderCancelled | DeliveryUpdate | CustomerComplaint => {
                Priority::new(3)
            }
            OrderDelivered | ReviewReceived | AccountUpdate | RestaurantUpdate => Priority::new(2),
            Promotion | AnalyticsReport | WeeklyReport => Priority::new(1),
            BulkAnnouncement | Newsletter => Priority::new(0),
            Other => Priority::DEFAULT,
        }
    }

    pub fn default_ttl_ms(self) -> u64 {
        const MINUTE: u64 = 60 * 1000;

        match self.base_priority().value() {
            4 => 5 * MINUTE,
            3 => 30 * MINUTE,
            2 => 60 * MINUTE,
            1 => 24 * 60 * MINUTE,
            _ => 72 * 60 * MINUTE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use NotificationType::*;

        match self {
            SecurityAlert => "security_alert",
            PaymentFailed => "payment_failed",
            SystemOutage => "system_outage",
            DeliveryFailed => "delivery_failed",
            OrderCreated => "order_created",
            OrderUpdated => "order_updated",
            OrderCancelled => "order_cancelled",
            DeliveryUpdate => "delivery_update",
            CustomerComplaint => "customer_complaint",
            OrderDelivered => "order_delivered",
            ReviewReceived => "review_received",
            AccountUpdate => "account_update",
            RestaurantUpdate => "restaurant_update",
            Promotion => "promotion",
            AnalyticsReport => "analytics_report",
            WeeklyReport => "weekly_report",
            BulkAnnouncement => "bulk_announcement",
            Newsletter => "newsletter",
            Other => "other",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification as submitted by a caller, before queue metadata is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub deduplication_key: Option<String>,

    #[serde(default)]
    pub time_to_live_ms: Option<u64>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(flatten)]
    pub hints: PriorityHints,
}

impl NotificationRequest {
    pub fn new(notification_type: NotificationType) -> Self {
        Self {
            id: None,
            notification_type,
            user_id: None,
            title: String::new(),
            body: String::new(),
            data: HashMap::new(),
            deduplication_key: None,
            time_to_live_ms: None,
            max_retries: None,
            hints: PriorityHints::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_content(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.title = title.into();
        self.body = body.into();
        self
    }

    pub fn with_deduplication_key(mut self, key: impl Into<String>) -> Self {
        self.deduplication_key = Some(key.into());
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.time_to_live_ms = Some(ttl_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_hints(mut self, hints: PriorityHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn ttl_ms(&self) -> u64 {
        self.time_to_live_ms
            .unwrap_or_else(|| self.notification_type.default_ttl_ms())
    }

    /// Type base priority plus one step per applicable hint, clamped to the valid range.
    pub fn compute_priority(&self) -> Priority {
        let mut priority = self.notification_type.base_priority();

        if self.hints.is_vip {
            priority = priority.boosted();
        }
        if self.hints.is_owner {
            priority = priority.boosted();
        }
        if self.ttl_ms() < SHORT_TTL_MS {
            priority = priority.boosted();
        }
        if self.hints.customer_tier == CustomerTier::Vip {
            priority = priority.boosted();
        }
        if self.hints.business_impact == BusinessImpact::High {
            priority = priority.boosted();
        }

        priority
    }

    pub fn resolve_max_retries(&self, priority: Priority) -> u32 {
        self.max_retries
            .map(|n| n.min(MAX_RETRIES_CAP))
            .unwrap_or_else(|| priority.default_max_retries())
    }

    pub fn into_notification(self, priority: Priority, now: DateTime<Utc>) -> Notification {
        let ttl_ms = self.ttl_ms();
        let max_retries = self.resolve_max_retries(priority);

        Notification {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            notification_type: self.notification_type,
            priority,
            user_id: self.user_id,
            title: self.title,
            body: self.body,
            data: self.data,
            deduplication_key: self.deduplication_key,
            enqueued_at: now,
            processing_deadline: now + Duration::milliseconds(ttl_ms.min(MAX_TTL_MS) as i64),
            attempts: 0,
            max_retries,
        }
    }
}

/// A queued notification with its scheduling metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub priority: Priority,
    pub user_id: Option<String>,
    pub title: String,
    pub body: String,

    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    pub deduplication_key: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub processing_deadline: DateTime<Utc>,
    pub attempts: u32,
    pub max_retries: u32,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.processing_deadline <= now
    }

    pub fn retries_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }
}
