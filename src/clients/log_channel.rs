use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::info;

use crate::{clients::channel::DeliveryChannel, models::notification::Notification};

/// Delivers by writing a log record. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), Error> {
        info!(
            id = %notification.id,
            notification_type = %notification.notification_type,
            priority = %notification.priority,
            user_id = notification.user_id.as_deref().unwrap_or("-"),
            title = %notification.title,
            "Notification delivered"
        );

        Ok(())
    }
}
