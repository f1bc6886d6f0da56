use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::models::notification::Notification;

/// Something that can deliver a notification to its recipient.
///
/// The queue only cares whether delivery succeeded; any `Err` is treated as a
/// retryable failure.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<(), Error>;
}
