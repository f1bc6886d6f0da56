use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    clients::{channel::DeliveryChannel, circuit_breaker::CircuitBreaker},
    config::Config,
    models::{circuit_breaker::CircuitState, notification::Notification},
};

/// Delivers notifications as JSON `POST`s to a fixed endpoint.
pub struct WebhookChannel {
    http_client: Client,
    url: String,
    circuit_breaker: CircuitBreaker,
}

impl WebhookChannel {
    pub fn new(url: String, timeout: Duration, circuit_breaker: CircuitBreaker) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build webhook HTTP client: {}", e))?;

        info!(url = %url, "Webhook channel initialized");

        Ok(Self {
            http_client,
            url,
            circuit_breaker,
        })
    }

    pub fn from_config(config: &Config) -> Result<Option<Self>, Error> {
        let Some(url) = config.webhook_url.clone() else {
            return Ok(None);
        };

        let circuit_breaker = CircuitBreaker::new("webhook", config.circuit_breaker_config());
        let channel = Self::new(
            url,
            Duration::from_millis(config.webhook_timeout_ms),
            circuit_breaker,
        )?;

        Ok(Some(channel))
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn post_once(&self, notification: &Notification) -> Result<(), Error> {
        let response = self
            .http_client
            .post(&self.url)
            .header("X-Notification-Id", notification.id.as_str())
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(id = %notification.id, status = status.as_u16(), "Webhook accepted notification");
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!("Webhook request failed with {}: {}", status, error_text))
        }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), Error> {
        self.circuit_breaker
            .call(|| self.post_once(notification))
            .await
    }
}
