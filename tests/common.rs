use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use notification_queue::{
    clients::channel::DeliveryChannel,
    clock::ManualClock,
    models::{notification::Notification, queue::QueueConfig, retry::RetryConfig},
    queue::PriorityQueueManager,
};

/// Records every delivery attempt; fails on demand.
#[derive(Default)]
pub struct MockChannel {
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<String>>,
    fail_all: AtomicBool,
    failing_ids: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_id(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, notification: &Notification) -> Result<(), Error> {
        self.attempts.lock().unwrap().push(notification.id.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.fail_all.load(Ordering::SeqCst)
            || self.failing_ids.lock().unwrap().contains(&notification.id);

        if failing {
            return Err(anyhow!("Mock delivery failure for {}", notification.id));
        }

        self.delivered.lock().unwrap().push(notification.id.clone());
        Ok(())
    }
}

/// Deterministic defaults: no urgent side channel and no jitter.
pub fn test_config() -> QueueConfig {
    QueueConfig {
        urgent_dispatch: false,
        retry: RetryConfig {
            base_delay_ms: 1000,
            backoff_multiplier: 2,
            jitter_ms: 0,
        },
        ..QueueConfig::default()
    }
}

pub fn build_manager(
    config: QueueConfig,
    channel: Arc<MockChannel>,
) -> (Arc<PriorityQueueManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let manager = Arc::new(PriorityQueueManager::with_clock(
        config,
        channel,
        clock.clone(),
    ));

    (manager, clock)
}
