use std::time::Duration;

use anyhow::Result;
use notification_queue::{
    models::{
        notification::{NotificationRequest, NotificationType},
        priority::Priority,
        queue::QueueConfig,
        retry::RetryConfig,
        status::NotificationStatus,
    },
    utils::{backoff_base_delay, backoff_delay},
};

use crate::common::{MockChannel, build_manager, test_config};

/// Test: Backoff grows strictly with the attempt count
#[test]
fn test_backoff_strictly_increases() {
    let config = RetryConfig {
        base_delay_ms: 500,
        backoff_multiplier: 2,
        jitter_ms: 0,
    };

    let delays: Vec<Duration> = (0..10).map(|n| backoff_base_delay(&config, n)).collect();

    assert_eq!(delays[0], Duration::from_millis(500));
    assert_eq!(delays[1], Duration::from_millis(1000));
    assert_eq!(delays[3], Duration::from_millis(4000));
    assert!(
        delays.windows(2).all(|w| w[1] > w[0]),
        "Delays should strictly increase: {:?}",
        delays
    );
}

/// Test: Jitter stays within its bound and actually varies
#[test]
fn test_jitter_applied_to_delays() {
    let config = RetryConfig {
        base_delay_ms: 1000,
        backoff_multiplier: 2,
        jitter_ms: 200,
    };

    let base = backoff_base_delay(&config, 2);
    let samples: Vec<Duration> = (0..50).map(|_| backoff_delay(&config, 2)).collect();

    for delay in &samples {
        assert!(*delay >= base && *delay <= base + Duration::from_millis(200));
    }

    let min = samples.iter().min().unwrap();
    let max = samples.iter().max().unwrap();
    assert!(max > min, "Delays should vary due to jitter");
}

/// Test: Huge attempt counts saturate instead of overflowing
#[test]
fn test_backoff_saturates() {
    let config = RetryConfig {
        base_delay_ms: u64::MAX / 2,
        backoff_multiplier: 10,
        jitter_ms: 0,
    };

    assert_eq!(backoff_base_delay(&config, 1_000), Duration::from_millis(u64::MAX));
}

/// Test: A failed send reappears in its bucket after the backoff with attempts == 1
#[tokio::test]
async fn test_failed_send_returns_after_backoff() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());

    manager.enqueue(
        NotificationRequest::new(NotificationType::OrderCreated)
            .with_id("order-9")
            .with_max_retries(3),
    )?;

    channel.set_fail_all(true);
    manager.run_batch().await;

    assert!(manager.is_empty());
    assert_eq!(manager.retry_len(), 1);
    match manager.locate("order-9") {
        Some(NotificationStatus::Retrying { attempts, .. }) => assert_eq!(attempts, 1),
        other => panic!("Expected retrying status, got {:?}", other),
    }

    // 1000ms * 2^1
    clock.advance_ms(1_999);
    assert_eq!(manager.promote_retries(), 0, "Not yet eligible");

    clock.advance_ms(1);
    assert_eq!(manager.promote_retries(), 1);

    let bucket = manager.bucket(Priority::new(3));
    assert_eq!(bucket.len(), 1);
    assert_eq!(bucket[0].id, "order-9");
    assert_eq!(bucket[0].attempts, 1);
    assert_eq!(manager.retry_len(), 0);

    Ok(())
}

/// Test: The dead-letter log keeps only the newest entries
#[tokio::test]
async fn test_dead_letter_capacity_enforced() -> Result<()> {
    let channel = MockChannel::new();
    let config = QueueConfig {
        dead_letter_capacity: 1,
        ..test_config()
    };
    let (manager, _clock) = build_manager(config, channel.clone());
    channel.set_fail_all(true);

    for id in ["first", "second"] {
        manager.enqueue(
            NotificationRequest::new(NotificationType::OrderCreated)
                .with_id(id)
                .with_max_retries(0),
        )?;
        manager.run_batch().await;
    }

    let dead = manager.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].notification.id, "second");

    let stats = manager.stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.dead_letters, 1);

    Ok(())
}

/// Test: The (max_retries + 1)-th failure drops the notification for good
#[tokio::test]
async fn test_retries_exhausted_drop() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());
    channel.set_fail_all(true);

    manager.enqueue(
        NotificationRequest::new(NotificationType::OrderCreated)
            .with_id("doomed")
            .with_max_retries(3),
    )?;

    for round in 1..=3 {
        manager.run_batch().await;
        match manager.locate("doomed") {
            Some(NotificationStatus::Retrying { attempts, .. }) => assert_eq!(attempts, round),
            other => panic!("Round {}: expected retrying, got {:?}", round, other),
        }
        clock.advance_ms(60_000);
        assert_eq!(manager.promote_retries(), 1);
    }

    manager.run_batch().await;

    assert_eq!(channel.attempts().len(), 4);
    assert!(manager.locate("doomed").is_none());
    assert_eq!(manager.retry_len(), 0);

    let dead = manager.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].notification.id, "doomed");
    assert_eq!(dead[0].notification.attempts, 3);
    assert!(dead[0].failure_reason.contains("Mock delivery failure"));

    let stats = manager.stats();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.failed_attempts, 4);
    assert_eq!(stats.retried, 3);

    Ok(())
}

/// Test: Promoted retries are served before newer same-priority work
#[tokio::test]
async fn test_retries_promoted_to_front() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());

    channel.fail_id("first");
    manager.enqueue(NotificationRequest::new(NotificationType::OrderCreated).with_id("first"))?;
    manager.run_batch().await;

    manager.enqueue(NotificationRequest::new(NotificationType::OrderCreated).with_id("second"))?;
    manager.enqueue(NotificationRequest::new(NotificationType::OrderCreated).with_id("third"))?;

    clock.advance_ms(5_000);
    manager.promote_retries();

    let order: Vec<String> = manager
        .bucket(Priority::new(3))
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(order, vec!["first", "second", "third"]);

    Ok(())
}

/// Test: Retries that outlive their deadline are discarded on promotion
#[tokio::test]
async fn test_expired_retry_discarded_on_promotion() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());

    channel.set_fail_all(true);
    manager.enqueue(
        NotificationRequest::new(NotificationType::Promotion)
            .with_id("short-lived")
            .with_ttl_ms(1_500),
    )?;
    manager.run_batch().await;
    assert_eq!(manager.retry_len(), 1);

    clock.advance_ms(10_000);
    assert_eq!(manager.promote_retries(), 0);
    assert_eq!(manager.retry_len(), 0);
    assert!(manager.is_empty());
    assert_eq!(channel.attempts().len(), 1);

    Ok(())
}

/// Test: Cleanup purges expired entries from the retry area
#[tokio::test]
async fn test_cleanup_purges_expired_retries() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());

    channel.set_fail_all(true);
    manager.enqueue(
        NotificationRequest::new(NotificationType::OrderCreated)
            .with_id("late")
            .with_ttl_ms(1_000),
    )?;
    manager.run_batch().await;

    clock.advance_ms(1_000);
    let report = manager.cleanup();

    assert_eq!(report.expired_retries, 1);
    assert_eq!(manager.retry_len(), 0);

    Ok(())
}

/// Test: Regaining connectivity promotes due retries immediately
#[tokio::test]
async fn test_reconnect_promotes_retries() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());

    channel.set_fail_all(true);
    manager.enqueue(NotificationRequest::new(NotificationType::OrderCreated).with_id("order-1"))?;
    manager.run_batch().await;
    channel.set_fail_all(false);

    manager.set_online(false);
    clock.advance_ms(10_000);
    assert!(manager.run_batch().await.is_skipped());

    manager.set_online(true);
    assert_eq!(manager.retry_len(), 0);
    assert_eq!(manager.len(), 1);

    assert_eq!(manager.run_batch().await.sent(), 1);
    assert_eq!(channel.delivered(), vec!["order-1".to_string()]);

    Ok(())
}

/// Test: Retry bookkeeping is independent per notification
#[tokio::test]
async fn test_retry_state_independence() -> Result<()> {
    let channel = MockChannel::new();
    let (manager, clock) = build_manager(test_config(), channel.clone());

    channel.fail_id("flaky");
    manager.enqueue(NotificationRequest::new(NotificationType::OrderCreated).with_id("flaky"))?;
    manager.enqueue(NotificationRequest::new(NotificationType::OrderCreated).with_id("steady"))?;

    let outcome = manager.run_batch().await;
    assert_eq!(outcome.sent(), 1);

    clock.advance_ms(2_000);
    manager.promote_retries();
    manager.run_batch().await;

    match manager.locate("flaky") {
        Some(NotificationStatus::Retrying { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("Expected retrying, got {:?}", other),
    }
    assert_eq!(channel.delivered(), vec!["steady".to_string()]);

    Ok(())
}
