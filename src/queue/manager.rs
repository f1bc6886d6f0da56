//! Priority-bucketed notification queue with batching and retry backoff.
//!
//! A notification is owned by exactly one of: a priority bucket, the retry
//! holding area, or an in-progress send. Expired notifications are dropped
//! wherever they are found and never reach the delivery channel.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use anyhow::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    clients::channel::DeliveryChannel,
    clock::{Clock, SystemClock},
    models::{
        dead_letter::DeadLetter,
        notification::{Notification, NotificationRequest},
        priority::Priority,
        queue::{BatchOutcome, CleanupReport, QueueConfig, QueueStats, SkipReason},
        status::{DeliveryOutcome, NotificationStatus},
        validation::validate_request,
    },
    utils::backoff_delay,
};

#[derive(Debug, Clone)]
struct RetryEntry {
    notification: Notification,
    eligible_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct BatchSample {
    recorded_at: DateTime<Utc>,
    duration_ms: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    buckets: [VecDeque<Notification>; Priority::LEVELS],
    retries: HashMap<String, RetryEntry>,
    in_flight: HashSet<String>,
    /// Ids held by a bucket or the retry area.
    pending_ids: HashSet<String>,
    dedup_index: HashMap<(Priority, String), DateTime<Utc>>,
    samples: VecDeque<BatchSample>,
    dead_letters: VecDeque<DeadLetter>,
}

impl QueueState {
    fn total_queued(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    fn contains_id(&self, id: &str) -> bool {
        self.in_flight.contains(id) || self.pending_ids.contains(id)
    }

    /// Oldest entry of the lowest non-empty level that is not currently being sent.
    fn oldest_evictable(&self) -> Option<(usize, usize)> {
        Priority::ascending().find_map(|priority| {
            self.buckets[priority.index()]
                .iter()
                .enumerate()
                .filter(|(_, n)| !self.in_flight.contains(&n.id))
                .min_by_key(|(_, n)| n.enqueued_at)
                .map(|(position, _)| (priority.index(), position))
        })
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    duplicates_rejected: AtomicU64,
    sent: AtomicU64,
    failed_attempts: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    batches: AtomicU64,
}

impl QueueCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Resets the in-progress flag when a batch run ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn to_time_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

pub struct PriorityQueueManager {
    config: QueueConfig,
    channel: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    counters: QueueCounters,
    online: AtomicBool,
    processing: AtomicBool,
}

impl PriorityQueueManager {
    pub fn new(config: QueueConfig, channel: Arc<dyn DeliveryChannel>) -> Self {
        Self::with_clock(config, channel, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: QueueConfig,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            max_queue_size = config.max_queue_size,
            batch_size = config.batch_size,
            channel = channel.name(),
            "Priority queue manager initialized"
        );

        Self {
            config,
            channel,
            clock,
            state: Mutex::new(QueueState::default()),
            counters: QueueCounters::default(),
            online: AtomicBool::new(true),
            processing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Queues a notification. Returns `Ok(false)` when it is rejected as a duplicate.
    ///
    /// Malformed requests are an error. A full queue never is: the oldest
    /// entries of the lowest occupied level are evicted to make room.
    pub fn enqueue(self: &Arc<Self>, request: NotificationRequest) -> Result<bool, Error> {
        validate_request(&request)?;

        let now = self.clock.now();
        let priority = request.compute_priority();
        let dedup_window = to_time_delta(self.config.dedup_window);

        let urgent = {
            let mut state = self.state.lock();

            self.evict_for_capacity(&mut state);

            if let Some(key) = &request.deduplication_key {
                let seen_recently = state
                    .dedup_index
                    .get(&(priority, key.clone()))
                    .is_some_and(|at| now - *at < dedup_window);

                if seen_recently {
                    QueueCounters::bump(&self.counters.duplicates_rejected, 1);
                    debug!(
                        deduplication_key = %key,
                        priority = %priority,
                        "Duplicate notification rejected"
                    );
                    return Ok(false);
                }
            }

            if let Some(id) = &request.id {
                if state.contains_id(id) {
                    QueueCounters::bump(&self.counters.duplicates_rejected, 1);
                    debug!(id = %id, "Notification id already queued, rejecting");
                    return Ok(false);
                }
            }

            let notification = request.into_notification(priority, now);

            if let Some(key) = &notification.deduplication_key {
                state.dedup_index.insert((priority, key.clone()), now);
            }

            info!(
                id = %notification.id,
                notification_type = %notification.notification_type,
                priority = %priority,
                max_retries = notification.max_retries,
                "Notification enqueued"
            );

            let urgent = priority.is_urgent() && self.config.urgent_dispatch && self.is_online();
            let urgent_copy = if urgent {
                state.in_flight.insert(notification.id.clone());
                Some(notification.clone())
            } else {
                None
            };

            state.pending_ids.insert(notification.id.clone());
            state.buckets[priority.index()].push_back(notification);
            urgent_copy
        };

        QueueCounters::bump(&self.counters.enqueued, 1);

        if let Some(notification) = urgent {
            self.dispatch_urgent(notification);
        }

        Ok(true)
    }

    fn evict_for_capacity(&self, state: &mut QueueState) {
        while state.total_queued() >= self.config.max_queue_size {
            let Some((level, position)) = state.oldest_evictable() else {
                break;
            };

            if let Some(evicted) = state.buckets[level].remove(position) {
                state.pending_ids.remove(&evicted.id);
                QueueCounters::bump(&self.counters.evicted, 1);
                warn!(
                    id = %evicted.id,
                    priority = %evicted.priority,
                    outcome = %DeliveryOutcome::Evicted,
                    "Queue full, evicted oldest low-priority notification"
                );
            }
        }
    }

    /// Best-effort immediate send for urgent notifications.
    ///
    /// The entry stays in its bucket, marked in-flight so batches skip it.
    /// Success removes it from the bucket; failure leaves it for the batch path.
    fn dispatch_urgent(self: &Arc<Self>, notification: Notification) {
        let Ok(handle) = Handle::try_current() else {
            self.state.lock().in_flight.remove(&notification.id);
            return;
        };

        let manager = Arc::clone(self);
        handle.spawn(async move {
            let result = manager.channel.send(&notification).await;

            let mut state = manager.state.lock();
            state.in_flight.remove(&notification.id);

            match result {
                Ok(()) => {
                    let bucket = &mut state.buckets[notification.priority.index()];
                    if let Some(position) = bucket.iter().position(|n| n.id == notification.id) {
                        bucket.remove(position);
                        state.pending_ids.remove(&notification.id);
                    }
                    QueueCounters::bump(&manager.counters.sent, 1);
                    info!(
                        id = %notification.id,
                        outcome = %DeliveryOutcome::Sent,
                        "Urgent notification delivered"
                    );
                }
                Err(e) => {
                    debug!(
                        id = %notification.id,
                        error = %e,
                        outcome = %DeliveryOutcome::Failed,
                        "Urgent delivery failed, leaving notification for batch dispatch"
                    );
                }
            }
        });
    }

    /// Sends one batch. Skipped while offline or while another batch is running.
    pub async fn run_batch(&self) -> BatchOutcome {
        if !self.is_online() {
            debug!("Offline, skipping batch");
            return BatchOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }

        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Batch already in progress, skipping tick");
            return BatchOutcome::Skipped {
                reason: SkipReason::AlreadyProcessing,
            };
        }
        let _guard = ProcessingGuard(&self.processing);

        let started = Instant::now();
        let (batch, expired) = {
            let mut state = self.state.lock();
            self.collect_batch(&mut state, self.clock.now())
        };

        if batch.is_empty() {
            return BatchOutcome::Completed {
                selected: 0,
                sent: 0,
                failed: 0,
                expired,
                duration_ms: 0,
            };
        }

        let results = join_all(batch.iter().map(|n| self.channel.send(n))).await;

        let now = self.clock.now();
        let selected = batch.len();
        let mut sent = 0;
        let mut failed = 0;

        let mut state = self.state.lock();
        for (notification, result) in batch.into_iter().zip(results) {
            state.in_flight.remove(&notification.id);
            match result {
                Ok(()) => {
                    sent += 1;
                    debug!(
                        id = %notification.id,
                        priority = %notification.priority,
                        outcome = %DeliveryOutcome::Sent,
                        "Notification sent"
                    );
                }
                Err(e) => {
                    failed += 1;
                    self.handle_failure(&mut state, notification, e, now);
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        state.samples.push_back(BatchSample {
            recorded_at: now,
            duration_ms,
        });
        drop(state);

        QueueCounters::bump(&self.counters.sent, sent as u64);
        QueueCounters::bump(&self.counters.batches, 1);

        info!(selected, sent, failed, expired, duration_ms, "Batch processed");

        BatchOutcome::Completed {
            selected,
            sent,
            failed,
            expired,
            duration_ms,
        }
    }

    /// Takes up to `batch_size` entries, most urgent level first.
    ///
    /// Selected entries leave their bucket and are marked in-flight until the
    /// send result is applied.
    fn collect_batch(&self, state: &mut QueueState, now: DateTime<Utc>) -> (Vec<Notification>, usize) {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        let mut expired = 0;

        let QueueState {
            buckets,
            in_flight,
            pending_ids,
            ..
        } = state;

        for priority in Priority::descending() {
            if batch.len() >= self.config.batch_size {
                break;
            }

            let bucket = &mut buckets[priority.index()];
            let mut kept = VecDeque::with_capacity(bucket.len());

            while let Some(notification) = bucket.pop_front() {
                if in_flight.contains(&notification.id) {
                    kept.push_back(notification);
                } else if notification.is_expired(now) {
                    expired += 1;
                    pending_ids.remove(&notification.id);
                    debug!(
                        id = %notification.id,
                        outcome = %DeliveryOutcome::Expired,
                        "Discarding expired notification"
                    );
                } else if batch.len() < self.config.batch_size {
                    pending_ids.remove(&notification.id);
                    in_flight.insert(notification.id.clone());
                    batch.push(notification);
                } else {
                    kept.push_back(notification);
                }
            }

            *bucket = kept;
        }

        QueueCounters::bump(&self.counters.expired, expired as u64);
        (batch, expired)
    }

    fn handle_failure(
        &self,
        state: &mut QueueState,
        mut notification: Notification,
        error: Error,
        now: DateTime<Utc>,
    ) {
        QueueCounters::bump(&self.counters.failed_attempts, 1);

        if notification.retries_exhausted() {
            QueueCounters::bump(&self.counters.dropped, 1);
            warn!(
                id = %notification.id,
                attempts = notification.attempts,
                max_retries = notification.max_retries,
                error = %error,
                outcome = %DeliveryOutcome::Dropped,
                "Retries exhausted, dropping notification"
            );

            if self.config.dead_letter_capacity > 0 {
                state.dead_letters.push_back(DeadLetter {
                    notification,
                    failure_reason: error.to_string(),
                    failed_at: now,
                });
                while state.dead_letters.len() > self.config.dead_letter_capacity {
                    state.dead_letters.pop_front();
                }
            }
            return;
        }

        notification.attempts += 1;
        let delay = backoff_delay(&self.config.retry, notification.attempts);
        let eligible_at = now
            .checked_add_signed(to_time_delta(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        debug!(
            id = %notification.id,
            attempts = notification.attempts,
            max_retries = notification.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            outcome = %DeliveryOutcome::Retrying,
            "Delivery failed, scheduling retry"
        );

        QueueCounters::bump(&self.counters.retried, 1);
        state.pending_ids.insert(notification.id.clone());
        let key = format!("{}:{}", notification.id, notification.attempts);
        state.retries.insert(
            key,
            RetryEntry {
                notification,
                eligible_at,
            },
        );
    }

    /// Moves due retries to the front of their buckets. Returns how many moved.
    pub fn promote_retries(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let due_keys: Vec<String> = state
            .retries
            .iter()
            .filter(|(_, entry)| entry.eligible_at <= now || entry.notification.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let mut due = Vec::with_capacity(due_keys.len());
        let mut expired = 0;
        for key in due_keys {
            let Some(entry) = state.retries.remove(&key) else {
                continue;
            };

            if entry.notification.is_expired(now) {
                expired += 1;
                state.pending_ids.remove(&entry.notification.id);
                debug!(
                    id = %entry.notification.id,
                    outcome = %DeliveryOutcome::Expired,
                    "Retry expired before becoming eligible"
                );
            } else {
                due.push(entry);
            }
        }
        QueueCounters::bump(&self.counters.expired, expired);

        // Latest first, so after the push_fronts the earliest-eligible entry leads.
        due.sort_by(|a, b| b.eligible_at.cmp(&a.eligible_at));

        let promoted = due.len();
        for entry in due {
            let level = entry.notification.priority.index();
            state.buckets[level].push_front(entry.notification);
        }

        if promoted > 0 {
            debug!(promoted, "Promoted retries back into priority buckets");
        }

        promoted
    }

    /// Drops expired entries everywhere and trims bookkeeping past its retention window.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now();
        let dedup_window = to_time_delta(self.config.dedup_window);
        let retention = to_time_delta(self.config.metrics_retention);

        let mut state = self.state.lock();
        let mut report = CleanupReport::default();

        let QueueState {
            buckets,
            retries,
            in_flight,
            pending_ids,
            dedup_index,
            samples,
            ..
        } = &mut *state;

        for bucket in buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|n| {
                let keep = in_flight.contains(&n.id) || !n.is_expired(now);
                if !keep {
                    pending_ids.remove(&n.id);
                }
                keep
            });
            report.expired_queued += before - bucket.len();
        }

        let before = retries.len();
        retries.retain(|_, entry| {
            let keep = !entry.notification.is_expired(now);
            if !keep {
                pending_ids.remove(&entry.notification.id);
            }
            keep
        });
        report.expired_retries = before - retries.len();

        let before = dedup_index.len();
        dedup_index.retain(|_, at| now - *at < dedup_window);
        report.dedup_entries = before - dedup_index.len();

        while samples
            .front()
            .is_some_and(|sample| now - sample.recorded_at > retention)
        {
            samples.pop_front();
            report.samples += 1;
        }
        drop(state);

        QueueCounters::bump(
            &self.counters.expired,
            (report.expired_queued + report.expired_retries) as u64,
        );

        if report != CleanupReport::default() {
            debug!(
                expired_queued = report.expired_queued,
                expired_retries = report.expired_retries,
                dedup_entries = report.dedup_entries,
                samples = report.samples,
                "Cleanup pass finished"
            );
        }

        report
    }

    /// Records a connectivity change. Coming back online promotes due retries immediately.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::AcqRel);

        match (was_online, online) {
            (false, true) => {
                let promoted = self.promote_retries();
                info!(promoted, "Back online, resuming dispatch");
            }
            (true, false) => warn!("Offline, pausing dispatch"),
            _ => {}
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Removes the first match from the buckets, then from the retry area.
    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for bucket in state.buckets.iter_mut() {
            if let Some(position) = bucket.iter().position(|n| n.id == id) {
                bucket.remove(position);
                state.pending_ids.remove(id);
                info!(id, "Notification removed from queue");
                return true;
            }
        }

        let retry_key = state
            .retries
            .iter()
            .find(|(_, entry)| entry.notification.id == id)
            .map(|(key, _)| key.clone());

        if let Some(key) = retry_key {
            state.retries.remove(&key);
            state.pending_ids.remove(id);
            info!(id, "Notification removed from retry area");
            return true;
        }

        false
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();

        let queued = state.total_queued();
        let retrying = state.retries.len();

        for bucket in state.buckets.iter_mut() {
            bucket.clear();
        }
        state.retries.clear();
        state.pending_ids.clear();

        info!(queued, retrying, "Queue cleared");
    }

    pub fn locate(&self, id: &str) -> Option<NotificationStatus> {
        let state = self.state.lock();

        if state.in_flight.contains(id) {
            return Some(NotificationStatus::InFlight);
        }

        for priority in Priority::descending() {
            if let Some(position) = state.buckets[priority.index()]
                .iter()
                .position(|n| n.id == id)
            {
                return Some(NotificationStatus::Queued { priority, position });
            }
        }

        state
            .retries
            .values()
            .find(|entry| entry.notification.id == id)
            .map(|entry| NotificationStatus::Retrying {
                priority: entry.notification.priority,
                attempts: entry.notification.attempts,
                eligible_at: entry.eligible_at,
            })
    }

    /// Snapshot of one priority bucket in dispatch order.
    pub fn bucket(&self, priority: Priority) -> Vec<Notification> {
        self.state.lock().buckets[priority.index()]
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().total_queued()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retry_len(&self) -> usize {
        self.state.lock().retries.len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();

        let mut queued_by_priority = [0; Priority::LEVELS];
        for (level, bucket) in state.buckets.iter().enumerate() {
            queued_by_priority[level] = bucket.len();
        }

        let avg_batch_duration_ms = if state.samples.is_empty() {
            None
        } else {
            let total: u64 = state.samples.iter().map(|s| s.duration_ms).sum();
            Some(total as f64 / state.samples.len() as f64)
        };

        let c = &self.counters;
        QueueStats {
            queued_by_priority,
            total_queued: state.total_queued(),
            retry_pending: state.retries.len(),
            in_flight: state.in_flight.len(),
            online: self.is_online(),
            processing: self.is_processing(),
            enqueued: QueueCounters::read(&c.enqueued),
            duplicates_rejected: QueueCounters::read(&c.duplicates_rejected),
            sent: QueueCounters::read(&c.sent),
            failed_attempts: QueueCounters::read(&c.failed_attempts),
            retried: QueueCounters::read(&c.retried),
            dropped: QueueCounters::read(&c.dropped),
            expired: QueueCounters::read(&c.expired),
            evicted: QueueCounters::read(&c.evicted),
            batches: QueueCounters::read(&c.batches),
            avg_batch_duration_ms,
            dead_letters: state.dead_letters.len(),
        }
    }
}
