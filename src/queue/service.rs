use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::manager::PriorityQueueManager;

struct BatchTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives a `PriorityQueueManager` with one task per periodic duty.
///
/// Each task owns its own ticker. A tick that fires while the previous run is
/// still going is skipped, not queued.
pub struct QueueService {
    manager: Arc<PriorityQueueManager>,
    shutdown: CancellationToken,
    batch_task: Mutex<Option<BatchTask>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueService {
    pub fn new(manager: Arc<PriorityQueueManager>) -> Self {
        Self {
            manager,
            shutdown: CancellationToken::new(),
            batch_task: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn manager(&self) -> &Arc<PriorityQueueManager> {
        &self.manager
    }

    /// Spawns the batch, retry and cleanup tasks, plus a connectivity watcher when given one.
    pub fn start(&self, connectivity: Option<watch::Receiver<bool>>) {
        let config = self.manager.config().clone();
        let mut tasks = self.tasks.lock();

        tasks.push(tokio::spawn(retry_loop(
            Arc::clone(&self.manager),
            config.retry_interval,
            self.shutdown.child_token(),
        )));

        tasks.push(tokio::spawn(cleanup_loop(
            Arc::clone(&self.manager),
            config.cleanup_interval,
            self.shutdown.child_token(),
        )));

        if let Some(rx) = connectivity {
            tasks.push(tokio::spawn(connectivity_loop(
                Arc::clone(&self.manager),
                rx,
                self.shutdown.child_token(),
            )));
        }
        drop(tasks);

        self.resume();

        info!(
            batch_interval_ms = config.batch_interval.as_millis() as u64,
            retry_interval_ms = config.retry_interval.as_millis() as u64,
            cleanup_interval_ms = config.cleanup_interval.as_millis() as u64,
            "Queue service started"
        );
    }

    /// Stops the batch timer. Queued work is kept. Returns whether anything changed.
    pub fn pause(&self) -> bool {
        match self.batch_task.lock().take() {
            Some(task) => {
                task.token.cancel();
                info!("Batch dispatch paused");
                true
            }
            None => false,
        }
    }

    /// Restarts the batch timer if it is not running. Returns whether anything changed.
    pub fn resume(&self) -> bool {
        if self.shutdown.is_cancelled() {
            warn!("Queue service is shut down, ignoring resume");
            return false;
        }

        let mut batch_task = self.batch_task.lock();
        if batch_task.is_some() {
            return false;
        }

        let token = self.shutdown.child_token();
        let handle = tokio::spawn(batch_loop(
            Arc::clone(&self.manager),
            self.manager.config().batch_interval,
            token.clone(),
        ));
        *batch_task = Some(BatchTask { token, handle });

        info!("Batch dispatch running");
        true
    }

    pub fn is_paused(&self) -> bool {
        self.batch_task.lock().is_none()
    }

    /// Stops every task and waits for in-progress runs to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let mut handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        if let Some(task) = self.batch_task.lock().take() {
            handles.push(task.handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Queue task ended abnormally");
            }
        }

        info!("Queue service stopped");
    }
}

async fn batch_loop(manager: Arc<PriorityQueueManager>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let outcome = manager.run_batch().await;
                if outcome.is_skipped() {
                    debug!(?outcome, "Batch tick skipped");
                }
            }
        }
    }

    debug!("Batch loop stopped");
}

async fn retry_loop(manager: Arc<PriorityQueueManager>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                manager.promote_retries();
            }
        }
    }

    debug!("Retry loop stopped");
}

async fn cleanup_loop(manager: Arc<PriorityQueueManager>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                manager.cleanup();
            }
        }
    }

    debug!("Cleanup loop stopped");
}

async fn connectivity_loop(
    manager: Arc<PriorityQueueManager>,
    mut rx: watch::Receiver<bool>,
    token: CancellationToken,
) {
    let online = *rx.borrow_and_update();
    manager.set_online(online);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Connectivity source closed");
                    break;
                }
                let online = *rx.borrow_and_update();
                manager.set_online(online);
            }
        }
    }

    debug!("Connectivity loop stopped");
}
