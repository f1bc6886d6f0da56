use std::time::Duration;

use anyhow::{Error, anyhow};
use reqwest::Client;
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publishes online/offline transitions by probing a URL on an interval.
pub struct ConnectivityMonitor {
    http_client: Client,
    probe_url: String,
    probe_interval: Duration,
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(
        probe_url: String,
        probe_interval: Duration,
    ) -> Result<(Self, watch::Receiver<bool>), Error> {
        let http_client = Client::builder()
            .timeout(probe_interval.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| anyhow!("Failed to build connectivity probe client: {}", e))?;

        let (tx, rx) = watch::channel(true);

        Ok((
            Self {
                http_client,
                probe_url,
                probe_interval,
                tx,
            },
            rx,
        ))
    }

    pub async fn probe(&self) -> bool {
        match self.http_client.head(&self.probe_url).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Connectivity probe answered");
                !response.status().is_server_error()
            }
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(url = %self.probe_url, "Connectivity monitor started");

        let mut ticker = interval(self.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let online = self.probe().await;
                    let changed = self.tx.send_if_modified(|current| {
                        if *current == online {
                            false
                        } else {
                            *current = online;
                            true
                        }
                    });

                    if changed {
                        if online {
                            info!("Connectivity restored");
                        } else {
                            warn!("Connectivity lost");
                        }
                    }
                }
            }
        }

        info!("Connectivity monitor stopped");
    }
}
