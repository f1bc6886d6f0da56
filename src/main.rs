use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use notification_queue::{
    api::{AppState, run_api_server},
    clients::{
        channel::DeliveryChannel, connectivity::ConnectivityMonitor, log_channel::LogChannel,
        webhook::WebhookChannel,
    },
    config::Config,
    queue::{PriorityQueueManager, QueueService},
    utils::init_tracing,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::load()?;
    info!(port = config.server_port, "Configuration validated");

    let webhook = WebhookChannel::from_config(&config)?.map(Arc::new);
    let channel: Arc<dyn DeliveryChannel> = match &webhook {
        Some(webhook) => webhook.clone(),
        None => {
            info!("No WEBHOOK_URL configured, delivering to log");
            Arc::new(LogChannel)
        }
    };

    let manager = Arc::new(PriorityQueueManager::new(config.queue_config(), channel));
    let service = Arc::new(QueueService::new(manager));

    let monitor_token = CancellationToken::new();
    let connectivity = match config.connectivity_probe_url.clone() {
        Some(url) => {
            let (monitor, rx) = ConnectivityMonitor::new(
                url,
                Duration::from_millis(config.connectivity_probe_interval_ms),
            )?;
            tokio::spawn(monitor.run(monitor_token.clone()));
            Some(rx)
        }
        None => None,
    };

    service.start(connectivity);

    let state = Arc::new(AppState {
        service: Arc::clone(&service),
        webhook,
    });

    tokio::select! {
        result = run_api_server(state, config.server_port) => {
            if let Err(e) = result {
                error!(error = %e, "API server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    monitor_token.cancel();
    service.shutdown().await;

    Ok(())
}
