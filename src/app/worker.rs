//! Background job worker.
//!
//! Periodically runs a processing cycle on the job service. Multiple
//! workers (in this process or others) are safe; coordination happens
//! through datastore locks, not here.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::service::JobService;

/// Background worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between processing cycles
    pub poll_interval: std::time::Duration,
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(10),
            enabled: true,
        }
    }
}

/// Spawn the periodic job worker.
/// Returns the task handle and a shutdown signal sender.
pub fn spawn_worker(
    service: Arc<JobService>,
    config: WorkerConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(
            worker_id = %service.worker_id(),
            interval_secs = config.poll_interval.as_secs(),
            "Background worker started"
        );
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.process_jobs().await {
                        Ok(0) => {}
                        Ok(count) => info!(count = count, "Processing cycle complete"),
                        Err(e) => error!(error = ?e, "Processing cycle failed"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Background worker shutting down");
                        break;
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}
