use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::runtime::scheduler::Scheduler;

/// Background task that periodically retires expired terminal tasks.
///
/// Runs until [`CleanupSweeper::stop`] is awaited or the sweeper is dropped.
#[derive(Debug)]
pub struct CleanupSweeper {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupSweeper {
    pub fn spawn(scheduler: Scheduler, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "cleanup sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = scheduler.sweep_expired().await;
                        debug!(removed, "cleanup pass finished");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("cleanup sweeper stopped");
        });

        Self { stop_tx, handle }
    }

    /// Signal the sweeper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "cleanup sweeper ended abnormally");
        }
    }
}
