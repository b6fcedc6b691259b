//! Background purge task
//!
//! Runs [`ArtifactStore::purge_expired`] on a fixed interval, independent of
//! request traffic. Started at process init and stopped at shutdown.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::ArtifactStore;

/// Handle to the running purge loop
pub struct PurgeScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PurgeScheduler {
    /// Spawn the purge loop
    pub fn start(store: ArtifactStore, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = interval.as_secs(), "Purge scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.purge_expired().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            // One last pass so expired artifacts don't wait for the next start
            store.purge_expired().await;
            tracing::info!("Purge scheduler stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the loop and wait for its final purge
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Purge scheduler task failed");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
