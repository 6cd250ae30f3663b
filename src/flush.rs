//! Background flush worker
//!
//! Drains the dirty set to the durable store on a fixed interval. The
//! first successful cycle writes every live record, not just the dirty
//! ones, to pick up state that was persisted-in-place across the last
//! shutdown. On shutdown the worker runs one final dump and strips the
//! session TTLs so hot records survive the downtime.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::manager::UserManager;
use crate::store::{DurableStore, FastStore};

/// Handle to a running flush worker
pub struct FlushHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the worker and wait for its final dump to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Flush worker task failed: {}", e);
        }
    }
}

pub fn spawn_flush_task<F, D>(manager: Arc<UserManager<F, D>>, interval: Duration) -> FlushHandle
where
    F: FastStore + 'static,
    D: DurableStore + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let task = tokio::spawn(async move {
        info!("Flush worker started, interval {:?}", interval);
        let mut synced_all = false;

        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    match manager.dump_users(!synced_all).await {
                        Ok(count) => {
                            if count > 0 {
                                debug!("Flushed {} user states", count);
                            }
                            synced_all = true;
                        }
                        Err(e) => {
                            error!("Flush cycle failed: {}", e);
                            // A failed pass may have consumed dirty
                            // markers without writing; go back to a
                            // full dump until one succeeds
                            synced_all = false;
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        match manager.dump_users(!synced_all).await {
            Ok(count) => info!("Final flush persisted {} user states", count),
            Err(e) => error!("Final flush failed: {}", e),
        }
        if let Err(e) = manager.remove_ttls().await {
            error!("Failed to remove session TTLs: {}", e);
        }
        info!("Flush worker stopped");
    });

    FlushHandle { shutdown_tx, task }
}
