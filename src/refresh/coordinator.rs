use std::sync::{Arc, Mutex as StdMutex};

use log::info;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::LocationCache;
use crate::error::{Error, Result};
use crate::lookup::LocationResolver;

use super::worker::refresh_loop;

/// Owns the refresh queue and at most one background worker.
///
/// BSSIDs arrive over the queue channel; the worker drains it into its own
/// pending set and exits once that set is empty, so the worker is respawned
/// on demand. The `running` flag is the handoff guard: the worker clears it
/// under the lock after one last drain of the queue, so a send that raced
/// the wind-down is either picked up by that drain or sees a cleared flag
/// and spawns a fresh worker.
pub struct RefreshCoordinator {
    cache: LocationCache,
    resolver: Arc<dyn LocationResolver>,
    queue_tx: mpsc::UnboundedSender<Vec<String>>,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<String>>>>,
    recompute_tx: mpsc::UnboundedSender<()>,
    running: Arc<StdMutex<bool>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl RefreshCoordinator {
    pub fn new(
        cache: LocationCache,
        resolver: Arc<dyn LocationResolver>,
        recompute_tx: mpsc::UnboundedSender<()>,
        cancel_token: CancellationToken,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            cache,
            resolver,
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            recompute_tx,
            running: Arc::new(StdMutex::new(false)),
            handle: None,
            cancel_token,
        }
    }

    /// Hands unknown or stale BSSIDs to the background worker, spawning it
    /// if none is running. Duplicates collapse in the worker's pending set.
    pub fn enqueue(&mut self, bssids: Vec<String>) {
        if bssids.is_empty() || self.cancel_token.is_cancelled() {
            return;
        }

        if self.queue_tx.send(bssids).is_err() {
            return;
        }

        // Spawn decision shares a guard with the worker's exit decision; see
        // the struct docs for the handoff invariant.
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !*running {
            *running = true;
            info!("starting refresh worker");
            self.handle = Some(tokio::spawn(refresh_loop(
                self.cache.clone(),
                Arc::clone(&self.resolver),
                Arc::clone(&self.queue_rx),
                self.recompute_tx.clone(),
                Arc::clone(&self.running),
                self.cancel_token.clone(),
            )));
        }
    }

    /// Cancels the worker and waits for it to finish. Idempotent; safe with
    /// no worker running. An in-flight lookup is abandoned, its pending set
    /// discarded.
    pub async fn close(&mut self) -> Result<()> {
        self.cancel_token.cancel();

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|err| Error::Internal(format!("refresh worker failed to join: {err}")))?;
        }
        Ok(())
    }
}
