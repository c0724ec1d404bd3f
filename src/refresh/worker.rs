use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cache::LocationCache;
use crate::error::Result;
use crate::lookup::LocationResolver;
use crate::models::LocationRecord;

/// Largest number of BSSIDs sent to the resolver in one request.
pub const MAX_BATCH_SIZE: usize = 10;

const ROUND_DELAY_SECS: u64 = 30;

/// Drains the refresh queue in batches until nothing is pending.
///
/// Each round resolves one batch, writes the outcome in a single commit and
/// signals the session to recompute. A failed round keeps its batch pending
/// and retries after the delay. The queue receiver stays locked for the
/// worker's whole life; releasing it on exit lets the next spawn take over.
///
/// The exit check holds the coordinator's `running` guard across one final
/// queue drain, so anything sent before the flag clears lands in this
/// worker's pending set rather than stranding in the channel.
pub(super) async fn refresh_loop(
    cache: LocationCache,
    resolver: Arc<dyn LocationResolver>,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<String>>>>,
    recompute_tx: mpsc::UnboundedSender<()>,
    running: Arc<StdMutex<bool>>,
    cancel_token: CancellationToken,
) {
    let mut queue_rx = queue_rx.lock().await;
    let mut pending: HashSet<String> = HashSet::new();

    loop {
        while let Ok(bssids) = queue_rx.try_recv() {
            pending.extend(bssids);
        }
        if pending.is_empty() {
            let mut flag = match running.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            while let Ok(bssids) = queue_rx.try_recv() {
                pending.extend(bssids);
            }
            if pending.is_empty() {
                *flag = false;
                info!("refresh queue drained, worker exiting");
                return;
            }
        }

        let batch: Vec<String> = pending.iter().take(MAX_BATCH_SIZE).cloned().collect();
        debug!("resolving batch of {} ({} pending)", batch.len(), pending.len());

        let outcome = tokio::select! {
            outcome = resolver.resolve(&batch) => outcome,
            _ = cancel_token.cancelled() => return,
        };

        match outcome {
            Ok(records) => {
                if let Err(err) = merge_batch(&cache, &batch, records, &mut pending).await {
                    warn!("failed to store resolved batch: {err}");
                } else if recompute_tx.send(()).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!("lookup failed for batch of {}: {err}", batch.len());
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(ROUND_DELAY_SECS)) => {}
            _ = cancel_token.cancelled() => return,
        }
    }
}

/// Stores every returned record, harvested neighbors included, then writes a
/// negative entry for each requested BSSID the resolver stayed silent on so
/// it is not re-asked for a month.
async fn merge_batch(
    cache: &LocationCache,
    batch: &[String],
    records: Vec<LocationRecord>,
    pending: &mut HashSet<String>,
) -> Result<()> {
    let now_ms = Utc::now().timestamp_millis();
    let mut editor = cache.begin_edit();

    for record in records {
        if let Some(bssid) = &record.bssid {
            pending.remove(bssid);
        }
        editor.put(record);
    }

    for bssid in batch {
        if pending.remove(bssid) {
            debug!("no location for {bssid}, caching negative entry");
            editor.put(LocationRecord::negative(bssid.clone(), now_ms));
        }
    }

    editor.commit().await
}
