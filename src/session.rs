//! Session facade over the cache, the fusion engine and the refresh loop.
//!
//! A [`WifiLocator`] is cheap to clone; clones share the same cache, worker
//! and estimate channel. The host pushes observation snapshots in and reads
//! position estimates back, either synchronously from the push or later over
//! the watch channel once refreshed data lands.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::LocationCache;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::fusion::FusionEngine;
use crate::lookup::{HttpResolver, LocationResolver};
use crate::mac::normalize_bssid;
use crate::models::{AccessPointObservation, LocationRecord};
use crate::refresh::RefreshCoordinator;

struct SessionState {
    last_observations: Vec<AccessPointObservation>,
    closed: bool,
}

#[derive(Clone)]
pub struct WifiLocator {
    cache: LocationCache,
    fusion: Arc<FusionEngine>,
    resolver: Arc<dyn LocationResolver>,
    refresh: Arc<Mutex<RefreshCoordinator>>,
    state: Arc<Mutex<SessionState>>,
    estimates_tx: Arc<watch::Sender<Option<LocationRecord>>>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel_token: CancellationToken,
}

impl WifiLocator {
    /// Opens a session backed by the HTTP lookup service from `config`.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let resolver = HttpResolver::new(&config.service_url, &config.client_id)?;
        Self::open_with_resolver(config, Arc::new(resolver)).await
    }

    /// Opens a session with a caller-supplied resolver. The cache is opened
    /// and migrated before this returns.
    pub async fn open_with_resolver(
        config: SessionConfig,
        resolver: Arc<dyn LocationResolver>,
    ) -> Result<Self> {
        let cache = LocationCache::open(config.db_path.clone())?;
        let fusion = Arc::new(FusionEngine::new(&config.provider, cache.clone()));

        let cancel_token = CancellationToken::new();
        let (recompute_tx, recompute_rx) = mpsc::unbounded_channel();
        let refresh = RefreshCoordinator::new(
            cache.clone(),
            Arc::clone(&resolver),
            recompute_tx,
            cancel_token.clone(),
        );

        let (estimates_tx, _) = watch::channel(None);

        let locator = Self {
            cache,
            fusion,
            resolver,
            refresh: Arc::new(Mutex::new(refresh)),
            state: Arc::new(Mutex::new(SessionState {
                last_observations: Vec::new(),
                closed: false,
            })),
            estimates_tx: Arc::new(estimates_tx),
            listener: Arc::new(Mutex::new(None)),
            cancel_token,
        };

        locator.spawn_recompute_listener(recompute_rx).await;
        info!("Locator session open, cache at {}", locator.cache.path().display());
        Ok(locator)
    }

    /// Feeds a fresh scan snapshot in and returns the best estimate the
    /// cache can support right now. Unknown and stale access points go to
    /// the refresh queue; once their lookups land, a better estimate is
    /// published on [`WifiLocator::estimates`].
    ///
    /// Returns `Ok(None)` after [`WifiLocator::close`].
    pub async fn on_observations_changed(
        &self,
        observations: Vec<AccessPointObservation>,
    ) -> Result<Option<LocationRecord>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(None);
        }
        state.last_observations = observations;

        let estimate = self.fuse_observations(&state.last_observations).await?;
        self.estimates_tx.send_replace(estimate.clone());
        Ok(estimate)
    }

    /// Subscription for estimates published asynchronously after refresh
    /// rounds. The current value is whatever was published last, `None`
    /// before the first estimate.
    pub fn estimates(&self) -> watch::Receiver<Option<LocationRecord>> {
        self.estimates_tx.subscribe()
    }

    /// Warms the cache around a point: takes the nearest cached access
    /// point as a seed, resolves it remotely and stores everything the
    /// service returns alongside it. Returns the number of records stored.
    ///
    /// Unlike the background refresh this is a foreground call, so lookup
    /// errors surface to the caller. With an empty cache there is no seed
    /// and this returns `Ok(0)`.
    pub async fn prefetch_near(&self, latitude: f64, longitude: f64) -> Result<usize> {
        let seeds = self.cache.get_near(latitude, longitude, 1, i64::MAX).await?;
        let Some(seed) = seeds.into_iter().next() else {
            return Ok(0);
        };
        let Some(seed_bssid) = seed.bssid else {
            return Ok(0);
        };

        let records = self.resolver.resolve(std::slice::from_ref(&seed_bssid)).await?;
        let stored = records.len();
        debug!("prefetch near {latitude}/{longitude} seeded by {seed_bssid} got {stored} records");

        let mut editor = self.cache.begin_edit();
        for record in records {
            editor.put(record);
        }
        editor.commit().await?;
        Ok(stored)
    }

    /// Stops the refresh worker and the recompute listener, waiting for
    /// both. All cache writes issued before this returns are durable.
    /// Idempotent; later observation pushes return `Ok(None)`.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }

        self.cancel_token.cancel();
        self.refresh.lock().await.close().await?;

        if let Some(handle) = self.listener.lock().await.take() {
            if let Err(err) = handle.await {
                warn!("recompute listener failed to join: {err}");
            }
        }

        info!("Locator session closed");
        Ok(())
    }

    /// One pass over a snapshot: look every BSSID up in the cache, queue
    /// the unknown and stale ones for refresh, fuse the usable rest.
    async fn fuse_observations(
        &self,
        observations: &[AccessPointObservation],
    ) -> Result<Option<LocationRecord>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut candidates = Vec::new();
        let mut unknown = Vec::new();

        for observation in observations {
            if observation.opted_out() {
                debug!("skipping opted-out access point {}", observation.bssid);
                continue;
            }
            let bssid = match normalize_bssid(&observation.bssid) {
                Ok(bssid) => bssid,
                Err(err) => {
                    warn!("ignoring observation {}: {err}", observation.bssid);
                    continue;
                }
            };

            match self.cache.get(&bssid).await? {
                Some(mut record) => {
                    if record.is_stale(now_ms) {
                        unknown.push(bssid);
                    }
                    record.signal_dbm = Some(observation.signal_dbm);
                    if record.has_usable_position() {
                        candidates.push(record);
                    }
                }
                None => unknown.push(bssid),
            }
        }

        debug!(
            "snapshot of {}: {} usable, {} to refresh",
            observations.len(),
            candidates.len(),
            unknown.len()
        );

        if !unknown.is_empty() {
            self.refresh.lock().await.enqueue(unknown);
        }

        self.fusion.estimate(&candidates).await
    }

    /// Listens for refresh merges and re-runs fusion over the last snapshot
    /// so the host sees improved estimates without pushing a new scan.
    async fn spawn_recompute_listener(&self, mut recompute_rx: mpsc::UnboundedReceiver<()>) {
        let locator = self.clone();
        let cancel_token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => return,
                    signal = recompute_rx.recv() => {
                        if signal.is_none() {
                            return;
                        }
                    }
                }

                if let Err(err) = locator.recompute().await {
                    warn!("recompute after refresh failed: {err}");
                }
            }
        });

        *self.listener.lock().await = Some(handle);
    }

    async fn recompute(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }

        let estimate = self.fuse_observations(&state.last_observations).await?;
        self.estimates_tx.send_replace(estimate);
        Ok(())
    }
}
