//! Persistent store of access point locations, keyed by BSSID.
//!
//! A dedicated thread owns the SQLite connection; callers talk to it over a
//! channel and get their results back on oneshot replies. This keeps all
//! reads and writes serialized without holding a lock across awaits.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::error::{Error, Result};
use crate::models::LocationRecord;
use migrations::run_migrations;

pub use migrations::CURRENT_SCHEMA_VERSION;

type CacheTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum CacheCommand {
    Execute(CacheTask),
    Shutdown,
}

struct CacheInner {
    sender: mpsc::Sender<CacheCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(CacheCommand::Shutdown) {
                error!("Failed to send shutdown to cache thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join cache thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct LocationCache {
    inner: Arc<CacheInner>,
    db_path: Arc<PathBuf>,
}

impl LocationCache {
    /// Opens (or creates) the cache database and runs migrations before
    /// accepting any command. A database written by a newer build fails here
    /// with [`Error::SchemaMismatch`].
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (command_tx, command_rx) = mpsc::channel::<CacheCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("wifiloc-cache".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(Error::Cache(err)));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.busy_timeout(std::time::Duration::from_secs(5)) {
                    error!("Failed to set busy timeout: {err}");
                }

                let init_result = run_migrations(&mut conn);
                if ready_tx.send(init_result).is_err() {
                    error!("Cache initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        CacheCommand::Execute(task) => task(&mut conn),
                        CacheCommand::Shutdown => break,
                    }
                }

                info!("Cache thread shutting down");
            })?;

        ready_rx.recv().map_err(|_| {
            Error::Internal("cache worker exited before signaling readiness".to_string())
        })??;

        info!("Location cache ready at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(CacheInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = CacheCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Cache caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| Error::Internal(format!("failed to send command to cache thread: {err}")))?;

        reply_rx
            .await
            .map_err(|_| Error::Internal("cache thread terminated unexpectedly".to_string()))?
    }

    /// Exact lookup by normalized BSSID.
    pub async fn get(&self, bssid: &str) -> Result<Option<LocationRecord>> {
        let bssid = bssid.to_string();
        self.execute(move |conn| {
            let record = conn
                .query_row(
                    "SELECT mac, provider, latitude, longitude, altitude, accuracy, time, verified
                     FROM location
                     WHERE mac = ?1",
                    params![bssid],
                    read_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    /// Up to `limit` records observed within `max_age_ms`, closest first.
    ///
    /// Distance is the planar squared difference in degrees, evaluated by
    /// SQLite in the ORDER BY. That is wrong geodesy but fine for ranking
    /// rows around a nearby point, which is all this is used for.
    pub async fn get_near(
        &self,
        latitude: f64,
        longitude: f64,
        limit: u32,
        max_age_ms: i64,
    ) -> Result<Vec<LocationRecord>> {
        self.execute(move |conn| {
            let cutoff = Utc::now().timestamp_millis().saturating_sub(max_age_ms);
            let mut stmt = conn.prepare(
                "SELECT mac, provider, latitude, longitude, altitude, accuracy, time, verified
                 FROM location
                 WHERE time > ?1
                 ORDER BY (latitude - ?2) * (latitude - ?2) + (longitude - ?3) * (longitude - ?3) ASC
                 LIMIT ?4",
            )?;

            let rows = stmt.query_map(params![cutoff, latitude, longitude, limit], read_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    /// Opens a batch-write scope. Queued puts hit the database only on
    /// [`Editor::commit`]; a dropped editor writes nothing.
    pub fn begin_edit(&self) -> Editor {
        Editor {
            cache: self.clone(),
            queued: Vec::new(),
        }
    }
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationRecord> {
    Ok(LocationRecord {
        bssid: row.get(0)?,
        provider: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        altitude: row.get(4)?,
        accuracy: row.get(5)?,
        observed_at_ms: row.get(6)?,
        verified_at_ms: row.get(7)?,
        signal_dbm: None,
        combined_of: None,
    })
}

/// Accumulates upserts and applies them in a single transaction.
pub struct Editor {
    cache: LocationCache,
    queued: Vec<LocationRecord>,
}

impl Editor {
    /// Queues an insert-or-replace keyed by BSSID. Records without a BSSID
    /// (fused outputs) are skipped.
    pub fn put(&mut self, record: LocationRecord) {
        if record.bssid.is_none() {
            return;
        }
        self.queued.push(record);
    }

    /// Applies every queued put atomically. A failure rolls the whole batch
    /// back.
    pub async fn commit(self) -> Result<()> {
        let Editor { cache, queued } = self;
        if queued.is_empty() {
            return Ok(());
        }

        cache
            .execute(move |conn| {
                let tx = conn.transaction()?;
                for record in &queued {
                    tx.execute(
                        "INSERT OR REPLACE INTO location
                         (mac, provider, latitude, longitude, altitude, accuracy, time, verified)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            record.bssid,
                            record.provider,
                            record.latitude,
                            record.longitude,
                            record.altitude,
                            record.accuracy,
                            record.observed_at_ms,
                            record.verified_at_ms,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }
}
