mod capacity;
mod error;
mod mutations;
mod queries;
mod store;
mod validate;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use store::Store;

// ── WAL writer task ──────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Background task that owns the WAL file. Every append is fsynced before the
/// caller hears back.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let start = std::time::Instant::now();
                let result = wal.append(&event);
                metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
                let _ = response.send(result);
            }
            WalCommand::Rewrite { events, response } => {
                let _ = response.send(wal.rewrite(&events));
            }
        }
    }
}

/// The hotel-parking core: one store, one writer lock, one WAL.
///
/// Every mutation holds the write lock from its first check until the event is
/// applied, so check-then-insert sequences (capacity, plate uniqueness) cannot
/// interleave. Readers take the shared lock and see whole mutations only.
pub struct Engine {
    pub(super) store: RwLock<Store>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    compact_threshold: u64,
    appends_since_compact: AtomicU64,
}

impl Engine {
    /// Open the engine backed by the WAL at `wal_path`, replaying it first.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf, compact_threshold: u64) -> io::Result<Self> {
        Self::with_clock(wal_path, compact_threshold, Arc::new(SystemClock))
    }

    pub fn with_clock(
        wal_path: PathBuf,
        compact_threshold: u64,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.torn_tail {
            warn!(
                path = %wal_path.display(),
                valid_len = replay.valid_len,
                "WAL has a torn tail; truncating to last good record"
            );
        }
        let wal = Wal::open(&wal_path, &replay)?;

        // Every record passed `check` when it was written, so a failure here
        // means the log does not describe a reachable state.
        let mut store = Store::new();
        for (index, event) in replay.events.iter().enumerate() {
            if let Err(e) = store.check(event) {
                error!(?event, index, error = %e, "replay: WAL record does not apply");
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("WAL record {index} does not apply: {e}"),
                ));
            }
            store.apply(event);
        }
        info!(
            path = %wal_path.display(),
            events = replay.events.len(),
            cities = store.len(EntityKind::City),
            hotels = store.len(EntityKind::Hotel),
            garages = store.len(EntityKind::Garage),
            cars = store.len(EntityKind::Car),
            "engine ready"
        );

        let (wal_tx, wal_rx) = mpsc::channel(1024);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store: RwLock::new(store),
            wal_tx,
            clock,
            compact_threshold,
            appends_since_compact: AtomicU64::new(replay.events.len() as u64),
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    async fn wal_rewrite(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Rewrite {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Check, persist, apply. The caller holds the write guard that `store`
    /// borrows from.
    pub(super) async fn commit(&self, store: &mut Store, event: Event) -> Result<(), EngineError> {
        store.check(&event)?;
        self.wal_append(&event).await?;
        store.apply(&event);

        let appends = self.appends_since_compact.fetch_add(1, Ordering::Relaxed) + 1;
        if self.compact_threshold > 0 && appends >= self.compact_threshold {
            // The mutation is already durable; a failed compaction only leaves
            // the log longer than it needs to be.
            if let Err(e) = self.compact_locked(store).await {
                warn!(error = %e, "WAL compaction failed");
            }
        }
        Ok(())
    }

    async fn compact_locked(&self, store: &Store) -> Result<(), EngineError> {
        let events = store.snapshot();
        let len = events.len();
        self.wal_rewrite(events).await?;
        self.appends_since_compact.store(0, Ordering::Relaxed);
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = len, "WAL compacted");
        Ok(())
    }

    /// Rewrite the WAL as the minimal event list for the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Shared lock: no mutation can append while the snapshot is written.
        let store = self.store.read().await;
        self.compact_locked(&store).await
    }

    /// Events appended since the last compaction (or since startup, counting
    /// replayed events).
    pub fn wal_appends_since_compact(&self) -> u64 {
        self.appends_since_compact.load(Ordering::Relaxed)
    }
}
