//! EventLog — redb-backed append-only log of transition events.
//!
//! Events are JSON-serialized into redb's `&[u8]` value column under a
//! monotonically increasing `u64` sequence key. The log supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::tables::EVENTS;
use crate::types::TransitionEvent;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A persisted event with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: TransitionEvent,
}

/// Durable transition event log. Cheap to clone.
#[derive(Clone)]
pub struct EventLog {
    db: Arc<Database>,
}

impl EventLog {
    /// Open (or create) a persistent event log at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let log = Self { db: Arc::new(db) };
        log.ensure_tables()?;
        debug!(?path, "event log opened");
        Ok(log)
    }

    /// Create an ephemeral in-memory event log (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let log = Self { db: Arc::new(db) };
        log.ensure_tables()?;
        debug!("in-memory event log opened");
        Ok(log)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Append an event. Returns its sequence number.
    pub fn append(&self, event: &TransitionEvent) -> StateResult<u64> {
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            seq = match table.last().map_err(map_err!(Read))? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            table
                .insert(seq, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(seq)
    }

    /// All events in append order.
    pub fn list(&self) -> StateResult<Vec<TransitionEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: TransitionEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        Ok(results)
    }

    /// Up to `limit` events with a sequence number greater than `after`
    /// (or from the start), in append order.
    pub fn list_page(&self, after: Option<u64>, limit: usize) -> StateResult<Vec<LoggedEvent>> {
        let start = match after {
            Some(seq) => match seq.checked_add(1) {
                Some(next) => next,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(start..).map_err(map_err!(Read))?.take(limit) {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let event: TransitionEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(LoggedEvent {
                seq: key.value(),
                event,
            });
        }
        Ok(results)
    }

    pub fn len(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist events from a `ChannelSink` receiver until every sender is gone.
    ///
    /// Write failures are logged and the event is dropped.
    pub async fn drain(&self, mut rx: mpsc::UnboundedReceiver<TransitionEvent>) {
        info!("event log writer started");
        while let Some(event) = rx.recv().await {
            match self.append(&event) {
                Ok(seq) => debug!(seq, host = %event.hostname, "event persisted"),
                Err(e) => warn!(error = %e, host = %event.hostname, "failed to persist event"),
            }
        }
        info!("event log writer stopped");
    }
}
