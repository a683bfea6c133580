//! Storage engine for one tenant.
//!
//! The engine owns the tenant's database connection and enforces all queue
//! invariants. Every mutation runs in exactly one transaction; pops select
//! and delete in the same transaction, so an id is handed out at most once
//! per push. The engine does not log and does not retry.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::{Payload, STATS_NAMESPACE, StatOp, WorkItem};
use crate::storage::{self, RawItem, TxContext};

/// Durable queue store over one database file, generic over the payload type.
pub struct Engine<P = Payload> {
    /// `None` once closed.
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> std::fmt::Debug for Engine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path)
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

impl<P> Engine<P>
where
    P: Serialize + DeserializeOwned,
{
    /// Open or create the database at `path`.
    ///
    /// Fails with [`Error::Locked`] if another handle holds the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = storage::open_exclusive(path)?;
        Ok(Self::from_conn(conn, Some(path.to_path_buf())))
    }

    /// Create an engine over an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_conn(storage::open_in_memory()?, None))
    }

    fn from_conn(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            path,
            _payload: PhantomData,
        }
    }

    /// Backing file, `None` for in-memory engines.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Release the handle and its file lock. Idempotent.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| Error::Storage(e))
    }

    /// Insert or overwrite `id` in `channel`.
    ///
    /// Creates the channel if absent and bumps its `push` counter in the same
    /// transaction. Overwriting an existing id replaces the payload silently.
    pub fn push(&self, channel: &str, id: &str, payload: Option<&P>) -> Result<()> {
        validate_channel(channel)?;
        if id.is_empty() {
            return Err(Error::Validation("work id cannot be empty".into()));
        }
        let encoded = payload.map(serde_json::to_string).transpose()?;

        self.with_transaction(|tx| {
            tx.upsert_item(channel, id, encoded.as_deref())?;
            tx.increment_stat(&StatOp::Push.key(channel), 1)
        })
    }

    /// Remove and return the smallest id of `channel`, or `None` if the
    /// channel is absent or empty.
    pub fn pop(&self, channel: &str) -> Result<Option<WorkItem<P>>> {
        Ok(self.pop_many(channel, 1)?.into_iter().next())
    }

    /// Remove and return up to `n` items in key order. Returns fewer when the
    /// channel runs out; `n == 0` is treated as 1.
    pub fn pop_many(&self, channel: &str, n: usize) -> Result<Vec<WorkItem<P>>> {
        validate_channel(channel)?;
        let n = n.max(1);

        self.with_transaction(|tx| {
            let raw = tx.take_first(channel, n)?;
            if raw.is_empty() {
                return Ok(Vec::new());
            }
            // Decode before commit: a bad payload rolls the whole pop back.
            let items = raw.into_iter().map(decode).collect::<Result<Vec<_>>>()?;
            tx.increment_stat(&StatOp::Pop.key(channel), items.len() as u64)?;
            Ok(items)
        })
    }

    /// Number of pending ids; 0 if the channel does not exist.
    pub fn count(&self, channel: &str) -> Result<u64> {
        validate_channel(channel)?;
        self.with_conn(|conn| storage::count_on(conn, channel))
    }

    /// Delete the channel and all pending items. No-op if absent.
    pub fn reset_channel(&self, channel: &str) -> Result<()> {
        validate_channel(channel)?;
        self.with_transaction(|tx| tx.delete_channel(channel).map(|_| ()))
    }

    /// Names of all channels, including the stats namespace once a counter
    /// exists. Callers filter [`STATS_NAMESPACE`] themselves.
    pub fn list_channels(&self) -> Result<BTreeSet<String>> {
        self.with_conn(storage::list_channels_on)
    }

    /// Channel name to current item count, for every existing channel.
    pub fn list_channels_with_count(&self) -> Result<BTreeMap<String, u64>> {
        self.with_conn(storage::list_channels_with_count_on)
    }

    /// All usage counters, keyed `<channel>:<op>`.
    pub fn stats(&self) -> Result<BTreeMap<String, u64>> {
        self.with_conn(storage::stats_on)
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(Error::NotOpen)?;
        f(conn)
    }

    fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext) -> Result<T>,
    {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(Error::NotOpen)?;
        storage::with_transaction(conn, f)
    }
}

impl<P> Drop for Engine<P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            let _ = conn.close();
        }
    }
}

fn validate_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(Error::Validation("channel cannot be empty".into()));
    }
    if channel == STATS_NAMESPACE {
        return Err(Error::Validation(format!(
            "channel name {STATS_NAMESPACE} is reserved"
        )));
    }
    Ok(())
}

fn decode<P: DeserializeOwned>((id, payload): RawItem) -> Result<WorkItem<P>> {
    let payload = payload
        .map(|json| serde_json::from_str(&json))
        .transpose()?;
    Ok(WorkItem { id, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn reserved_channel_is_rejected() {
        let engine: Engine = Engine::in_memory().unwrap();
        let err = engine.push(STATS_NAMESPACE, "a", None).unwrap_err();
        assert!(err.is_permanent());
        assert!(engine.pop(STATS_NAMESPACE).unwrap_err().is_permanent());
        assert!(engine.reset_channel(STATS_NAMESPACE).unwrap_err().is_permanent());
    }

    #[test]
    fn empty_channel_is_rejected() {
        let engine: Engine = Engine::in_memory().unwrap();
        assert!(matches!(
            engine.push("", "a", None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(engine.count(""), Err(Error::Validation(_))));
    }

    #[test]
    fn undecodable_payload_leaves_item_in_place() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Job {
            x: u32,
        }

        let raw: Engine = Engine::in_memory().unwrap();
        raw.push("jobs", "a", Some(&json!({"y": "not a job"}))).unwrap();

        // Reinterpret the same connection with a stricter payload type.
        let conn = raw.conn.lock().take().unwrap();
        let typed: Engine<Job> = Engine::from_conn(conn, None);

        let err = typed.pop("jobs").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert_eq!(typed.count("jobs").unwrap(), 1);
        assert!(!typed.stats().unwrap().contains_key("jobs:pop"));
    }

    #[test]
    fn closed_engine_reports_not_open() {
        let engine: Engine = Engine::in_memory().unwrap();
        engine.close().unwrap();
        engine.close().unwrap();

        assert!(!engine.is_open());
        assert!(matches!(engine.count("jobs"), Err(Error::NotOpen)));
        assert!(matches!(engine.pop("jobs"), Err(Error::NotOpen)));
    }
}
