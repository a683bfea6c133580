//! SQLite storage layer.
//!
//! One database file per tenant. Channels are rows of `channels` carrying a
//! persisted item counter; items live in a `WITHOUT ROWID` table clustered on
//! `(channel, id)`, so the first row of a channel is the smallest id in byte
//! order. Usage counters live in their own `stats` table.
//!
//! The connection runs in exclusive locking mode and writes during open, so
//! it holds the file lock until it is closed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};

use crate::error::{Error, Result};
use crate::model::STATS_NAMESPACE;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key     TEXT PRIMARY KEY,
        value   TEXT NOT NULL
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS channels (
        name        TEXT PRIMARY KEY,
        item_count  INTEGER NOT NULL DEFAULT 0
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS items (
        channel     TEXT NOT NULL,
        id          TEXT NOT NULL,
        payload     TEXT,
        PRIMARY KEY (channel, id)
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS stats (
        key     TEXT PRIMARY KEY,
        value   INTEGER NOT NULL DEFAULT 0
    ) WITHOUT ROWID;
";

/// A raw row popped from a channel: id and JSON payload text.
pub(crate) type RawItem = (String, Option<String>);

/// Open `path`, take the exclusive file lock and create the schema.
pub(crate) fn open_exclusive(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    init(&mut conn).map_err(|e| match e {
        Error::Storage(ref err) if is_busy(err) => Error::Locked(path.to_path_buf()),
        other => other,
    })?;
    Ok(conn)
}

/// Open a private in-memory database (for testing).
pub(crate) fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    init(&mut conn)?;
    Ok(conn)
}

fn init(conn: &mut Connection) -> Result<()> {
    // Fail immediately on contention instead of waiting for the holder.
    conn.busy_timeout(Duration::ZERO)?;
    // Both pragmas answer with the resulting mode.
    conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update_and_check(None, "journal_mode", "TRUNCATE", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update(None, "synchronous", "FULL")?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
    tx.execute_batch(SCHEMA)?;
    // Always write, so the exclusive lock is taken even when the schema exists.
    tx.execute(
        "INSERT INTO meta (key, value) VALUES ('opened_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    Ok(())
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Execute a closure within an immediate (write-locked) transaction.
///
/// Commits if the closure returns Ok, rolls back on Err.
pub(crate) fn with_transaction<F, T>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&mut TxContext) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut ctx = TxContext { tx: &tx };
    let result = f(&mut ctx)?;
    tx.commit()?;
    Ok(result)
}

/// Handle for the write operations of one transaction.
pub(crate) struct TxContext<'a> {
    tx: &'a Connection,
}

impl TxContext<'_> {
    /// Insert or overwrite an item, creating the channel if needed.
    /// Returns true when the id was not present before.
    pub fn upsert_item(&self, channel: &str, id: &str, payload: Option<&str>) -> Result<bool> {
        self.tx.execute(
            "INSERT INTO channels (name, item_count) VALUES (?1, 0)
             ON CONFLICT(name) DO NOTHING",
            params![channel],
        )?;

        let existed: bool = self.tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE channel = ?1 AND id = ?2)",
            params![channel, id],
            |row| row.get(0),
        )?;

        self.tx.execute(
            "INSERT INTO items (channel, id, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(channel, id) DO UPDATE SET payload = excluded.payload",
            params![channel, id, payload],
        )?;

        if !existed {
            self.adjust_count(channel, 1)?;
        }
        Ok(!existed)
    }

    /// Remove and return up to `limit` items in key order.
    pub fn take_first(&self, channel: &str, limit: usize) -> Result<Vec<RawItem>> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT id, payload FROM items WHERE channel = ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![channel, limit], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<RawItem>, _>>()?;

        if rows.is_empty() {
            return Ok(rows);
        }

        let mut delete = self
            .tx
            .prepare_cached("DELETE FROM items WHERE channel = ?1 AND id = ?2")?;
        for (id, _) in &rows {
            delete.execute(params![channel, id])?;
        }
        self.adjust_count(channel, -(rows.len() as i64))?;
        Ok(rows)
    }

    /// Drop a channel and its items. Returns the number of items removed.
    pub fn delete_channel(&self, channel: &str) -> Result<u64> {
        let removed = self
            .tx
            .execute("DELETE FROM items WHERE channel = ?1", params![channel])?;
        self.tx
            .execute("DELETE FROM channels WHERE name = ?1", params![channel])?;
        Ok(removed as u64)
    }

    /// Atomically add `by` to a persisted counter.
    pub fn increment_stat(&self, key: &str, by: u64) -> Result<()> {
        self.tx.execute(
            "INSERT INTO stats (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = value + excluded.value",
            params![key, i64::try_from(by).unwrap_or(i64::MAX)],
        )?;
        Ok(())
    }

    fn adjust_count(&self, channel: &str, delta: i64) -> Result<()> {
        self.tx.execute(
            "UPDATE channels SET item_count = item_count + ?2 WHERE name = ?1",
            params![channel, delta],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read-only queries. Each is a single statement, so it sees one snapshot.
// ---------------------------------------------------------------------------

pub(crate) fn count_on(conn: &Connection, channel: &str) -> Result<u64> {
    let count: Option<i64> = conn
        .query_row(
            "SELECT item_count FROM channels WHERE name = ?1",
            params![channel],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count.unwrap_or(0) as u64)
}

pub(crate) fn list_channels_on(conn: &Connection) -> Result<BTreeSet<String>> {
    Ok(list_channels_with_count_on(conn)?.into_keys().collect())
}

/// Every channel with its item count; the stats namespace maps to its number
/// of counter keys and appears only once a counter exists.
pub(crate) fn list_channels_with_count_on(conn: &Connection) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, item_count FROM channels
         UNION ALL
         SELECT ?1, COUNT(*) FROM stats HAVING COUNT(*) > 0",
    )?;
    let channels = stmt
        .query_map(params![STATS_NAMESPACE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
    Ok(channels)
}

pub(crate) fn stats_on(conn: &Connection) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare_cached("SELECT key, value FROM stats ORDER BY key")?;
    let stats = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
    Ok(stats)
}
