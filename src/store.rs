// SQLite-backed document store with revisioned paths and change
// subscriptions. League state lives here as JSON documents keyed by
// slash-separated paths, so callers read and write whole subtrees.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Storage failures surfaced to callers. `Conflict` uses revision 0 to mean
/// "document absent".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("no document at {path}")]
    NotFound { path: String },

    #[error("malformed document at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("revision conflict at {path}: expected {expected}, found {found}")]
    Conflict { path: String, expected: u64, found: u64 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// One write within an atomic commit.
#[derive(Debug, Clone)]
pub struct Write {
    pub path: String,
    pub value: Value,
}

impl Write {
    pub fn put(path: impl Into<String>, value: impl Serialize) -> Result<Self, StoreError> {
        let path = path.into();
        let value = encode(&path, &value)?;
        Ok(Write { path, value })
    }
}

/// A document change fanned out to subscribers. `value = None` means the
/// document was deleted.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: String,
    pub value: Option<Value>,
}

/// A prefix-filtered change feed, in the manner of a realtime database
/// listener on a subtree.
pub struct Subscription {
    prefix: String,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// The next change under this subscription's prefix, or `None` once the
    /// store is gone. A slow consumer that lags the channel skips the missed
    /// events and keeps going; consumers re-read current state on each event
    /// rather than replaying deltas, so skips are safe.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.path.starts_with(&self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Document storage behind the session controller. Implementations must be
/// safe to share across tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the document at `path`, or `None` if absent.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Read a document together with its revision counter.
    async fn get_versioned(&self, path: &str) -> Result<Option<(Value, u64)>, StoreError>;

    /// Unconditional last-writer-wins upsert.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Compare-and-set: write only if the stored revision still equals
    /// `expected` (0 for "must not exist"). Returns the new revision.
    async fn set_if_revision(
        &self,
        path: &str,
        expected: u64,
        value: Value,
    ) -> Result<u64, StoreError>;

    /// Apply all writes in one transaction; either every document lands or
    /// none do.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Remove the document at `path`. Deleting an absent path is a no-op.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// All documents whose path starts with `prefix`, ordered by path.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Subscribe to changes under `prefix`.
    fn subscribe(&self, prefix: &str) -> Subscription;
}

/// Decode a stored document into a typed record, reporting malformed
/// payloads as schema errors instead of propagating missing fields.
pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|err| StoreError::Schema {
        path: path.to_string(),
        message: err.to_string(),
    })
}

pub fn encode(path: &str, value: &impl Serialize) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::Schema {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Read a document that is required to exist.
pub async fn fetch<T: DeserializeOwned>(store: &dyn Store, path: &str) -> Result<T, StoreError> {
    let value = store.get(path).await?.ok_or_else(|| StoreError::NotFound {
        path: path.to_string(),
    })?;
    decode(path, value)
}

/// Canonical document paths. Leagues each own a subtree; accounts are
/// global.
pub mod paths {
    pub fn league_meta(league_id: &str) -> String {
        format!("leagues/{league_id}/meta")
    }

    pub fn league_players(league_id: &str) -> String {
        format!("leagues/{league_id}/players")
    }

    pub fn league_standings(league_id: &str) -> String {
        format!("leagues/{league_id}/standings")
    }

    pub fn league_matches(league_id: &str) -> String {
        format!("leagues/{league_id}/matches")
    }

    pub fn league_rules(league_id: &str) -> String {
        format!("leagues/{league_id}/scoringRules")
    }

    pub fn league_user(league_id: &str, username: &str) -> String {
        format!("leagues/{league_id}/users/{username}")
    }

    pub fn league_users_prefix(league_id: &str) -> String {
        format!("leagues/{league_id}/users/")
    }

    pub fn league_prefix(league_id: &str) -> String {
        format!("leagues/{league_id}/")
    }

    pub fn account(username: &str) -> String {
        format!("accounts/{username}")
    }
}

/// SQLite implementation: one `documents` table of path, JSON value, and a
/// monotonically increasing per-document revision.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    events: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    /// Open (or create) the store at `path` and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                path     TEXT PRIMARY KEY,
                value    TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 1
            );
            ",
        )?;

        let (events, _) = broadcast::channel(256);
        Ok(Self {
            conn: Mutex::new(conn),
            events,
        })
    }

    /// An ephemeral in-memory store, useful for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn emit(&self, path: &str, value: Option<Value>) {
        // No receivers is fine; subscriptions are optional.
        let _ = self.events.send(ChangeEvent {
            path: path.to_string(),
            value,
        });
    }

    fn upsert(conn: &Connection, path: &str, value: &Value) -> Result<(), StoreError> {
        let json = value.to_string();
        conn.execute(
            "INSERT INTO documents (path, value, revision) VALUES (?1, ?2, 1)
             ON CONFLICT(path) DO UPDATE SET value = ?2, revision = revision + 1",
            params![path, json],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get_versioned(path).await?.map(|(value, _)| value))
    }

    async fn get_versioned(&self, path: &str) -> Result<Option<(Value, u64)>, StoreError> {
        let conn = self.conn();
        let row: Option<(String, u64)> = conn
            .query_row(
                "SELECT value, revision FROM documents WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((json, revision)) => {
                let value: Value =
                    serde_json::from_str(&json).map_err(|err| StoreError::Schema {
                        path: path.to_string(),
                        message: err.to_string(),
                    })?;
                Ok(Some((value, revision)))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        {
            let conn = self.conn();
            Self::upsert(&conn, path, &value)?;
        }
        self.emit(path, Some(value));
        Ok(())
    }

    async fn set_if_revision(
        &self,
        path: &str,
        expected: u64,
        value: Value,
    ) -> Result<u64, StoreError> {
        let new_revision;
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let found: u64 = tx
                .query_row(
                    "SELECT revision FROM documents WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            if found != expected {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                    expected,
                    found,
                });
            }
            Self::upsert(&tx, path, &value)?;
            tx.commit()?;
            new_revision = expected + 1;
        }
        self.emit(path, Some(value));
        Ok(new_revision)
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            for write in &writes {
                Self::upsert(&tx, &write.path, &write.value)?;
            }
            tx.commit()?;
        }
        for write in writes {
            self.emit(&write.path, Some(write.value));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let removed;
        {
            let conn = self.conn();
            removed = conn.execute("DELETE FROM documents WHERE path = ?1", params![path])?;
        }
        if removed > 0 {
            self.emit(path, None);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT path, value FROM documents WHERE path >= ?1 AND path < ?2 ORDER BY path",
        )?;
        // Half-open range scan: everything starting with the prefix.
        let upper = format!("{prefix}\u{10FFFF}");
        let rows = stmt
            .query_map(params![prefix, upper], |row| {
                let path: String = row.get(0)?;
                let json: String = row.get(1)?;
                Ok((path, json))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(path, json)| {
                let value = serde_json::from_str(&json).map_err(|err| StoreError::Schema {
                    path: path.clone(),
                    message: err.to_string(),
                })?;
                Ok((path, value))
            })
            .collect()
    }

    fn subscribe(&self, prefix: &str) -> Subscription {
        Subscription {
            prefix: prefix.to_string(),
            rx: self.events.subscribe(),
        }
    }
}
