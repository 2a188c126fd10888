//! SQLite persistence and the transaction boundary
//!
//! One connection behind an async mutex. Every mutation runs inside
//! [`Database::transaction`], which opens `BEGIN IMMEDIATE` so concurrent
//! writers are serialized and no two syncs can claim the same rows.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    about_me TEXT NOT NULL DEFAULT '',
    age INTEGER NOT NULL,
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_user_id INTEGER NOT NULL,
    to_user_id INTEGER NOT NULL,
    contents TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('undelivered', 'delivered', 'failed'))
);

CREATE INDEX IF NOT EXISTS messages_inbox ON messages (to_user_id, status);
CREATE INDEX IF NOT EXISTS messages_outbox ON messages (from_user_id, status);
";

const DROP_SCHEMA: &str = "
DROP INDEX IF EXISTS messages_outbox;
DROP INDEX IF EXISTS messages_inbox;
DROP TABLE IF EXISTS messages;
DROP TABLE IF EXISTS users;
DELETE FROM sqlite_sequence;
";

/// Owner of the SQLite connection
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Internal(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;
        // WAL lets readers proceed while a sync holds the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(busy_timeout)?;

        let db = Self::init(conn)?;
        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` in one transaction: commit on `Ok`, roll back on `Err`.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// [`transaction`](Self::transaction), retried once on a lock conflict.
    pub async fn transaction_with_retry<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&Transaction<'_>) -> Result<T>,
    {
        match self.transaction(&f).await {
            Err(Error::Concurrency(reason)) => {
                warn!(%reason, "Transaction conflicted, retrying once");
                self.transaction(&f).await
            }
            other => other,
        }
    }

    /// Read-only access outside an explicit transaction.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Drop every table and recreate an empty schema.
    pub async fn reset(&self) -> Result<()> {
        self.transaction(|tx| {
            tx.execute_batch(DROP_SCHEMA)?;
            tx.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        warn!("Database reset to an empty schema");
        Ok(())
    }
}

/// Encode ids for a `IN (SELECT value FROM json_each(?))` parameter.
pub(crate) fn id_set(ids: &[i64]) -> Result<String> {
    serde_json::to_string(ids).map_err(|e| Error::Internal(format!("encoding id set: {e}")))
}
