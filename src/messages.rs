//! Message delivery state machine
//!
//! ```text
//! send ──> Undelivered ──(recipient syncs)──> Delivered ──(sender syncs)──> removed
//!               │
//!               └──(recipient removed)──> Failed ──(sender syncs)──> removed
//! ```
//!
//! Every operation runs inside the caller's transaction, so a failed sync
//! rolls back in full and the rows stay claimable by the next one.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Row, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::id_set;
use crate::types::{MessageId, UserId};

/// Default upper bound on message length, in characters
pub const DEFAULT_MAX_CONTENTS_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Undelivered,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Undelivered => "undelivered",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "undelivered" => Ok(MessageStatus::Undelivered),
            "delivered" => Ok(MessageStatus::Delivered),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("unknown message status {other:?}")),
        }
    }
}

impl ToSql for MessageStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub contents: String,
    pub status: MessageStatus,
}

impl Message {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            message_id: row.get(0)?,
            from_user_id: row.get(1)?,
            to_user_id: row.get(2)?,
            contents: row.get(3)?,
            status: row.get(4)?,
        })
    }
}

/// What one sync call hands back to the client. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Messages addressed to the caller, now marked delivered
    pub received: Vec<Message>,
    /// Ids of the caller's messages that reached their recipient
    pub delivered: Vec<MessageId>,
    /// Ids of the caller's messages whose recipient went away first
    pub failed: Vec<MessageId>,
}

impl SyncResult {
    pub fn is_empty(&self) -> bool {
        self.received.is_empty() && self.delivered.is_empty() && self.failed.is_empty()
    }
}

/// Row counts touched by [`MessageStore::mark_failed`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkFailedOutcome {
    /// Undelivered messages to the user, now failed
    pub failed: usize,
    /// Messages from the user, deleted in any state
    pub discarded: usize,
}

/// Message records and their status transitions
#[derive(Debug, Clone)]
pub struct MessageStore {
    max_contents_len: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENTS_LEN)
    }
}

impl MessageStore {
    pub fn new(max_contents_len: usize) -> Self {
        Self { max_contents_len }
    }

    pub fn max_contents_len(&self) -> usize {
        self.max_contents_len
    }

    /// Store a new undelivered message and return its id.
    pub fn send(
        &self,
        tx: &Transaction<'_>,
        from: UserId,
        to: UserId,
        contents: &str,
    ) -> Result<MessageId> {
        if contents.trim().is_empty() {
            return Err(Error::validation("message contents must not be blank"));
        }
        let len = contents.chars().count();
        if len > self.max_contents_len {
            return Err(Error::validation(format!(
                "message is {len} characters, limit is {}",
                self.max_contents_len
            )));
        }
        if from == to {
            return Err(Error::validation("cannot send a message to yourself"));
        }

        tx.prepare_cached(
            "INSERT INTO messages (from_user_id, to_user_id, contents, status)
             VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![from, to, contents, MessageStatus::Undelivered])?;

        let id = tx.last_insert_rowid();
        debug!(message_id = id, from, to, "Message queued");
        Ok(id)
    }

    /// Drain the caller's inbox and collect outcomes of the caller's sends.
    ///
    /// Received messages move to Delivered; reported delivered/failed rows
    /// are deleted, so each outcome reaches the sender exactly once. Does
    /// not write when nothing is pending.
    pub fn sync_inbox(&self, tx: &Transaction<'_>, user: UserId) -> Result<SyncResult> {
        let mut result = SyncResult::default();

        let mut received = tx
            .prepare_cached(
                "SELECT message_id, from_user_id, to_user_id, contents, status
                 FROM messages
                 WHERE to_user_id = ?1 AND status = ?2
                 ORDER BY message_id",
            )?
            .query_map(params![user, MessageStatus::Undelivered], Message::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if !received.is_empty() {
            let ids: Vec<MessageId> = received.iter().map(|m| m.message_id).collect();
            let updated = tx
                .prepare_cached(
                    "UPDATE messages SET status = ?1
                     WHERE status = ?2 AND message_id IN (SELECT value FROM json_each(?3))",
                )?
                .execute(params![
                    MessageStatus::Delivered,
                    MessageStatus::Undelivered,
                    id_set(&ids)?
                ])?;
            Error::expect_rows("mark delivered", ids.len(), updated)?;

            for message in &mut received {
                message.status = MessageStatus::Delivered;
            }
        }
        result.received = received;

        let outcomes = tx
            .prepare_cached(
                "SELECT message_id, status FROM messages
                 WHERE from_user_id = ?1 AND status IN (?2, ?3)
                 ORDER BY message_id",
            )?
            .query_map(
                params![user, MessageStatus::Delivered, MessageStatus::Failed],
                |row| Ok((row.get::<_, MessageId>(0)?, row.get::<_, MessageStatus>(1)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if !outcomes.is_empty() {
            let ids: Vec<MessageId> = outcomes.iter().map(|(id, _)| *id).collect();
            let deleted = tx
                .prepare_cached(
                    "DELETE FROM messages
                     WHERE status IN (?1, ?2) AND message_id IN (SELECT value FROM json_each(?3))",
                )?
                .execute(params![
                    MessageStatus::Delivered,
                    MessageStatus::Failed,
                    id_set(&ids)?
                ])?;
            Error::expect_rows("delete reported", ids.len(), deleted)?;

            for (id, status) in outcomes {
                match status {
                    MessageStatus::Failed => result.failed.push(id),
                    _ => result.delivered.push(id),
                }
            }
        }

        debug!(
            user_id = user,
            received = result.received.len(),
            delivered = result.delivered.len(),
            failed = result.failed.len(),
            "Inbox synced"
        );
        Ok(result)
    }

    /// Settle a departing user's messages.
    ///
    /// Undelivered messages to `user` become Failed so their senders learn
    /// of it on their next sync. Everything `user` sent is deleted.
    pub fn mark_failed(&self, tx: &Transaction<'_>, user: UserId) -> Result<MarkFailedOutcome> {
        let failed = tx
            .prepare_cached(
                "UPDATE messages SET status = ?1 WHERE to_user_id = ?2 AND status = ?3",
            )?
            .execute(params![
                MessageStatus::Failed,
                user,
                MessageStatus::Undelivered
            ])?;

        let discarded = tx
            .prepare_cached("DELETE FROM messages WHERE from_user_id = ?1")?
            .execute(params![user])?;

        info!(user_id = user, failed, discarded, "Messages settled for removed user");
        Ok(MarkFailedOutcome { failed, discarded })
    }
}
