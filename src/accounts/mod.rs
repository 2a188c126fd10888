//! User accounts
//!
//! Just enough of an account system to own user ids: registration,
//! password login, profile lookup for search results, and removal (which
//! settles the user's pending messages).

pub mod password;
pub mod validation;

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::messages::{MarkFailedOutcome, MessageStore};
use crate::store::{id_set, Database};
use crate::types::UserId;

pub use password::{hash_password, hash_password_task, verify_password, verify_password_task};

/// Public view of a user, returned by search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub username: String,
    pub about_me: String,
    pub age: i64,
}

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub about_me: String,
    pub age: i64,
    pub email: String,
}

/// A validated registration whose password is already hashed
#[derive(Debug, Clone)]
pub struct PreparedAccount {
    username: String,
    password_hash: String,
    about_me: String,
    age: i64,
    email: String,
}

impl PreparedAccount {
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Account operations over the caller's connection or transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct Accounts;

impl Accounts {
    /// Validate a registration and hash its password on the blocking pool.
    ///
    /// Runs before any transaction so hashing never holds the database.
    pub async fn prepare(&self, account: NewAccount) -> Result<PreparedAccount> {
        validation::validate_username(&account.username)?;
        validation::validate_password(&account.password)?;
        validation::validate_age(account.age)?;
        validation::validate_email(&account.email)?;

        let password_hash = hash_password_task(account.password).await?;
        Ok(PreparedAccount {
            username: account.username,
            password_hash,
            about_me: account.about_me,
            age: account.age,
            email: account.email,
        })
    }

    /// Create an account and return its id.
    pub fn register(&self, tx: &Transaction<'_>, account: &PreparedAccount) -> Result<UserId> {
        let taken = tx
            .prepare_cached("SELECT 1 FROM users WHERE username = ?1")?
            .exists(params![account.username])?;
        if taken {
            return Err(Error::validation(format!(
                "username {} is already taken",
                account.username
            )));
        }

        tx.prepare_cached(
            "INSERT INTO users (username, password_hash, about_me, age, email)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![
            account.username,
            account.password_hash,
            account.about_me,
            account.age,
            account.email
        ])?;

        let user_id = tx.last_insert_rowid();
        info!(user_id, username = %account.username, "Account registered");
        Ok(user_id)
    }

    /// Stored id and password hash for `username`.
    pub fn credentials(
        &self,
        conn: &Connection,
        username: &str,
    ) -> Result<Option<(UserId, String)>> {
        Ok(conn
            .prepare_cached("SELECT user_id, password_hash FROM users WHERE username = ?1")?
            .query_row(params![username], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?)
    }

    /// Resolve credentials to a user id. Unknown user and wrong password
    /// are indistinguishable to the caller.
    ///
    /// The database is held only for the lookup; the hash is checked on the
    /// blocking pool after the connection is released.
    pub async fn authenticate(
        &self,
        db: &Database,
        username: &str,
        password: &str,
    ) -> Result<UserId> {
        let credentials = db.read(|conn| self.credentials(conn, username)).await?;
        let Some((user_id, hash)) = credentials else {
            return Err(Error::Unauthorized);
        };

        if verify_password_task(password.to_owned(), hash).await? {
            Ok(user_id)
        } else {
            Err(Error::Unauthorized)
        }
    }

    pub fn exists(&self, conn: &Connection, user: UserId) -> Result<bool> {
        Ok(conn
            .prepare_cached("SELECT 1 FROM users WHERE user_id = ?1")?
            .exists(params![user])?)
    }

    /// Profiles for `ids`, in the same order. Unknown ids are skipped.
    pub fn profiles(&self, conn: &Connection, ids: &[UserId]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<UserId, Profile> = conn
            .prepare_cached(
                "SELECT user_id, username, about_me, age FROM users
                 WHERE user_id IN (SELECT value FROM json_each(?1))",
            )?
            .query_map(params![id_set(ids)?], |row| {
                Ok(Profile {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    about_me: row.get(2)?,
                    age: row.get(3)?,
                })
            })?
            .map(|p| p.map(|p| (p.user_id, p)))
            .collect::<rusqlite::Result<_>>()?;

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Delete the account and settle its messages in the same transaction.
    pub fn remove(
        &self,
        tx: &Transaction<'_>,
        user: UserId,
        messages: &MessageStore,
    ) -> Result<MarkFailedOutcome> {
        let deleted = tx
            .prepare_cached("DELETE FROM users WHERE user_id = ?1")?
            .execute(params![user])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("user {user}")));
        }

        let outcome = messages.mark_failed(tx, user)?;
        info!(user_id = user, "Account removed");
        Ok(outcome)
    }
}
