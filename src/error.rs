//! Error types for store-backed operations
//!
//! Presence and proximity have their own (tiny) error type in
//! [`crate::presence::PresenceError`]; everything that touches the database or
//! validates client input reports an [`Error`].

use rusqlite::ErrorCode;

/// Failures reported by the persistent store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    /// A batch statement touched a different number of rows than were
    /// selected in the same transaction (lost update or vanished row).
    #[error("{operation} affected {actual} rows, expected {expected}")]
    RowCountMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Crate-wide error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Concurrent update conflict: {0}")]
    Concurrency(String),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Error::Concurrency(err.to_string())
            }
            _ => Error::Store(StoreError::Sqlite(err)),
        }
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Fail unless a statement touched exactly `expected` rows.
    pub fn expect_rows(operation: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(StoreError::RowCountMismatch {
                operation,
                expected,
                actual,
            }
            .into())
        }
    }
}
