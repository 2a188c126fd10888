//! Shared identifiers and value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (SQLite rowid of the `users` table)
pub type UserId = i64;

/// Message identifier, assigned by the store and never reused
pub type MessageId = i64;

/// Opaque positional string reported by a client.
///
/// The format belongs to whichever [`Distance`](crate::proximity::Distance)
/// implementation is in use; the presence window only stores and hands it on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(String);

impl Coordinate {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Coordinate {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Coordinate {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
