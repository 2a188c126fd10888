//! waypost: presence and message relay for location-aware social apps
//!
//! Clients heartbeat their coordinates; each heartbeat also drains the
//! caller's inbox and reports, exactly once, whether the caller's own
//! messages were delivered or failed.
//!
//! - [`presence`]: fixed-depth ring of time buckets plus its rotation task
//! - [`proximity`]: capped nearby-user scan over a window snapshot
//! - [`messages`]: message delivery state machine over SQLite
//! - [`store`]: connection ownership and the transaction boundary
//! - [`accounts`]: registration, login and removal
//! - [`api`]: HTTP surface

pub mod accounts;
pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod messages;
pub mod presence;
pub mod proximity;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result, StoreError};
pub use messages::{MarkFailedOutcome, Message, MessageStatus, MessageStore, SyncResult};
pub use presence::{PresenceError, PresenceWindow, RotationDriver, WindowSnapshot};
pub use proximity::{Distance, ProximityMatcher};
pub use store::Database;
pub use types::{Coordinate, MessageId, UserId};
