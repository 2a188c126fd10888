//! Presence tracking
//!
//! - [`PresenceWindow`]: ring of time buckets holding each user's last coordinates
//! - [`RotationDriver`]: the single periodic task that ages the window

pub mod rotation;
pub mod window;

use std::time::Duration;

pub use rotation::RotationDriver;
pub use window::{Bucket, PresenceWindow, WindowSnapshot};

/// Presence errors. Only the rotation machinery can fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PresenceError {
    #[error("Could not acquire the presence window within {timeout:?}")]
    RotationStalled { timeout: Duration },

    #[error("A rotation driver is already attached to this window")]
    DriverAlreadyAttached,
}
