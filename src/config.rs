//! Service configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Number of time buckets kept
    #[serde(default = "default_window_depth")]
    pub window_depth: usize,

    /// Time between rotations in milliseconds
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_ms: u64,

    /// How long a rotation may wait for the window before giving up
    #[serde(default = "default_rotation_lock_timeout")]
    pub rotation_lock_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Maximum users returned by one search
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Maximum message length in characters
    #[serde(default = "default_max_contents_len")]
    pub max_contents_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long SQLite waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

// Defaults
fn default_bind_addr() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
fn default_http_port() -> u16 { 49000 }
fn default_window_depth() -> usize { 6 }
fn default_rotation_interval() -> u64 { 5000 }
fn default_rotation_lock_timeout() -> u64 { 1000 }
fn default_result_cap() -> usize { 25 }
fn default_max_contents_len() -> usize { crate::messages::DEFAULT_MAX_CONTENTS_LEN }
fn default_database_path() -> PathBuf { PathBuf::from("waypost.db") }
fn default_busy_timeout() -> u64 { 5000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_port: default_http_port(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            window_depth: default_window_depth(),
            rotation_interval_ms: default_rotation_interval(),
            rotation_lock_timeout_ms: default_rotation_lock_timeout(),
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            result_cap: default_result_cap(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            max_contents_len: default_max_contents_len(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl Config {
    /// Parse a TOML document. Missing sections and keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::validation(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Reject settings that would disable a core guarantee.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.presence.window_depth == 0, "presence.window_depth"),
            (self.presence.rotation_interval_ms == 0, "presence.rotation_interval_ms"),
            (self.presence.rotation_lock_timeout_ms == 0, "presence.rotation_lock_timeout_ms"),
            (self.proximity.result_cap == 0, "proximity.result_cap"),
            (self.messages.max_contents_len == 0, "messages.max_contents_len"),
        ];
        if let Some((_, key)) = checks.iter().find(|(zero, _)| *zero) {
            return Err(Error::validation(format!("{key} must be greater than zero")));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_addr, self.server.http_port)
    }

    pub fn window_depth(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.presence.window_depth)
            .ok_or_else(|| Error::validation("presence.window_depth must be greater than zero"))
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.presence.rotation_interval_ms)
    }

    pub fn rotation_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.presence.rotation_lock_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }
}
