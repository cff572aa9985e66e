//! Configuration for the remote: TOML file schema plus the runtime
//! [`SessionConfig`] derived from it.
//!
//! The file lives in the platform config directory:
//! - Windows:  `%APPDATA%\ForkliftRemote\config.toml`
//! - Linux:    `~/.config/forklift-remote/config.toml`
//! - macOS:    `~/Library/Application Support/ForkliftRemote/config.toml`
//!
//! ```toml
//! [device]
//! host = "192.168.4.1"
//! port = 81
//!
//! [session]
//! connect_timeout_ms = 5000
//! outbound_capacity = 32
//! suppress_repeated_movement = true
//! simulate = false
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or
//! an older file without newer keys all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use forklift_core::{Endpoint, EndpointError, DEFAULT_HOST, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the controller lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Session tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    /// Upper bound on the WebSocket handshake, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Outbound frames that may be in flight before new ones are dropped.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    /// Skip retransmitting an unchanged joystick vector.
    #[serde(default = "default_true")]
    pub suppress_repeated_movement: bool,
    /// Use the simulated session instead of a real controller.
    #[serde(default)]
    pub simulate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_outbound_capacity() -> usize {
    32
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            outbound_capacity: default_outbound_capacity(),
            suppress_repeated_movement: default_true(),
            simulate: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl RemoteConfig {
    /// The configured controller endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] if the file holds an empty host or port `0`.
    pub fn endpoint(&self) -> Result<Endpoint, EndpointError> {
        Endpoint::new(self.device.host.clone(), self.device.port)
    }

    /// Runtime settings for [`crate::application::Session`].
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.session.connect_timeout_ms),
            outbound_capacity: self.session.outbound_capacity.max(1),
            suppress_repeated_movement: self.session.suppress_repeated_movement,
        }
    }
}

// ── Runtime session config ────────────────────────────────────────────────────

/// Runtime settings consumed by the session and the WebSocket transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub outbound_capacity: usize,
    pub suppress_repeated_movement: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        RemoteConfig::default().session_config()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from the platform default when `None`.
///
/// A file that does not exist yields [`RemoteConfig::default()`].
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<RemoteConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RemoteConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &RemoteConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ForkliftRemote"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("forklift-remote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ForkliftRemote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
