//! TOML-based configuration for a LinkPair node.
//!
//! Reads and writes [`NodeConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\LinkPair\config.toml`
//! - Linux:    `~/.config/linkpair/config.toml`
//! - macOS:    `~/Library/Application Support/LinkPair/config.toml`
//!
//! # Example file (for beginners)
//!
//! ```toml
//! [node]
//! role = "master"
//! log_level = "info"
//! repair_policy = "last-responder-wins"
//!
//! [radio]
//! channel = 1
//! mac = "02:1A:2B:3C:4D:5E"
//! bind_address = "0.0.0.0"
//! broadcast_address = "255.255.255.255"
//! base_port = 47000
//! max_peers = 20
//!
//! [storage]
//! path = "/var/lib/linkpair/pairing.bin"
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so an empty file (or no
//! file at all on first run) yields a working configuration.  `radio.mac`
//! is left out until the first run generates a locally-administered address
//! and writes it back, so a node keeps the same identity across restarts.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use linkpair_core::protocol::address::ParseMacError;
use linkpair_core::{DeviceRole, MacAddress, RepairPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::transport::udp::DEFAULT_BASE_PORT;

/// File name of the non-volatile image when `storage.path` is not set.
pub const DEFAULT_STORAGE_FILE: &str = "pairing.bin";

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

    /// `radio.mac` is not a valid hardware address.
    #[error("invalid radio.mac {value:?}: {source}")]
    InvalidMac {
        value: String,
        #[source]
        source: ParseMacError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level node configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub radio: RadioSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// Role and behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// `"master"` or `"slave"`.
    #[serde(default = "default_role")]
    pub role: DeviceRole,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// What a paired node does with a handshake naming a different peer.
    #[serde(default)]
    pub repair_policy: RepairPolicy,
}

/// Link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadioSection {
    /// Logical channel; both peers must use the same one.
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// This node's hardware address, `"AA:BB:CC:DD:EE:FF"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Interface the UDP link binds.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// IP every frame is sent to.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: IpAddr,
    /// Channel `n` uses UDP port `base_port + n`.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Peer-list capacity of the link.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

/// Location of the pairing image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    /// Image file; defaults to `pairing.bin` next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_role() -> DeviceRole {
    DeviceRole::Slave
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_channel() -> u8 {
    1
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_broadcast_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}
fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}
fn default_max_peers() -> usize {
    20
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            role: default_role(),
            log_level: default_log_level(),
            repair_policy: RepairPolicy::default(),
        }
    }
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            mac: None,
            bind_address: default_bind_address(),
            broadcast_address: default_broadcast_address(),
            base_port: default_base_port(),
            max_peers: default_max_peers(),
        }
    }
}

impl NodeConfig {
    /// Parses `radio.mac`, if set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMac`] if the value is malformed or is a
    /// group address (broadcast included), which cannot name this node.
    pub fn configured_mac(&self) -> Result<Option<MacAddress>, ConfigError> {
        let Some(value) = self.radio.mac.as_deref() else {
            return Ok(None);
        };
        let invalid = |source| ConfigError::InvalidMac {
            value: value.to_string(),
            source,
        };
        let mac: MacAddress = value.parse().map_err(invalid)?;
        if mac.is_group() {
            return Err(invalid(ParseMacError::NotUnicast(mac)));
        }
        Ok(Some(mac))
    }

    /// Returns the configured address, generating and storing a
    /// locally-administered one when none is set.  The flag is `true` when a
    /// new address was generated and the config should be saved.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMac`] if `radio.mac` is malformed or not
    /// a station address.
    pub fn ensure_mac(&mut self) -> Result<(MacAddress, bool), ConfigError> {
        if let Some(mac) = self.configured_mac()? {
            return Ok((mac, false));
        }
        let mac = MacAddress::generate_local();
        self.radio.mac = Some(mac.to_string());
        Ok((mac, true))
    }

    /// Image path: `storage.path`, or [`DEFAULT_STORAGE_FILE`] beside
    /// `config_path`.
    pub fn storage_path(&self, config_path: &Path) -> PathBuf {
        match &self.storage.path {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DEFAULT_STORAGE_FILE),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`NodeConfig`] from `path`, returning the defaults if the file does
/// not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &NodeConfig) -> Result<(), ConfigError> {
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

/// Resolves the platform config directory including the `LinkPair` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LinkPair"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("linkpair"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LinkPair")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
