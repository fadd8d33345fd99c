//! TOML-based configuration for the P2P manager.
//!
//! Default location: `$XDG_CONFIG_HOME/p2p-manager/config.toml` (falling back
//! to `~/.config/p2p-manager/config.toml`).
//!
//! ```toml
//! [supplicant]
//! binary_path = "/sbin/wpa_supplicant"
//! interface = "p2p0"
//!
//! [timing]
//! respawn_limit = 10
//! dhcp_timeout_ms = 5000
//!
//! [peers]
//! group_removed_guard = "require_no_current_peer"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a missing file, a
//! missing section or a missing key all fall back to the built-in value.
//! Paths that depend on the interface (`control_dir`, `config_path`) are
//! optional and derived from it when absent.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::manage_peers::{GroupRemovedGuard, PeerSettings};
use crate::application::supervise_supplicant::ManagerSettings;
use crate::infrastructure::supervisor::SupplicantLaunch;

/// Environment variable that keeps the supplicant's output attached.
pub const DEBUG_ENV: &str = "P2P_SUPPLICANT_DEBUG";

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
pub struct AppConfig {
    #[serde(default)]
    pub supplicant: SupplicantConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub peers: PeersConfig,
    #[serde(default)]
    pub dhcp: DhcpConfig,
    #[serde(default)]
    pub wfd: WfdConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// How the supplicant is launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplicantConfig {
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    /// `-D` driver name.
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Defaults to `/var/run/<interface>_supplicant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_dir: Option<PathBuf>,
    /// Defaults to `/tmp/supplicant-<interface>.conf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Keep the supplicant's stdout/stderr attached.
    #[serde(default)]
    pub debug: bool,
}

/// Supervision and state-machine timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_respawn_limit")]
    pub respawn_limit: u32,
    #[serde(default = "default_respawn_interval_ms")]
    pub respawn_interval_ms: u64,
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
    #[serde(default = "default_dhcp_timeout_ms")]
    pub dhcp_timeout_ms: u64,
    #[serde(default = "default_peer_failure_cooldown_ms")]
    pub peer_failure_cooldown_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PeersConfig {
    #[serde(default)]
    pub group_removed_guard: GroupRemovedGuard,
}

/// Addresses used by the address-role stand-ins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DhcpConfig {
    /// Local address while group owner.
    #[serde(default = "default_server_address")]
    pub server_address: Ipv4Addr,
    /// Fixed lease reported while group client.  Without one, acquisition
    /// times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<Ipv4Addr>,
}

/// Wi-Fi display capability advertisement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WfdConfig {
    #[serde(default = "default_subelements")]
    pub subelements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_binary_path() -> PathBuf {
    PathBuf::from("/sbin/wpa_supplicant")
}
fn default_driver() -> String {
    "nl80211".to_string()
}
fn default_interface() -> String {
    "p2p0".to_string()
}
fn default_device_name() -> String {
    "unknown".to_string()
}
fn default_respawn_limit() -> u32 {
    10
}
fn default_respawn_interval_ms() -> u64 {
    2000
}
fn default_connect_delay_ms() -> u64 {
    500
}
fn default_dhcp_timeout_ms() -> u64 {
    5000
}
fn default_peer_failure_cooldown_ms() -> u64 {
    5000
}
fn default_server_address() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 7, 1)
}
fn default_subelements() -> Vec<String> {
    vec!["000600101C440032".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SupplicantConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            driver: default_driver(),
            interface: default_interface(),
            control_dir: None,
            config_path: None,
            device_name: default_device_name(),
            debug: false,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            respawn_limit: default_respawn_limit(),
            respawn_interval_ms: default_respawn_interval_ms(),
            connect_delay_ms: default_connect_delay_ms(),
            dhcp_timeout_ms: default_dhcp_timeout_ms(),
            peer_failure_cooldown_ms: default_peer_failure_cooldown_ms(),
        }
    }
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            client_address: None,
        }
    }
}

impl Default for WfdConfig {
    fn default() -> Self {
        Self {
            subelements: default_subelements(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl SupplicantConfig {
    pub fn control_dir(&self) -> PathBuf {
        self.control_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/var/run/{}_supplicant", self.interface)))
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/tmp/supplicant-{}.conf", self.interface)))
    }
}

impl AppConfig {
    /// Launch parameters; `debug_env` is whether the debug environment
    /// variable is set.
    pub fn launch(&self, debug_env: bool) -> SupplicantLaunch {
        SupplicantLaunch {
            binary_path: self.supplicant.binary_path.clone(),
            driver: self.supplicant.driver.clone(),
            interface: self.supplicant.interface.clone(),
            control_dir: self.supplicant.control_dir(),
            config_path: self.supplicant.config_path(),
            device_name: self.supplicant.device_name.clone(),
            debug: self.supplicant.debug || debug_env,
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            interface: self.supplicant.interface.clone(),
            respawn_limit: self.timing.respawn_limit,
            respawn_interval: Duration::from_millis(self.timing.respawn_interval_ms),
            connect_delay: Duration::from_millis(self.timing.connect_delay_ms),
            wfd_subelements: self.wfd.subelements.clone(),
        }
    }

    pub fn peer_settings(&self) -> PeerSettings {
        PeerSettings {
            dhcp_timeout: Duration::from_millis(self.timing.dhcp_timeout_ms),
            failure_cooldown: Duration::from_millis(self.timing.peer_failure_cooldown_ms),
            group_removed_guard: self.peers.group_removed_guard,
        }
    }
}

/// `true` when [`DEBUG_ENV`] is set to anything.
pub fn debug_env_set() -> bool {
    std::env::var_os(DEBUG_ENV).is_some()
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads from `path` when given, otherwise from the default location.
///
/// # Errors
///
/// See [`load_config_from`] and [`config_file_path`].
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config_from(&config_file_path()?),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
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

/// `$XDG_CONFIG_HOME/p2p-manager`, or `~/.config/p2p-manager`.
fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("p2p-manager"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
