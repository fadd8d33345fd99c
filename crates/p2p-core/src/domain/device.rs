//! The discovered P2P peer and its connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware (P2P device) address of a peer, e.g. `4e:74:03:70:e2:c1`.
///
/// This is the stable key of a device for its whole lifetime.
pub type DeviceAddress = String;

/// Connection state of a peer.
///
/// ```text
/// Idle ──► Configuration ──► Connected
///   ▲            │                │
///   │            ▼                ▼
///   └──────── Failure       Disconnected
/// ```
///
/// `Disconnected` and `Failure` are reachable from any in-progress state.
/// A failed peer relaxes back to `Idle` after a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    #[default]
    Idle,
    Configuration,
    Connected,
    Disconnected,
    Failure,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Configuration => "configuration",
            DeviceState::Connected => "connected",
            DeviceState::Disconnected => "disconnected",
            DeviceState::Failure => "failure",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered P2P device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub address: DeviceAddress,
    pub name: String,
    pub state: DeviceState,
    /// WPS config methods bitmask as advertised (`0x188`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_methods: Option<String>,
}

impl NetworkDevice {
    /// Creates a new `Idle` device.
    pub fn new(address: impl Into<DeviceAddress>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            state: DeviceState::Idle,
            config_methods: None,
        }
    }
}
