//! Typed view of the inbound P2P events the manager acts on.
//!
//! Sample lines as emitted by the supplicant:
//!
//! ```text
//! <3>P2P-DEVICE-FOUND 4e:74:03:70:e2:c1 p2p_dev_addr=4e:74:03:70:e2:c1 name='Aquaris M10' config_methods=0x188
//! <3>P2P-DEVICE-LOST p2p_dev_addr=4e:74:03:70:e2:c1
//! <3>P2P-GROUP-FORMATION-SUCCESS
//! <3>P2P-GROUP-STARTED p2p0 GO ssid="DIRECT-hB" freq=2412 passphrase="HtP0qYon" go_dev_addr=4e:74:03:64:95:a7
//! <3>P2P-GROUP-REMOVED p2p0 GO reason=FORMATION_FAILED
//! ```

use thiserror::Error;

use crate::domain::device::DeviceAddress;
use crate::protocol::message::{MessageKind, SupplicantMessage};

pub const P2P_DEVICE_FOUND: &str = "P2P-DEVICE-FOUND";
pub const P2P_DEVICE_LOST: &str = "P2P-DEVICE-LOST";
pub const P2P_GROUP_FORMATION_SUCCESS: &str = "P2P-GROUP-FORMATION-SUCCESS";
pub const P2P_GROUP_STARTED: &str = "P2P-GROUP-STARTED";
pub const P2P_GROUP_REMOVED: &str = "P2P-GROUP-REMOVED";

/// Errors raised when a known event lacks a token it cannot do without.
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    /// The message is a response or request, not an event.
    #[error("not an event: {0}")]
    NotAnEvent(String),

    /// A required token is absent.
    #[error("{event} is missing {token}")]
    MissingToken {
        event: &'static str,
        token: &'static str,
    },
}

/// Role of the local end inside a formed group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    /// Group owner: serves addresses to the other side.
    Owner,
    /// Group client: requests an address from the owner.
    Client,
}

impl GroupRole {
    fn from_token(token: &str) -> Self {
        if token == "GO" {
            GroupRole::Owner
        } else {
            GroupRole::Client
        }
    }
}

/// Why the supplicant tore a group down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalReason {
    FormationFailed,
    PskFailure,
    FreqConflict,
    Other(String),
}

impl RemovalReason {
    pub fn from_token(token: &str) -> Self {
        match token {
            "FORMATION_FAILED" => RemovalReason::FormationFailed,
            "PSK_FAILURE" => RemovalReason::PskFailure,
            "FREQ_CONFLICT" => RemovalReason::FreqConflict,
            other => RemovalReason::Other(other.to_string()),
        }
    }

    /// `true` when the removal means the connection attempt failed, as
    /// opposed to an orderly disconnect.
    pub fn is_failure(&self) -> bool {
        !matches!(self, RemovalReason::Other(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFound {
    pub address: DeviceAddress,
    /// Empty when the event carried no `name=` token.
    pub name: String,
    pub config_methods: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStarted {
    pub interface: String,
    pub role: GroupRole,
    pub ssid: Option<String>,
    pub frequency: Option<u32>,
    pub go_device_address: Option<DeviceAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRemoved {
    pub interface: String,
    pub role: Option<GroupRole>,
    pub reason: Option<RemovalReason>,
}

/// The inbound events consumed by the peer state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplicantEvent {
    DeviceFound(DeviceFound),
    DeviceLost { address: DeviceAddress },
    GroupFormationSuccess,
    GroupStarted(GroupStarted),
    GroupRemoved(GroupRemoved),
}

impl SupplicantEvent {
    /// Decodes `message` into a typed event.
    ///
    /// Returns `Ok(None)` for events this crate does not model, so callers can
    /// log and move on.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NotAnEvent`] for responses/requests and
    /// [`EventError::MissingToken`] when a known event lacks the device
    /// address it is about.
    pub fn decode(message: &SupplicantMessage) -> Result<Option<Self>, EventError> {
        if message.kind() != MessageKind::Event {
            return Err(EventError::NotAnEvent(message.raw().to_string()));
        }

        let event = match message.name() {
            P2P_DEVICE_FOUND => Self::decode_device_found(message)?,
            P2P_DEVICE_LOST => SupplicantEvent::DeviceLost {
                address: message
                    .named("p2p_dev_addr")
                    .ok_or(EventError::MissingToken {
                        event: P2P_DEVICE_LOST,
                        token: "p2p_dev_addr",
                    })?
                    .to_string(),
            },
            P2P_GROUP_FORMATION_SUCCESS => SupplicantEvent::GroupFormationSuccess,
            P2P_GROUP_STARTED => Self::decode_group_started(message),
            P2P_GROUP_REMOVED => Self::decode_group_removed(message),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    fn decode_device_found(message: &SupplicantMessage) -> Result<Self, EventError> {
        let address = message
            .named("p2p_dev_addr")
            .or_else(|| message.positional(0))
            .ok_or(EventError::MissingToken {
                event: P2P_DEVICE_FOUND,
                token: "p2p_dev_addr",
            })?;

        Ok(SupplicantEvent::DeviceFound(DeviceFound {
            address: address.to_string(),
            name: message.named("name").unwrap_or_default().to_string(),
            config_methods: message.named("config_methods").map(str::to_string),
            device_type: message.named("pri_dev_type").map(str::to_string),
        }))
    }

    fn decode_group_started(message: &SupplicantMessage) -> Self {
        let mut reader = message.reader();
        let interface = reader.text().unwrap_or_default().to_string();
        let role = GroupRole::from_token(reader.text().unwrap_or_default());

        SupplicantEvent::GroupStarted(GroupStarted {
            interface,
            role,
            ssid: message.named("ssid").map(str::to_string),
            frequency: message.named("freq").and_then(|f| f.parse().ok()),
            go_device_address: message.named("go_dev_addr").map(str::to_string),
        })
    }

    fn decode_group_removed(message: &SupplicantMessage) -> Self {
        let mut reader = message.reader();
        let interface = reader.text().unwrap_or_default().to_string();
        let role = reader.text().map(GroupRole::from_token);

        SupplicantEvent::GroupRemoved(GroupRemoved {
            interface,
            role,
            reason: message.named("reason").map(RemovalReason::from_token),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
