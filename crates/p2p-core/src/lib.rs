//! # p2p-core
//!
//! Shared library for the Wi-Fi Direct (P2P) manager containing the
//! supplicant control-protocol message type, typed decoding of the inbound
//! P2P events, and the peer domain entities.
//!
//! It has zero dependencies on OS APIs, sockets, or processes.  Everything
//! that touches the outside world lives in the `p2p-manager` crate.
//!
//! # Architecture overview (for beginners)
//!
//! The manager drives an external `wpa_supplicant` process through a small
//! line-oriented text protocol spoken over a local socket.  Three kinds of
//! lines travel over that socket:
//!
//! - **Requests** we send: `P2P_FIND 30`, `P2P_CONNECT 4e:74:03:70:e2:c1 pbc`.
//! - **Responses** the supplicant sends back for the last request: `OK`,
//!   `FAIL`, or a bare value.
//! - **Events** the supplicant sends whenever something happens, prefixed with
//!   a priority level: `<3>P2P-DEVICE-FOUND 4e:74:03:70:e2:c1 name='Aquaris M10'`.
//!
//! This crate defines:
//!
//! - **`protocol`** – How a line is parsed into a [`SupplicantMessage`] and how
//!   outgoing requests are rendered, plus [`SupplicantEvent`] which turns the
//!   five events the manager cares about into typed structs.
//!
//! - **`domain`** – The [`NetworkDevice`] entity, its [`DeviceState`], and the
//!   [`DeviceRegistry`] that owns every discovered device keyed by address.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `p2p_core::SupplicantMessage` instead of the full module path.
pub use domain::device::{DeviceAddress, DeviceState, NetworkDevice};
pub use domain::registry::{DeviceRegistry, Upsert};
pub use protocol::events::{
    DeviceFound, EventError, GroupRemoved, GroupRole, GroupStarted, RemovalReason,
    SupplicantEvent,
};
pub use protocol::message::{Argument, MessageKind, SupplicantMessage, Token, TokenReader};
