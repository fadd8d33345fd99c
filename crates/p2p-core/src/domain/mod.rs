//! Domain entities for the P2P manager.
//!
//! This module contains pure business data with no infrastructure
//! dependencies: the discovered peer and the registry that owns all peers.
//!
//! # Ownership model
//!
//! The registry is the single owner of every [`device::NetworkDevice`].
//! Anything else that needs to refer to a peer (for example the "current
//! peer" slot of the connection state machine) stores the peer's address and
//! re-resolves it through the registry on every access.  Removing a device
//! therefore can never leave a dangling reference behind.

pub mod device;
pub mod registry;
