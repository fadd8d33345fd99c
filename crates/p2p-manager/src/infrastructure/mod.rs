//! Infrastructure layer for the P2P manager.
//!
//! Contains the OS-facing adapters: the supervised supplicant process, the
//! control socket, tokio timers, the address-role stand-ins and TOML
//! configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `p2p_core`, but MUST NOT be imported by non-test code in the `application` layer.
//!
//! Every adapter has a `mock` sibling that records calls behind
//! `Arc<Mutex<..>>`, so tests can hold a clone and inspect what the manager
//! did after handing the boxed adapter over.

pub mod control;
pub mod dhcp;
pub mod storage;
pub mod supervisor;
pub mod timer;
