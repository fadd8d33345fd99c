//! Events consumed by the dispatch loop.
//!
//! Every asynchronous occurrence (socket readable, child exited, timer
//! expired, address leased, operator command) becomes one of these values
//! and is pushed into a single unbounded channel.  The loop in
//! [`supervise_supplicant`](super::supervise_supplicant) handles them one at
//! a time in arrival order, so no state in this crate needs a lock.

use std::net::Ipv4Addr;

use p2p_core::DeviceAddress;

use super::ports::{ExitReport, TimerId, TimerKind};

/// Operator requests injected from outside the loop (CLI, signal handlers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCommand {
    /// `P2P_FIND <timeout>`.
    Scan { timeout_secs: u32 },
    /// Start a connection attempt to a known device.
    Connect { address: DeviceAddress },
    /// Tear down the current group.
    DisconnectAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The supervised child exited.
    ProcessExited(ExitReport),
    /// One complete line arrived on the control socket.
    ControlLine(String),
    /// The control socket hung up or errored.
    ChannelHangup,
    TimerFired { id: TimerId, kind: TimerKind },
    /// The requesting address role obtained a lease.
    AddressAssigned(Ipv4Addr),
    Command(ManagerCommand),
    /// Stop the loop after releasing every resource.
    Shutdown,
}
