//! Ports: the traits the application layer drives.
//!
//! Every OS-facing concern the manager needs is expressed here as a small
//! synchronous trait.  The real implementations live in `infrastructure`;
//! recording doubles live next to them in `mock` modules.
//!
//! All methods are called from the dispatch loop only, so none of them may
//! block.  Anything that completes later (a line arriving on the control
//! socket, a child exiting, a timer expiring, an address being assigned) is
//! reported back as a [`ManagerEvent`](super::events::ManagerEvent).

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

// ── Control link ──────────────────────────────────────────────────────────────

/// Errors raised by the control-socket side.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The local socket could not be created or bound.
    #[error("failed to bind local control socket {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The supplicant's control socket refused the connection.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A write did not make it onto the socket.
    #[error("failed to send to supplicant: {0}")]
    Send(#[source] std::io::Error),

    /// A send was attempted while no socket is connected.
    #[error("control link is not connected")]
    NotConnected,
}

/// The connected control socket.
pub trait ControlLink: Send {
    /// Opens the socket and starts delivering inbound lines as
    /// `ManagerEvent::ControlLine`.
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Writes one request line.  Best effort, never blocks.
    fn send(&mut self, line: &str) -> Result<(), LinkError>;

    /// Closes the socket.  Calling it twice is a no-op.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

// ── Process control ───────────────────────────────────────────────────────────

/// Errors raised while launching the supplicant.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The generated configuration file could not be written.
    #[error("failed to write supplicant config {path}: {source}")]
    WriteConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The binary could not be spawned.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called while a child is still running.
    #[error("supplicant is already running")]
    AlreadyRunning,
}

/// Identifies one spawned child so that an exit report from an earlier
/// child can be told apart from the current one.
pub type Generation = u64;

/// Exit status of a supervised child, delivered through the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub generation: Generation,
    /// `true` for a zero exit status.
    pub success: bool,
    /// Exit code, `None` when the child was killed by a signal.
    pub code: Option<i32>,
}

/// Spawns and stops the supervised supplicant.
pub trait ProcessControl: Send {
    /// Writes the generated config, clears the stale control directory and
    /// spawns the child.  Exit is reported later as
    /// `ManagerEvent::ProcessExited`.
    fn start(&mut self) -> Result<Generation, SupervisorError>;

    /// Kills the child if one is running.  Its exit is not reported.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

// ── Address roles ─────────────────────────────────────────────────────────────

/// One side of address assignment inside a formed group: the serving role
/// when the local end is group owner, the requesting role otherwise.
///
/// A requesting role reports its lease asynchronously as
/// `ManagerEvent::AddressAssigned`.
pub trait AddressRole: Send {
    fn start(&mut self);
    fn stop(&mut self);
    fn local_address(&self) -> Option<Ipv4Addr>;
}

// ── Timers ────────────────────────────────────────────────────────────────────

/// Handle to one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// What an armed timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next attempt to connect the control socket after a spawn.
    ConnectControl,
    /// Next respawn attempt after the supplicant failed.
    Respawn,
    /// Deadline for the requesting role to obtain an address.
    DhcpTimeout,
    /// Relaxes a failed peer back to `Idle`.
    PeerFailureCooldown,
}

/// Cancellable one-shot timers.  Expiry is delivered as
/// `ManagerEvent::TimerFired`.
pub trait TimerScheduler: Send {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> TimerId;

    /// Cancels `id`.  Cancelling an expired or unknown timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}
