//! Application layer use cases for the P2P manager.
//!
//! # What lives here? (for beginners)
//!
//! The application layer sits between the protocol/domain types in
//! `p2p_core` and the OS-facing adapters in `infrastructure`.  Code here:
//!
//! - **Orchestrates** the supplicant lifecycle, the command queue and the
//!   peer state machine.
//! - **Depends on abstractions** declared in [`ports`] (process control, the
//!   control link, timers, address roles) so tests can drive everything with
//!   in-memory doubles.
//! - **Never touches a socket, a process or a clock directly.**
//!
//! # Sub-modules
//!
//! - **`ports`** – Traits the infrastructure implements.
//! - **`events`** – The typed events consumed by the single dispatch loop.
//! - **`command_queue`** – FIFO request/response correlation over the
//!   half-duplex control channel.
//! - **`delegate`** – Observer notified of device discovery, loss and state
//!   changes.
//! - **`manage_peers`** – Device registry plus the current-peer connection
//!   workflow.
//! - **`supervise_supplicant`** – Spawn/respawn policy, control-channel
//!   lifecycle and the dispatch loop tying it all together.

pub mod command_queue;
pub mod delegate;
pub mod events;
pub mod manage_peers;
pub mod ports;
pub mod supervise_supplicant;
