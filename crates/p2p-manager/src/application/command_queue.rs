//! FIFO correlation of requests and responses on the control channel.
//!
//! The control protocol is half duplex and carries no correlation id: the
//! supplicant answers requests strictly in the order they were written.  The
//! queue therefore keeps at most one request on the wire.  Every other
//! request waits in order until the response to its predecessor arrives.
//!
//! ```text
//!  enqueue(A) ──► write A           in flight: A     waiting: []
//!  enqueue(B)                       in flight: A     waiting: [B]
//!  response   ──► complete A, write B
//!                                   in flight: B     waiting: []
//! ```
//!
//! Events interleave with responses at any time and bypass the queue.
//!
//! The queue is generic over the continuation type `C`.  It never calls
//! continuations itself; it hands back [`Completion`]s that the owner
//! dispatches synchronously, which keeps the queue free of borrows into the
//! owner's state.

use std::collections::VecDeque;

use p2p_core::{MessageKind, SupplicantMessage};
use tracing::{debug, warn};

use super::ports::LinkError;

/// Reason placed in the failure-shaped response of a request that could not
/// be written.
pub const WRITE_FAILED: &str = "write-failed";

/// A request that completed, paired with the continuation its caller left.
#[derive(Debug)]
pub struct Completion<C> {
    pub continuation: C,
    /// The request line as it was (or would have been) written.
    pub request: String,
    pub response: SupplicantMessage,
}

/// Outcome of [`CommandQueue::handle_message`].
#[derive(Debug)]
pub enum Routed<C> {
    /// The message is unsolicited; route it to the state machine.
    Event(SupplicantMessage),
    /// The message answered the in-flight request.  Also carries any
    /// following requests that failed to write while the queue advanced.
    Completed(Vec<Completion<C>>),
    /// A response arrived with nothing in flight and was dropped.
    Dropped,
}

struct PendingCommand<C> {
    request: String,
    continuation: C,
}

pub struct CommandQueue<C> {
    pending: VecDeque<PendingCommand<C>>,
    /// `true` while the head of `pending` has been written and awaits its
    /// response.
    in_flight: bool,
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: false,
        }
    }
}

impl<C> CommandQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `request` and writes it immediately when nothing is in flight.
    ///
    /// Returns the completions of requests that could not be written.  The
    /// write path never stalls: a failed write completes that request with a
    /// failure-shaped response and the queue moves on.
    pub fn enqueue<W>(
        &mut self,
        request: &SupplicantMessage,
        continuation: C,
        write: W,
    ) -> Vec<Completion<C>>
    where
        W: FnMut(&str) -> Result<(), LinkError>,
    {
        let line = request.to_line();
        debug!("queueing request: {line}");
        self.pending.push_back(PendingCommand {
            request: line,
            continuation,
        });

        if self.in_flight {
            return Vec::new();
        }
        self.write_next(write)
    }

    /// Routes one parsed inbound message.
    pub fn handle_message<W>(&mut self, message: SupplicantMessage, write: W) -> Routed<C>
    where
        W: FnMut(&str) -> Result<(), LinkError>,
    {
        if message.kind() != MessageKind::Response {
            return Routed::Event(message);
        }

        if !self.in_flight {
            warn!("dropping response with no request in flight: {}", message.raw());
            return Routed::Dropped;
        }

        let Some(head) = self.pending.pop_front() else {
            self.in_flight = false;
            warn!("dropping response with an empty queue: {}", message.raw());
            return Routed::Dropped;
        };
        self.in_flight = false;

        let mut completed = vec![Completion {
            continuation: head.continuation,
            request: head.request,
            response: message,
        }];
        completed.extend(self.write_next(write));
        Routed::Completed(completed)
    }

    /// Drops every pending request without completing it.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!("dropping {} pending request(s)", self.pending.len());
        }
        self.pending.clear();
        self.in_flight = false;
    }

    /// Number of requests written or waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Writes heads until one succeeds or the queue is empty.
    fn write_next<W>(&mut self, mut write: W) -> Vec<Completion<C>>
    where
        W: FnMut(&str) -> Result<(), LinkError>,
    {
        let mut failed = Vec::new();
        while let Some(head) = self.pending.front() {
            match write(&head.request) {
                Ok(()) => {
                    self.in_flight = true;
                    break;
                }
                Err(e) => {
                    warn!("failed to write {:?}: {e}", head.request);
                    if let Some(head) = self.pending.pop_front() {
                        failed.push(Completion {
                            continuation: head.continuation,
                            request: head.request,
                            response: SupplicantMessage::failure(WRITE_FAILED),
                        });
                    }
                }
            }
        }
        failed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
