//! Observer notified of device discovery, loss and state changes.
//!
//! Notifications are delivered synchronously from inside the state machine,
//! in the order the transitions happen.  An implementation must not call back
//! into the manager.

use p2p_core::{DeviceState, NetworkDevice};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Receives device notifications from the peer state machine.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkDelegate: Send {
    fn on_device_found(&mut self, device: &NetworkDevice);
    fn on_device_lost(&mut self, device: &NetworkDevice);
    fn on_device_state_changed(&mut self, device: &NetworkDevice);
}

/// One notification, as forwarded by [`ChannelDelegate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    Found(NetworkDevice),
    Lost(NetworkDevice),
    StateChanged(NetworkDevice),
}

impl DelegateEvent {
    pub fn device(&self) -> &NetworkDevice {
        match self {
            DelegateEvent::Found(d) | DelegateEvent::Lost(d) | DelegateEvent::StateChanged(d) => d,
        }
    }

    /// The device state captured when the notification was sent.
    pub fn state(&self) -> DeviceState {
        self.device().state
    }
}

/// Forwards every notification as a [`DelegateEvent`] over an unbounded
/// channel, so observers can live on another task.
pub struct ChannelDelegate {
    tx: UnboundedSender<DelegateEvent>,
}

impl ChannelDelegate {
    pub fn new(tx: UnboundedSender<DelegateEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: DelegateEvent) {
        if self.tx.send(event).is_err() {
            debug!("delegate receiver dropped; notification discarded");
        }
    }
}

impl NetworkDelegate for ChannelDelegate {
    fn on_device_found(&mut self, device: &NetworkDevice) {
        self.forward(DelegateEvent::Found(device.clone()));
    }

    fn on_device_lost(&mut self, device: &NetworkDevice) {
        self.forward(DelegateEvent::Lost(device.clone()));
    }

    fn on_device_state_changed(&mut self, device: &NetworkDevice) {
        self.forward(DelegateEvent::StateChanged(device.clone()));
    }
}

/// Writes a log line for a forwarded notification.
pub fn log_delegate_event(event: &DelegateEvent) {
    match event {
        DelegateEvent::Found(d) => info!("device found: {} ({})", d.address, d.name),
        DelegateEvent::Lost(d) => info!("device lost: {} ({})", d.address, d.name),
        DelegateEvent::StateChanged(d) => info!("device {} is now {}", d.address, d.state),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
