//! PeerStateMachine: device registry plus the current-peer connection
//! workflow.
//!
//! # Connection lifecycle (for beginners)
//!
//! Exactly one device may be the *current peer* at a time.  It moves through:
//!
//! ```text
//! connect()            GROUP-STARTED          role GO
//!   Idle ─────────────────► Configuration ─────────────────► Connected
//!                               │
//!                               │ role client: start address request,
//!                               │ arm acquisition timeout
//!                               ▼
//!              address assigned ──► Connected
//!              timeout          ──► Failure ──(cooldown)──► Idle
//! ```
//!
//! `GROUP-REMOVED` maps a failure reason to `Failure` and anything else to
//! `Disconnected`.  A reset (child died, shutdown) forces the current peer to
//! `Disconnected` and reports every known device as lost.
//!
//! The current peer is held by address, never by reference: every access
//! goes back through the registry, so a device removed from the registry can
//! never be observed through a stale slot.
//!
//! Timers are armed through a [`TimerScheduler`] passed into each call.  A
//! timer that fires after its target state has moved on is recognised by id
//! and ignored.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use p2p_core::{
    DeviceAddress, DeviceFound, DeviceRegistry, DeviceState, GroupRemoved, GroupRole,
    GroupStarted, NetworkDevice, SupplicantEvent, Upsert,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::delegate::NetworkDelegate;
use super::ports::{AddressRole, TimerId, TimerKind, TimerScheduler};

/// Errors returned by [`PeerStateMachine::begin_connect`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The address was never discovered (or has been lost).
    #[error("unknown device {0}")]
    UnknownDevice(DeviceAddress),

    /// Another connection attempt owns the current-peer slot.
    #[error("already connecting to {0}")]
    Busy(DeviceAddress),

    /// The control channel is down, so the request cannot be issued.
    #[error("supplicant control channel is not connected")]
    NotConnected,

    /// `P2P_CONNECT` could not be written to the control channel.
    #[error("failed to send connect request to supplicant")]
    Send,
}

/// When a `P2P-GROUP-REMOVED` event is acted on.
///
/// The observed behavior only processes the removal when *no* current peer
/// is set, which leaves nothing to update.  The alternative acts on the
/// current peer.  The branch stays explicit and selectable until the
/// intended behavior is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRemovedGuard {
    #[default]
    RequireNoCurrentPeer,
    RequireCurrentPeer,
}

/// Timing and policy knobs for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSettings {
    /// How long the requesting role may take to obtain an address.
    pub dhcp_timeout: Duration,
    /// How long a failed peer stays in `Failure` before relaxing to `Idle`.
    pub failure_cooldown: Duration,
    pub group_removed_guard: GroupRemovedGuard,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            dhcp_timeout: Duration::from_millis(5000),
            failure_cooldown: Duration::from_millis(5000),
            group_removed_guard: GroupRemovedGuard::default(),
        }
    }
}

pub struct PeerStateMachine {
    settings: PeerSettings,
    registry: DeviceRegistry,
    current: Option<DeviceAddress>,
    is_group_owner: bool,
    delegate: Box<dyn NetworkDelegate>,
    dhcp_client: Box<dyn AddressRole>,
    dhcp_server: Box<dyn AddressRole>,
    dhcp_timer: Option<TimerId>,
    /// Armed cooldowns, keyed by timer, naming the failed device.
    cooldowns: BTreeMap<TimerId, DeviceAddress>,
}

impl PeerStateMachine {
    pub fn new(
        settings: PeerSettings,
        delegate: Box<dyn NetworkDelegate>,
        dhcp_client: Box<dyn AddressRole>,
        dhcp_server: Box<dyn AddressRole>,
    ) -> Self {
        Self {
            settings,
            registry: DeviceRegistry::new(),
            current: None,
            is_group_owner: false,
            delegate,
            dhcp_client,
            dhcp_server,
            dhcp_timer: None,
            cooldowns: BTreeMap::new(),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Snapshot of every known device, in address order.
    pub fn devices(&self) -> Vec<NetworkDevice> {
        self.registry.snapshot()
    }

    pub fn device(&self, address: &str) -> Option<&NetworkDevice> {
        self.registry.get(address)
    }

    pub fn current_peer(&self) -> Option<&NetworkDevice> {
        self.current.as_deref().and_then(|a| self.registry.get(a))
    }

    pub fn is_group_owner(&self) -> bool {
        self.is_group_owner
    }

    /// Address of whichever role is active for the current group.
    pub fn local_address(&self) -> Option<Ipv4Addr> {
        if self.is_group_owner {
            self.dhcp_server.local_address()
        } else {
            self.dhcp_client.local_address()
        }
    }

    // ── Inbound events ────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: SupplicantEvent, timers: &mut dyn TimerScheduler) {
        match event {
            SupplicantEvent::DeviceFound(found) => self.on_device_found(found),
            SupplicantEvent::DeviceLost { address } => self.on_device_lost(&address, timers),
            SupplicantEvent::GroupFormationSuccess => debug!("group formation succeeded"),
            SupplicantEvent::GroupStarted(started) => self.on_group_started(&started, timers),
            SupplicantEvent::GroupRemoved(removed) => self.on_group_removed(&removed, timers),
        }
    }

    pub fn on_device_found(&mut self, found: DeviceFound) {
        let outcome = self
            .registry
            .upsert(&found.address, &found.name, found.config_methods);

        match outcome {
            Upsert::Updated => debug!("refreshed device {} ({})", found.address, found.name),
            Upsert::Inserted => {
                info!("found device {} ({})", found.address, found.name);
                if let Some(device) = self.registry.get(&found.address) {
                    self.delegate.on_device_found(device);
                }
            }
        }
    }

    /// Reports the device as lost, then forgets it.
    pub fn on_device_lost(&mut self, address: &str, timers: &mut dyn TimerScheduler) {
        let Some(device) = self.registry.get(address) else {
            debug!("lost unknown device {address}");
            return;
        };
        info!("lost device {address}");
        self.delegate.on_device_lost(device);

        if self.current.as_deref() == Some(address) {
            warn!("current peer {address} disappeared");
            self.current = None;
            self.cancel_dhcp_timer(timers);
            self.stop_roles();
        }
        self.cancel_cooldowns_for(address, timers);
        self.registry.remove(address);
    }

    pub fn on_group_started(&mut self, started: &GroupStarted, timers: &mut dyn TimerScheduler) {
        let Some(address) = self.current.clone() else {
            debug!("group started on {} without a current peer", started.interface);
            return;
        };

        self.transition(&address, DeviceState::Configuration);

        match started.role {
            GroupRole::Owner => {
                info!("group started on {} as owner", started.interface);
                self.is_group_owner = true;
                self.dhcp_server.start();
                self.transition(&address, DeviceState::Connected);
            }
            GroupRole::Client => {
                info!("group started on {} as client", started.interface);
                self.is_group_owner = false;
                self.dhcp_client.start();
                self.cancel_dhcp_timer(timers);
                self.dhcp_timer =
                    Some(timers.schedule(TimerKind::DhcpTimeout, self.settings.dhcp_timeout));
            }
        }
    }

    pub fn on_group_removed(&mut self, removed: &GroupRemoved, timers: &mut dyn TimerScheduler) {
        let proceed = match self.settings.group_removed_guard {
            GroupRemovedGuard::RequireNoCurrentPeer => self.current.is_none(),
            GroupRemovedGuard::RequireCurrentPeer => self.current.is_some(),
        };
        if !proceed {
            debug!(
                "ignoring group removal on {} ({:?})",
                removed.interface, self.settings.group_removed_guard
            );
            return;
        }

        let state = match &removed.reason {
            Some(reason) if reason.is_failure() => DeviceState::Failure,
            _ => DeviceState::Disconnected,
        };

        let Some(address) = self.current.take() else {
            debug!(
                "group on {} removed ({state}) with no current peer to update",
                removed.interface
            );
            return;
        };

        info!("group on {} removed, peer {address} is {state}", removed.interface);
        self.cancel_dhcp_timer(timers);
        self.stop_roles();
        self.transition(&address, state);
        if state == DeviceState::Failure {
            self.schedule_cooldown(address, timers);
        }
    }

    /// The requesting role obtained `address`.
    pub fn on_address_assigned(&mut self, address: Ipv4Addr, timers: &mut dyn TimerScheduler) {
        let Some(peer) = self.current.clone() else {
            debug!("address {address} assigned without a current peer");
            return;
        };
        if self.registry.get(&peer).map(|d| d.state) != Some(DeviceState::Configuration) {
            debug!("address {address} assigned after {peer} left configuration");
            return;
        }

        info!("obtained address {address} for group with {peer}");
        self.cancel_dhcp_timer(timers);
        self.transition(&peer, DeviceState::Connected);
    }

    /// Handles an expired timer.  Returns `false` when the timer is not one
    /// of ours.
    pub fn on_timer(
        &mut self,
        id: TimerId,
        kind: TimerKind,
        timers: &mut dyn TimerScheduler,
    ) -> bool {
        match kind {
            TimerKind::DhcpTimeout => {
                self.on_dhcp_timeout(id, timers);
                true
            }
            TimerKind::PeerFailureCooldown => {
                self.on_cooldown(id);
                true
            }
            TimerKind::ConnectControl | TimerKind::Respawn => false,
        }
    }

    fn on_dhcp_timeout(&mut self, id: TimerId, timers: &mut dyn TimerScheduler) {
        if self.dhcp_timer != Some(id) {
            debug!("stale acquisition timeout {id}");
            return;
        }
        self.dhcp_timer = None;

        let Some(address) = self.current.clone() else {
            debug!("acquisition timeout without a current peer");
            return;
        };

        warn!("no address assigned for group with {address}, giving up");
        self.dhcp_client.stop();
        self.transition(&address, DeviceState::Failure);
        self.schedule_cooldown(address, timers);
    }

    fn on_cooldown(&mut self, id: TimerId) {
        let Some(address) = self.cooldowns.remove(&id) else {
            debug!("stale cooldown {id}");
            return;
        };

        if self.registry.get(&address).map(|d| d.state) != Some(DeviceState::Failure) {
            debug!("cooldown for {address} no longer applies");
            return;
        }

        self.transition(&address, DeviceState::Idle);
        if self.current.as_deref() == Some(address.as_str()) {
            self.current = None;
            self.is_group_owner = false;
        }
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// Claims the current-peer slot for `address`.
    ///
    /// Only validates and records the attempt; the caller issues the connect
    /// request.  The formation outcome arrives later as group events.
    ///
    /// # Errors
    ///
    /// [`ConnectError::UnknownDevice`] if the address is not registered,
    /// [`ConnectError::Busy`] if another peer is current.  The state is left
    /// untouched on error.
    pub fn begin_connect(&mut self, address: &str) -> Result<(), ConnectError> {
        if !self.registry.contains(address) {
            return Err(ConnectError::UnknownDevice(address.to_string()));
        }
        if let Some(current) = &self.current {
            return Err(ConnectError::Busy(current.clone()));
        }

        info!("connecting to {address}");
        self.current = Some(address.to_string());
        Ok(())
    }

    /// The supplicant rejected the connect request for `address`.
    pub fn connect_rejected(&mut self, address: &str, timers: &mut dyn TimerScheduler) {
        if self.current.as_deref() != Some(address) {
            debug!("connect rejection for {address}, which is no longer current");
            return;
        }
        warn!("connect request for {address} was rejected");
        self.transition(address, DeviceState::Failure);
        self.schedule_cooldown(address.to_string(), timers);
    }

    /// Forces the current peer to `Disconnected`, reports every device as
    /// lost and empties the registry.
    pub fn reset(&mut self, timers: &mut dyn TimerScheduler) {
        if let Some(address) = self.current.take() {
            info!("resetting current peer {address}");
            self.transition(&address, DeviceState::Disconnected);
            self.cancel_dhcp_timer(timers);
            self.stop_roles();
        }

        for (id, _) in std::mem::take(&mut self.cooldowns) {
            timers.cancel(id);
        }

        for device in self.registry.drain() {
            self.delegate.on_device_lost(&device);
        }
        self.is_group_owner = false;
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Sets the state of a registered device and notifies the delegate.
    fn transition(&mut self, address: &str, state: DeviceState) {
        match self.registry.set_state(address, state) {
            Some(device) => {
                debug!("device {address} -> {state}");
                self.delegate.on_device_state_changed(device);
            }
            None => warn!("cannot move unknown device {address} to {state}"),
        }
    }

    fn schedule_cooldown(&mut self, address: DeviceAddress, timers: &mut dyn TimerScheduler) {
        self.cancel_cooldowns_for(&address, timers);
        let id = timers.schedule(TimerKind::PeerFailureCooldown, self.settings.failure_cooldown);
        self.cooldowns.insert(id, address);
    }

    fn cancel_cooldowns_for(&mut self, address: &str, timers: &mut dyn TimerScheduler) {
        let ids: Vec<TimerId> = self
            .cooldowns
            .iter()
            .filter(|(_, a)| a.as_str() == address)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.cooldowns.remove(&id);
            timers.cancel(id);
        }
    }

    fn cancel_dhcp_timer(&mut self, timers: &mut dyn TimerScheduler) {
        if let Some(id) = self.dhcp_timer.take() {
            timers.cancel(id);
        }
    }

    fn stop_roles(&mut self) {
        self.dhcp_client.stop();
        self.dhcp_server.stop();
        self.is_group_owner = false;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
