//! SupplicantManager: keeps the supplicant alive and drives it.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! setup()
//!  └─ start child ──(connect delay)──► connect control socket
//!         ▲                              │ ok: ATTACH, SET wifi_display 1,
//!         │                              │     WFD_SUBELEM_SET ..., budget refilled
//!         │                              │ err: retry after the connect delay
//!         │                              ▼
//!         │                         events / responses
//!         │
//!  respawn timer ◄── abnormal exit or hang-up (budget > 0: schedule, decrement)
//!                         └─ close channel, stop child, reset peers
//! ```
//!
//! The respawn budget is refilled only by a successful control connection
//! (or an explicit [`SupplicantManager::setup`]), so a child that keeps dying
//! before it ever answers eventually stops being restarted.
//!
//! # Dispatch
//!
//! Everything happens inside [`SupplicantManager::handle_event`], one
//! [`ManagerEvent`] at a time.  [`SupplicantManager::run`] is a thin loop
//! feeding it from a channel; tests call `handle_event` directly.

use std::net::Ipv4Addr;
use std::time::Duration;

use p2p_core::{DeviceAddress, NetworkDevice, SupplicantEvent, SupplicantMessage};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use super::command_queue::{CommandQueue, Completion, Routed};
use super::events::{ManagerCommand, ManagerEvent};
use super::manage_peers::{ConnectError, PeerStateMachine};
use super::ports::{
    ControlLink, ExitReport, Generation, ProcessControl, SupervisorError, TimerId, TimerKind,
    TimerScheduler,
};

/// Errors returned by fire-and-forget requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("supplicant control channel is not connected")]
    NotConnected,

    /// The request could not be written; its continuation already ran with
    /// a failure response.
    #[error("failed to send request to supplicant")]
    Send,
}

/// Supervision policy and connect-time configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// P2P interface, used by `P2P_GROUP_REMOVE`.
    pub interface: String,
    /// Automatic respawns allowed before recovery stops.
    pub respawn_limit: u32,
    pub respawn_interval: Duration,
    /// Delay between spawn and each control-socket connect attempt.
    pub connect_delay: Duration,
    /// Hex sub-elements advertised with `WFD_SUBELEM_SET <index> <hex>`.
    pub wfd_subelements: Vec<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            interface: "p2p0".to_string(),
            respawn_limit: 10,
            respawn_interval: Duration::from_millis(2000),
            connect_delay: Duration::from_millis(500),
            wfd_subelements: vec!["000600101C440032".to_string()],
        }
    }
}

/// What to do with the response to a queued request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Attach,
    Connect { address: DeviceAddress },
    /// Only log a failure, naming the request.
    Log(&'static str),
}

pub struct SupplicantManager {
    settings: ManagerSettings,
    process: Box<dyn ProcessControl>,
    link: Box<dyn ControlLink>,
    timers: Box<dyn TimerScheduler>,
    queue: CommandQueue<Pending>,
    peers: PeerStateMachine,
    respawn_budget: u32,
    respawn_timer: Option<TimerId>,
    connect_timer: Option<TimerId>,
    /// Generation of the child we are watching, if one was started.
    generation: Option<Generation>,
}

impl SupplicantManager {
    pub fn new(
        settings: ManagerSettings,
        process: Box<dyn ProcessControl>,
        link: Box<dyn ControlLink>,
        timers: Box<dyn TimerScheduler>,
        peers: PeerStateMachine,
    ) -> Self {
        let respawn_budget = settings.respawn_limit;
        Self {
            settings,
            process,
            link,
            timers,
            queue: CommandQueue::new(),
            peers,
            respawn_budget,
            respawn_timer: None,
            connect_timer: None,
            generation: None,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn devices(&self) -> Vec<NetworkDevice> {
        self.peers.devices()
    }

    pub fn peers(&self) -> &PeerStateMachine {
        &self.peers
    }

    pub fn local_address(&self) -> Option<Ipv4Addr> {
        self.peers.local_address()
    }

    /// `true` while the supervised child is alive.
    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn respawn_budget(&self) -> u32 {
        self.respawn_budget
    }

    /// `true` while an automatic respawn is scheduled.
    pub fn respawn_pending(&self) -> bool {
        self.respawn_timer.is_some()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Refills the respawn budget and starts the supplicant.
    ///
    /// # Errors
    ///
    /// Returns the [`SupervisorError`] of the failed start.  No automatic
    /// respawn is scheduled for it; the caller may call `setup` again.
    pub fn setup(&mut self) -> Result<(), SupervisorError> {
        info!("setting up supplicant on {}", self.settings.interface);
        self.respawn_budget = self.settings.respawn_limit;
        self.cancel_timer(TimerKind::Respawn);
        self.start_supplicant().map_err(|e| {
            warn!("failed to start supplicant: {e}");
            e
        })
    }

    /// Resets all peers, closes the channel and stops the child.
    pub fn release(&mut self) {
        info!("releasing supplicant");
        self.peers.reset(self.timers.as_mut());
        self.disconnect_link();
        self.cancel_timer(TimerKind::ConnectControl);
        self.cancel_timer(TimerKind::Respawn);
        self.process.stop();
        self.generation = None;
    }

    fn start_supplicant(&mut self) -> Result<(), SupervisorError> {
        let generation = self.process.start()?;
        debug!("supplicant generation {generation} started");
        self.generation = Some(generation);
        self.arm_connect_timer();
        Ok(())
    }

    fn arm_connect_timer(&mut self) {
        self.cancel_timer(TimerKind::ConnectControl);
        self.connect_timer = Some(
            self.timers
                .schedule(TimerKind::ConnectControl, self.settings.connect_delay),
        );
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        let slot = match kind {
            TimerKind::ConnectControl => &mut self.connect_timer,
            TimerKind::Respawn => &mut self.respawn_timer,
            TimerKind::DhcpTimeout | TimerKind::PeerFailureCooldown => return,
        };
        if let Some(id) = slot.take() {
            self.timers.cancel(id);
        }
    }

    fn disconnect_link(&mut self) {
        self.link.disconnect();
        self.queue.clear();
    }

    /// Abnormal exit or hang-up: schedule a respawn while budget remains,
    /// then tear everything down.
    fn handle_failure(&mut self) {
        if self.respawn_budget > 0 {
            self.cancel_timer(TimerKind::Respawn);
            self.respawn_timer = Some(
                self.timers
                    .schedule(TimerKind::Respawn, self.settings.respawn_interval),
            );
            self.respawn_budget -= 1;
            info!(
                "supplicant respawn scheduled, {} attempt(s) left",
                self.respawn_budget
            );
        } else {
            error!("supplicant respawn budget exhausted; staying down until setup");
        }

        self.disconnect_link();
        self.cancel_timer(TimerKind::ConnectControl);
        self.process.stop();
        self.generation = None;
        self.peers.reset(self.timers.as_mut());
    }

    fn on_process_exited(&mut self, report: ExitReport) {
        if self.generation != Some(report.generation) {
            debug!("ignoring exit of stale generation {}", report.generation);
            return;
        }

        if report.success {
            info!("supplicant exited cleanly");
            self.generation = None;
            return;
        }

        warn!("supplicant exited abnormally (code {:?})", report.code);
        self.handle_failure();
    }

    fn on_channel_hangup(&mut self) {
        if !self.link.is_connected() {
            debug!("hang-up on a closed control channel");
            return;
        }
        warn!("control channel hung up");
        self.handle_failure();
    }

    fn on_connect_timer(&mut self, id: TimerId) {
        if self.connect_timer != Some(id) {
            debug!("stale connect timer {id}");
            return;
        }
        self.connect_timer = None;

        if !self.process.is_running() {
            debug!("supplicant is not running; not connecting");
            return;
        }

        match self.link.connect() {
            Ok(()) => self.on_link_connected(),
            Err(e) => {
                debug!("control connect failed, retrying: {e}");
                self.arm_connect_timer();
            }
        }
    }

    fn on_link_connected(&mut self) {
        info!("connected to supplicant control channel");
        self.respawn_budget = self.settings.respawn_limit;

        self.request(SupplicantMessage::request("ATTACH"), Pending::Attach);
        self.request(
            SupplicantMessage::request("SET").arg("wifi_display").arg(1u32),
            Pending::Log("enable wifi display"),
        );
        for (index, element) in self.settings.wfd_subelements.clone().into_iter().enumerate() {
            self.request(
                SupplicantMessage::request("WFD_SUBELEM_SET")
                    .arg(index)
                    .arg(element),
                Pending::Log("set display sub-element"),
            );
        }
    }

    fn on_respawn_timer(&mut self, id: TimerId) {
        if self.respawn_timer != Some(id) {
            debug!("stale respawn timer {id}");
            return;
        }
        self.respawn_timer = None;

        if self.process.is_running() {
            debug!("supplicant already running; skipping respawn");
            return;
        }

        match self.start_supplicant() {
            Ok(()) => info!("supplicant respawned"),
            Err(e) if self.respawn_budget > 0 => {
                self.respawn_budget -= 1;
                warn!(
                    "respawn failed ({e}), retrying, {} attempt(s) left",
                    self.respawn_budget
                );
                self.respawn_timer = Some(
                    self.timers
                        .schedule(TimerKind::Respawn, self.settings.respawn_interval),
                );
            }
            Err(e) => error!("respawn failed ({e}) and the budget is exhausted"),
        }
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Starts a connection attempt to a discovered device.
    ///
    /// Success means the request was accepted for sending; the formation
    /// outcome arrives later through group events.
    ///
    /// # Errors
    ///
    /// [`ConnectError::NotConnected`] when the control channel is down,
    /// [`ConnectError::Send`] when the request could not be written (the peer
    /// is already in `Failure` and cooling down), or the rejection from
    /// [`PeerStateMachine::begin_connect`].
    pub fn connect(&mut self, address: &str) -> Result<(), ConnectError> {
        if !self.link.is_connected() {
            return Err(ConnectError::NotConnected);
        }
        self.peers.begin_connect(address)?;
        let sent = self.request(
            SupplicantMessage::request("P2P_CONNECT").arg(address).arg("pbc"),
            Pending::Connect {
                address: address.to_string(),
            },
        );
        if !sent {
            return Err(ConnectError::Send);
        }
        Ok(())
    }

    /// Starts peer discovery for `timeout_secs`.
    pub fn scan(&mut self, timeout_secs: u32) -> Result<(), RequestError> {
        if !self.link.is_connected() {
            return Err(RequestError::NotConnected);
        }
        if !self.request(
            SupplicantMessage::request("P2P_FIND").arg(timeout_secs),
            Pending::Log("scan"),
        ) {
            return Err(RequestError::Send);
        }
        Ok(())
    }

    /// Tears down the group on the configured interface.
    pub fn disconnect_all(&mut self) -> Result<(), RequestError> {
        if !self.link.is_connected() {
            return Err(RequestError::NotConnected);
        }
        let interface = self.settings.interface.clone();
        if !self.request(
            SupplicantMessage::request("P2P_GROUP_REMOVE").arg(interface),
            Pending::Log("remove group"),
        ) {
            return Err(RequestError::Send);
        }
        Ok(())
    }

    /// Queues `message` and returns `false` when its own write failed.
    ///
    /// Completions for failed writes run before this returns.
    fn request(&mut self, message: SupplicantMessage, pending: Pending) -> bool {
        let link = &mut self.link;
        let failed = self.queue.enqueue(&message, pending, |line| link.send(line));
        // Writes only happen when nothing was in flight, and then the queue
        // held just this request.
        let sent = failed.is_empty();
        for completion in failed {
            self.complete(completion);
        }
        sent
    }

    fn complete(&mut self, completion: Completion<Pending>) {
        let Completion {
            continuation,
            request,
            response,
        } = completion;
        let failed = response.is_fail();

        match continuation {
            Pending::Attach if failed => {
                warn!("failed to attach for unsolicited events: {}", response.raw())
            }
            Pending::Attach => debug!("attached to supplicant events"),
            Pending::Connect { address } if failed => {
                warn!("failed to connect with {address}: {}", response.raw());
                self.peers.connect_rejected(&address, self.timers.as_mut());
            }
            Pending::Connect { address } => debug!("connect request for {address} accepted"),
            Pending::Log(what) if failed => warn!("{what} failed ({request}): {}", response.raw()),
            Pending::Log(_) => {}
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Handles one event.  Returns `false` once the loop should stop.
    pub fn handle_event(&mut self, event: ManagerEvent) -> bool {
        match event {
            ManagerEvent::ProcessExited(report) => self.on_process_exited(report),
            ManagerEvent::ControlLine(line) => self.on_control_line(&line),
            ManagerEvent::ChannelHangup => self.on_channel_hangup(),
            ManagerEvent::TimerFired { id, kind } => self.on_timer(id, kind),
            ManagerEvent::AddressAssigned(address) => {
                self.peers.on_address_assigned(address, self.timers.as_mut())
            }
            ManagerEvent::Command(command) => self.on_command(command),
            ManagerEvent::Shutdown => {
                info!("shutdown requested");
                return false;
            }
        }
        true
    }

    /// Consumes events until [`ManagerEvent::Shutdown`] or until every
    /// sender is gone, then releases all resources.
    pub async fn run(&mut self, events: &mut UnboundedReceiver<ManagerEvent>) {
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        self.release();
    }

    fn on_control_line(&mut self, line: &str) {
        let message = SupplicantMessage::parse(line);
        let link = &mut self.link;
        match self.queue.handle_message(message, |l| link.send(l)) {
            Routed::Event(message) => self.on_supplicant_event(&message),
            Routed::Completed(completions) => {
                for completion in completions {
                    self.complete(completion);
                }
            }
            Routed::Dropped => {}
        }
    }

    fn on_supplicant_event(&mut self, message: &SupplicantMessage) {
        match SupplicantEvent::decode(message) {
            Ok(Some(event)) => self.peers.handle_event(event, self.timers.as_mut()),
            Ok(None) => debug!("unhandled supplicant event: {}", message.raw()),
            Err(e) => warn!("malformed supplicant event: {e}"),
        }
    }

    fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        match kind {
            TimerKind::ConnectControl => self.on_connect_timer(id),
            TimerKind::Respawn => self.on_respawn_timer(id),
            TimerKind::DhcpTimeout | TimerKind::PeerFailureCooldown => {
                self.peers.on_timer(id, kind, self.timers.as_mut());
            }
        }
    }

    fn on_command(&mut self, command: ManagerCommand) {
        let result = match command {
            ManagerCommand::Scan { timeout_secs } => {
                self.scan(timeout_secs).map_err(|e| e.to_string())
            }
            ManagerCommand::Connect { address } => {
                self.connect(&address).map_err(|e| e.to_string())
            }
            ManagerCommand::DisconnectAll => self.disconnect_all().map_err(|e| e.to_string()),
        };
        if let Err(e) = result {
            warn!("command failed: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::delegate::{ChannelDelegate, DelegateEvent};
    use crate::application::manage_peers::PeerSettings;
    use crate::infrastructure::control::mock::MockControlLink;
    use crate::infrastructure::dhcp::mock::RecordingAddressRole;
    use crate::infrastructure::supervisor::mock::MockProcess;
    use crate::infrastructure::timer::mock::ManualScheduler;
    use tokio::sync::mpsc;

    struct Harness {
        manager: SupplicantManager,
        process: MockProcess,
        link: MockControlLink,
        timers: ManualScheduler,
        delegate_rx: mpsc::UnboundedReceiver<DelegateEvent>,
    }

    fn harness() -> Harness {
        let process = MockProcess::new();
        let link = MockControlLink::new();
        let timers = ManualScheduler::new();
        let (tx, delegate_rx) = mpsc::unbounded_channel();
        let peers = PeerStateMachine::new(
            PeerSettings::default(),
            Box::new(ChannelDelegate::new(tx)),
            Box::new(RecordingAddressRole::new()),
            Box::new(RecordingAddressRole::new()),
        );
        let manager = SupplicantManager::new(
            ManagerSettings::default(),
            Box::new(process.clone()),
            Box::new(link.clone()),
            Box::new(timers.clone()),
            peers,
        );
        Harness {
            manager,
            process,
            link,
            timers,
            delegate_rx,
        }
    }

    fn fire(h: &mut Harness, kind: TimerKind) {
        let id = h.timers.pending_of(kind).expect("armed timer");
        h.timers.fire(id);
        h.manager.handle_event(ManagerEvent::TimerFired { id, kind });
    }

    #[test]
    fn test_manager_settings_defaults() {
        let settings = ManagerSettings::default();
        assert_eq!(settings.respawn_limit, 10);
        assert_eq!(settings.respawn_interval, Duration::from_millis(2000));
        assert_eq!(settings.connect_delay, Duration::from_millis(500));
        assert_eq!(settings.wfd_subelements, vec!["000600101C440032"]);
    }

    #[test]
    fn test_connect_sequence_after_spawn() {
        // Arrange
        let mut h = harness();

        // Act
        h.manager.setup().expect("setup");
        fire(&mut h, TimerKind::ConnectControl);
        for _ in 0..2 {
            h.manager.handle_event(ManagerEvent::ControlLine("OK".into()));
        }

        // Assert
        assert_eq!(
            h.link.sent(),
            vec!["ATTACH", "SET wifi_display 1", "WFD_SUBELEM_SET 0 000600101C440032"]
        );
    }

    #[test]
    fn test_connect_retries_until_link_accepts() {
        let mut h = harness();
        h.link.fail_connects(2);
        h.manager.setup().expect("setup");

        for _ in 0..3 {
            fire(&mut h, TimerKind::ConnectControl);
        }

        assert!(h.manager.is_connected());
        assert_eq!(h.link.connect_attempts(), 3);
    }

    #[test]
    fn test_requests_need_a_connected_channel() {
        let mut h = harness();

        assert_eq!(h.manager.scan(30), Err(RequestError::NotConnected));
        assert_eq!(h.manager.disconnect_all(), Err(RequestError::NotConnected));
        assert_eq!(h.manager.connect("aa"), Err(ConnectError::NotConnected));
    }

    #[test]
    fn test_request_write_failure_is_reported_to_the_caller() {
        // Arrange: connected with the handshake acknowledged
        let mut h = harness();
        h.manager.setup().expect("setup");
        fire(&mut h, TimerKind::ConnectControl);
        for _ in 0..3 {
            h.manager.handle_event(ManagerEvent::ControlLine("OK".into()));
        }
        h.link.fail_sends(2);

        // Act
        let scan = h.manager.scan(30);
        let remove = h.manager.disconnect_all();
        let retry = h.manager.scan(30);

        // Assert
        assert_eq!(scan, Err(RequestError::Send));
        assert_eq!(remove, Err(RequestError::Send));
        assert_eq!(retry, Ok(()));
        assert_eq!(h.link.sent().last().map(String::as_str), Some("P2P_FIND 30"));
    }

    #[test]
    fn test_shutdown_event_stops_dispatch() {
        let mut h = harness();
        assert!(!h.manager.handle_event(ManagerEvent::Shutdown));
    }

    #[test]
    fn test_release_stops_child_and_closes_link() {
        let mut h = harness();
        h.manager.setup().expect("setup");
        fire(&mut h, TimerKind::ConnectControl);
        h.manager.handle_event(ManagerEvent::ControlLine(
            "<3>P2P-DEVICE-FOUND aa:bb:cc:dd:ee:ff".into(),
        ));

        h.manager.release();

        assert!(!h.manager.is_running());
        assert!(!h.manager.is_connected());
        assert!(h.manager.devices().is_empty());
        assert!(matches!(h.delegate_rx.try_recv(), Ok(DelegateEvent::Found(_))));
        assert!(matches!(h.delegate_rx.try_recv(), Ok(DelegateEvent::Lost(_))));
        assert_eq!(h.process.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_run_releases_on_shutdown() {
        // Arrange
        let mut h = harness();
        h.manager.setup().expect("setup");
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ManagerEvent::Command(ManagerCommand::Scan { timeout_secs: 5 }))
            .expect("send");
        tx.send(ManagerEvent::Shutdown).expect("send");

        // Act
        h.manager.run(&mut rx).await;

        // Assert
        assert!(!h.manager.is_running());
        assert!(h.link.sent().is_empty());
    }
}
