//! Shared rig for the p2p-manager integration tests.
//!
//! Builds a [`SupplicantManager`] on top of the public mock infrastructure
//! and keeps clones of every mock so tests can inspect what happened.

#![allow(dead_code)]

use std::net::Ipv4Addr;

use p2p_manager::application::delegate::{ChannelDelegate, DelegateEvent};
use p2p_manager::application::events::ManagerEvent;
use p2p_manager::application::manage_peers::{PeerSettings, PeerStateMachine};
use p2p_manager::application::ports::TimerKind;
use p2p_manager::application::supervise_supplicant::{ManagerSettings, SupplicantManager};
use p2p_manager::infrastructure::control::mock::MockControlLink;
use p2p_manager::infrastructure::dhcp::mock::RecordingAddressRole;
use p2p_manager::infrastructure::supervisor::mock::MockProcess;
use p2p_manager::infrastructure::timer::mock::ManualScheduler;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const PEER: &str = "4e:74:03:70:e2:c1";
pub const OTHER: &str = "aa:bb:cc:dd:ee:ff";

pub struct Rig {
    pub manager: SupplicantManager,
    pub process: MockProcess,
    pub link: MockControlLink,
    pub timers: ManualScheduler,
    pub client: RecordingAddressRole,
    pub server: RecordingAddressRole,
    delegate: UnboundedReceiver<DelegateEvent>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_settings(ManagerSettings::default(), PeerSettings::default())
    }

    pub fn with_settings(settings: ManagerSettings, peer_settings: PeerSettings) -> Self {
        let process = MockProcess::new();
        let link = MockControlLink::new();
        let timers = ManualScheduler::new();
        let client = RecordingAddressRole::with_address(Ipv4Addr::new(192, 168, 7, 5));
        let server = RecordingAddressRole::with_address(Ipv4Addr::new(192, 168, 7, 1));
        let (tx, delegate) = mpsc::unbounded_channel();

        let peers = PeerStateMachine::new(
            peer_settings,
            Box::new(ChannelDelegate::new(tx)),
            Box::new(client.clone()),
            Box::new(server.clone()),
        );
        let manager = SupplicantManager::new(
            settings,
            Box::new(process.clone()),
            Box::new(link.clone()),
            Box::new(timers.clone()),
            peers,
        );

        Self {
            manager,
            process,
            link,
            timers,
            client,
            server,
            delegate,
        }
    }

    /// Spawns the child, connects the control channel and acknowledges the
    /// start-up requests, leaving an idle queue and a clean record.
    pub fn connected() -> Self {
        let mut rig = Self::new();
        rig.bring_up();
        rig
    }

    pub fn bring_up(&mut self) {
        self.manager.setup().expect("setup");
        self.expire(TimerKind::ConnectControl);
        assert!(self.manager.is_connected(), "control channel should be up");
        while self.link.sent().len() < 3 {
            self.line("OK");
        }
        self.line("OK");
        self.link.clear_sent();
        self.drain();
    }

    pub fn line(&mut self, line: &str) {
        self.manager
            .handle_event(ManagerEvent::ControlLine(line.to_string()));
    }

    /// Expires the latest pending timer of `kind`.  Panics if none is armed.
    pub fn expire(&mut self, kind: TimerKind) {
        let event = self
            .timers
            .expire(kind)
            .unwrap_or_else(|| panic!("no pending {kind:?} timer"));
        self.manager.handle_event(event);
    }

    pub fn found(&mut self, address: &str, name: &str) {
        self.line(&format!(
            "<3>P2P-DEVICE-FOUND {address} p2p_dev_addr={address} name='{name}' config_methods=0x188"
        ));
    }

    /// Every delegate notification since the last drain.
    pub fn drain(&mut self) -> Vec<DelegateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.delegate.try_recv() {
            events.push(event);
        }
        events
    }
}

/// `(kind, address, state)` triples for compact assertions.
pub fn summarize(events: &[DelegateEvent]) -> Vec<(&'static str, String, String)> {
    events
        .iter()
        .map(|e| {
            let kind = match e {
                DelegateEvent::Found(_) => "found",
                DelegateEvent::Lost(_) => "lost",
                DelegateEvent::StateChanged(_) => "state",
            };
            (kind, e.device().address.clone(), e.state().to_string())
        })
        .collect()
}
