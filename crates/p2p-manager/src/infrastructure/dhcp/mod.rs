//! Address-role collaborators.
//!
//! Running a real DHCP client or server is outside this crate.  The
//! [`StaticAddressRole`] stands in for both sides with configured addresses:
//! the serving side reports its own address while active, and the
//! requesting side reports a fixed lease as soon as it starts (or never, if
//! none is configured, in which case acquisition times out).

pub mod mock;

use std::net::Ipv4Addr;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::application::events::ManagerEvent;
use crate::application::ports::AddressRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Serving,
    Requesting,
}

pub struct StaticAddressRole {
    side: Side,
    address: Option<Ipv4Addr>,
    events: Option<UnboundedSender<ManagerEvent>>,
    active: bool,
}

impl StaticAddressRole {
    /// The group-owner side, serving from `address`.
    pub fn server(address: Ipv4Addr) -> Self {
        Self {
            side: Side::Serving,
            address: Some(address),
            events: None,
            active: false,
        }
    }

    /// The group-client side.  `lease` is reported as assigned on start.
    pub fn client(lease: Option<Ipv4Addr>, events: UnboundedSender<ManagerEvent>) -> Self {
        Self {
            side: Side::Requesting,
            address: lease,
            events: Some(events),
            active: false,
        }
    }
}

impl AddressRole for StaticAddressRole {
    fn start(&mut self) {
        self.active = true;
        match (self.side, self.address, &self.events) {
            (Side::Serving, Some(address), _) => info!("serving addresses from {address}"),
            (Side::Requesting, Some(lease), Some(events)) => {
                info!("using static lease {lease}");
                let _ = events.send(ManagerEvent::AddressAssigned(lease));
            }
            _ => info!("waiting for an address lease"),
        }
    }

    fn stop(&mut self) {
        if self.active {
            debug!("stopping {:?} address role", self.side);
        }
        self.active = false;
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        if self.active {
            self.address
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_server_reports_address_only_while_active() {
        let mut role = StaticAddressRole::server(Ipv4Addr::new(192, 168, 7, 1));
        assert_eq!(role.local_address(), None);

        role.start();
        assert_eq!(role.local_address(), Some(Ipv4Addr::new(192, 168, 7, 1)));

        role.stop();
        assert_eq!(role.local_address(), None);
    }

    #[test]
    fn test_client_with_lease_reports_assignment_on_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut role = StaticAddressRole::client(Some(Ipv4Addr::new(192, 168, 7, 5)), tx);

        role.start();

        assert_eq!(
            rx.try_recv().ok(),
            Some(ManagerEvent::AddressAssigned(Ipv4Addr::new(192, 168, 7, 5)))
        );
    }

    #[test]
    fn test_client_without_lease_never_assigns() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut role = StaticAddressRole::client(None, tx);

        role.start();

        assert!(rx.try_recv().is_err());
        assert_eq!(role.local_address(), None);
    }
}
