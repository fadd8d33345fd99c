//! Recording address role for tests.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use crate::application::ports::AddressRole;

#[derive(Debug, Default)]
struct RoleState {
    starts: u32,
    stops: u32,
    address: Option<Ipv4Addr>,
}

/// An [`AddressRole`] that counts starts and stops.  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingAddressRole {
    state: Arc<Mutex<RoleState>>,
}

impl RecordingAddressRole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: Ipv4Addr) -> Self {
        let role = Self::new();
        role.set_address(Some(address));
        role
    }

    pub fn set_address(&self, address: Option<Ipv4Addr>) {
        self.state.lock().expect("lock poisoned").address = address;
    }

    pub fn start_count(&self) -> u32 {
        self.state.lock().expect("lock poisoned").starts
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().expect("lock poisoned").stops
    }
}

impl AddressRole for RecordingAddressRole {
    fn start(&mut self) {
        self.state.lock().expect("lock poisoned").starts += 1;
    }

    fn stop(&mut self) {
        self.state.lock().expect("lock poisoned").stops += 1;
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        self.state.lock().expect("lock poisoned").address
    }
}
