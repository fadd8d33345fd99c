//! Mock control link for unit and integration tests.
//!
//! Records every written line and lets tests make connects or sends fail.

use std::io;
use std::sync::{Arc, Mutex};

use crate::application::ports::{ControlLink, LinkError};

#[derive(Debug, Default)]
struct LinkState {
    connected: bool,
    sent: Vec<String>,
    connect_attempts: u32,
    disconnects: u32,
    failing_connects: u32,
    failing_sends: u32,
}

/// A [`ControlLink`] double.  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockControlLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockControlLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` connects fail.
    pub fn fail_connects(&self, count: u32) {
        self.state.lock().expect("lock poisoned").failing_connects = count;
    }

    /// Makes the next `count` sends fail.
    pub fn fail_sends(&self, count: u32) {
        self.state.lock().expect("lock poisoned").failing_sends = count;
    }

    /// Every line written so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().expect("lock poisoned").sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().expect("lock poisoned").sent.clear();
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().expect("lock poisoned").connect_attempts
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().expect("lock poisoned").disconnects
    }
}

impl ControlLink for MockControlLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(LinkError::Connect {
                path: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock refused"),
            });
        }
        state.connected = true;
        Ok(())
    }

    fn send(&mut self, line: &str) -> Result<(), LinkError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(LinkError::Send(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock send failure",
            )));
        }
        state.sent.push(line.to_string());
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.connected {
            state.disconnects += 1;
        }
        state.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().expect("lock poisoned").connected
    }
}
