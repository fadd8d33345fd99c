//! Mock supplicant process for unit and integration tests.
//!
//! Records starts and stops and lets tests simulate the child exiting
//! without spawning anything.

use std::io;
use std::sync::{Arc, Mutex};

use crate::application::ports::{ExitReport, Generation, ProcessControl, SupervisorError};

#[derive(Debug, Default)]
struct ProcessState {
    running: bool,
    generation: Generation,
    starts: u32,
    stops: u32,
    /// Number of upcoming `start` calls that fail.
    failing_starts: u32,
}

/// A [`ProcessControl`] double.  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockProcess {
    state: Arc<Mutex<ProcessState>>,
}

impl MockProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` starts fail with a spawn error.
    pub fn fail_next_starts(&self, count: u32) {
        self.state.lock().expect("lock poisoned").failing_starts = count;
    }

    /// Simulates the running child exiting and returns the report the real
    /// watch task would deliver.
    ///
    /// Panics if no child is running.
    pub fn exit(&self, success: bool) -> ExitReport {
        let mut state = self.state.lock().expect("lock poisoned");
        assert!(state.running, "MockProcess::exit called with no child running");
        state.running = false;
        ExitReport {
            generation: state.generation,
            success,
            code: Some(if success { 0 } else { 1 }),
        }
    }

    /// Number of `start` calls, successful or not.
    pub fn start_count(&self) -> u32 {
        self.state.lock().expect("lock poisoned").starts
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().expect("lock poisoned").stops
    }
}

impl ProcessControl for MockProcess {
    fn start(&mut self) -> Result<Generation, SupervisorError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.starts += 1;
        if state.running {
            return Err(SupervisorError::AlreadyRunning);
        }
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(SupervisorError::Spawn {
                binary: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock spawn failure"),
            });
        }
        state.generation += 1;
        state.running = true;
        Ok(state.generation)
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.stops += 1;
        state.running = false;
    }

    fn is_running(&self) -> bool {
        self.state.lock().expect("lock poisoned").running
    }
}
