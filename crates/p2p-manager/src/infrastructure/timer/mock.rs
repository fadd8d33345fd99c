//! Manual timer scheduler for tests: timers only fire when the test says so.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::events::ManagerEvent;
use crate::application::ports::{TimerId, TimerKind, TimerScheduler};

#[derive(Debug, Default)]
struct SchedulerState {
    next_id: u64,
    pending: Vec<(TimerId, TimerKind, Duration)>,
    cancelled: Vec<TimerId>,
}

/// A [`TimerScheduler`] whose timers never expire on their own.  Clones
/// share state.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently armed, still pending timer of `kind`.
    pub fn pending_of(&self, kind: TimerKind) -> Option<TimerId> {
        self.state
            .lock()
            .expect("lock poisoned")
            .pending
            .iter()
            .rev()
            .find(|(_, k, _)| *k == kind)
            .map(|(id, _, _)| *id)
    }

    /// Number of pending timers of `kind`.
    pub fn pending_count(&self, kind: TimerKind) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .pending
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    pub fn delay_of(&self, id: TimerId) -> Option<Duration> {
        self.state
            .lock()
            .expect("lock poisoned")
            .pending
            .iter()
            .find(|(i, _, _)| *i == id)
            .map(|(_, _, d)| *d)
    }

    pub fn was_cancelled(&self, id: TimerId) -> bool {
        self.state.lock().expect("lock poisoned").cancelled.contains(&id)
    }

    /// Marks `id` as expired and returns its kind, or `None` if it is not
    /// pending.
    pub fn fire(&self, id: TimerId) -> Option<TimerKind> {
        let mut state = self.state.lock().expect("lock poisoned");
        let index = state.pending.iter().position(|(i, _, _)| *i == id)?;
        let (_, kind, _) = state.pending.remove(index);
        Some(kind)
    }

    /// Expires the latest pending timer of `kind` and returns the event the
    /// real scheduler would deliver.
    pub fn expire(&self, kind: TimerKind) -> Option<ManagerEvent> {
        let id = self.pending_of(kind)?;
        self.fire(id)?;
        Some(ManagerEvent::TimerFired { id, kind })
    }
}

impl TimerScheduler for ManualScheduler {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> TimerId {
        let mut state = self.state.lock().expect("lock poisoned");
        state.next_id += 1;
        let id = TimerId(state.next_id);
        state.pending.push((id, kind, delay));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.pending.retain(|(i, _, _)| *i != id);
        state.cancelled.push(id);
    }
}
