//! Cancellable one-shot timers on the tokio runtime.
//!
//! Each timer is a spawned task that sleeps and then pushes
//! `ManagerEvent::TimerFired` into the dispatch queue.  Cancelling aborts the
//! task.  A timer that already fired before being cancelled still delivers
//! its event; the application recognises such stale ids itself.

pub mod mock;

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::application::events::ManagerEvent;
use crate::application::ports::{TimerId, TimerKind, TimerScheduler};

pub struct TokioScheduler {
    events: UnboundedSender<ManagerEvent>,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: UnboundedSender<ManagerEvent>) -> Self {
        Self {
            events,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    /// Number of timers armed and not yet expired.
    pub fn armed(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> TimerId {
        self.tasks.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let events = self.events.clone();
        trace!("arming {id} ({kind:?}) for {delay:?}");

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ManagerEvent::TimerFired { id, kind });
        });
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            trace!("cancelling {id}");
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_scheduled_timer_fires_with_id_and_kind() {
        // Arrange
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioScheduler::new(tx);

        // Act
        let id = timers.schedule(TimerKind::Respawn, Duration::from_millis(10));
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fired in time");

        // Assert
        assert_eq!(
            event,
            Some(ManagerEvent::TimerFired {
                id,
                kind: TimerKind::Respawn
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_timer_does_not_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioScheduler::new(tx);

        let cancelled = timers.schedule(TimerKind::DhcpTimeout, Duration::from_millis(20));
        let kept = timers.schedule(TimerKind::ConnectControl, Duration::from_millis(60));
        timers.cancel(cancelled);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fired in time");
        assert_eq!(
            event,
            Some(ManagerEvent::TimerFired {
                id: kept,
                kind: TimerKind::ConnectControl
            })
        );
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = TokioScheduler::new(tx);

        let a = timers.schedule(TimerKind::Respawn, Duration::from_secs(60));
        let b = timers.schedule(TimerKind::Respawn, Duration::from_secs(60));

        assert_ne!(a, b);
        assert_eq!(timers.armed(), 2);
    }
}
