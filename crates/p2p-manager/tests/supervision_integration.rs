//! Integration tests for supplicant supervision and request correlation.
//!
//! # Purpose
//!
//! These tests drive a [`SupplicantManager`] through its public API and
//! `handle_event`, exactly as the dispatch loop does, with mock process,
//! control link and timers.  They verify:
//!
//! - The start-up handshake written after the control channel connects.
//! - Strict FIFO correlation of responses with queued requests.
//! - The respawn policy: budget, decrement, refill on a healthy connection,
//!   and exhaustion.
//! - The full reset performed when the child dies or the channel hangs up.
//!
//! Timers never fire on their own: each test expires them explicitly through
//! the [`ManualScheduler`](p2p_manager::infrastructure::timer::mock::ManualScheduler).

mod common;

use common::{summarize, Rig, OTHER, PEER};
use p2p_manager::application::events::{ManagerCommand, ManagerEvent};
use p2p_manager::application::manage_peers::{ConnectError, PeerSettings};
use p2p_manager::application::ports::TimerKind;
use p2p_manager::application::supervise_supplicant::ManagerSettings;
use tokio::sync::mpsc;

// ── Start-up ──────────────────────────────────────────────────────────────────

#[test]
fn test_startup_handshake_is_written_one_request_at_a_time() {
    // Arrange
    let mut rig = Rig::new();
    rig.manager.setup().expect("setup");

    // Act: connect timer fires, then each request is acknowledged
    rig.expire(TimerKind::ConnectControl);
    let after_connect = rig.link.sent();
    rig.line("OK");
    let after_first_ok = rig.link.sent();
    rig.line("OK");

    // Assert
    assert_eq!(after_connect, vec!["ATTACH"]);
    assert_eq!(after_first_ok, vec!["ATTACH", "SET wifi_display 1"]);
    assert_eq!(
        rig.link.sent(),
        vec!["ATTACH", "SET wifi_display 1", "WFD_SUBELEM_SET 0 000600101C440032"]
    );
}

#[test]
fn test_connect_attempts_repeat_while_child_runs() {
    let mut rig = Rig::new();
    rig.link.fail_connects(3);
    rig.manager.setup().expect("setup");

    for _ in 0..4 {
        rig.expire(TimerKind::ConnectControl);
    }

    assert!(rig.manager.is_connected());
    assert_eq!(rig.link.connect_attempts(), 4);
    assert_eq!(rig.timers.pending_count(TimerKind::ConnectControl), 0);
}

#[test]
fn test_connect_attempts_stop_once_child_is_gone() {
    let mut rig = Rig::new();
    rig.link.fail_connects(1);
    rig.manager.setup().expect("setup");
    rig.expire(TimerKind::ConnectControl);

    // The child dies cleanly between attempts.
    let report = rig.process.exit(true);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));
    rig.expire(TimerKind::ConnectControl);

    assert_eq!(rig.link.connect_attempts(), 1);
    assert!(!rig.manager.is_connected());
}

// ── FIFO correlation ──────────────────────────────────────────────────────────

#[test]
fn test_requests_queued_before_any_response_complete_in_order() {
    // Arrange
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");
    rig.drain();

    // Act: three requests before any response
    rig.manager.scan(30).expect("scan");
    rig.manager.connect(PEER).expect("connect");
    rig.manager.disconnect_all().expect("disconnect");
    let written_before_responses = rig.link.sent();

    rig.line("OK"); // scan
    rig.line("FAIL"); // connect
    let notes = rig.drain();
    rig.line("OK"); // group remove

    // Assert
    let connect = format!("P2P_CONNECT {PEER} pbc");
    assert_eq!(written_before_responses, vec!["P2P_FIND 30"]);
    assert_eq!(
        rig.link.sent(),
        vec!["P2P_FIND 30", connect.as_str(), "P2P_GROUP_REMOVE p2p0"]
    );
    // Only the FAIL answering P2P_CONNECT failed the peer.
    assert_eq!(
        summarize(&notes),
        vec![("state", PEER.to_string(), "failure".to_string())]
    );
}

#[test]
fn test_events_interleave_with_pending_responses() {
    let mut rig = Rig::connected();
    rig.manager.scan(10).expect("scan");

    rig.found(PEER, "tv");
    rig.line("OK");
    rig.manager.scan(10).expect("scan");

    assert_eq!(rig.manager.devices().len(), 1);
    assert_eq!(rig.link.sent(), vec!["P2P_FIND 10", "P2P_FIND 10"]);
}

#[test]
fn test_connect_write_failure_is_reported_and_fails_the_peer() {
    // Arrange
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");
    rig.drain();
    rig.link.fail_sends(1);

    // Act
    let accepted = rig.manager.connect(PEER);

    // Assert: rejected to the caller, and failed through its continuation
    assert_eq!(accepted, Err(ConnectError::Send));
    assert_eq!(
        summarize(&rig.drain()),
        vec![("state", PEER.to_string(), "failure".to_string())]
    );
    assert!(rig.link.sent().is_empty());
    assert_eq!(rig.timers.pending_count(TimerKind::PeerFailureCooldown), 1);
}

#[test]
fn test_unsolicited_response_is_dropped() {
    let mut rig = Rig::connected();

    rig.line("OK");
    rig.manager.scan(5).expect("scan");

    assert_eq!(rig.link.sent(), vec!["P2P_FIND 5"]);
}

// ── Connect preconditions ─────────────────────────────────────────────────────

#[test]
fn test_connect_unknown_device_is_rejected_without_sending() {
    let mut rig = Rig::connected();

    let result = rig.manager.connect(PEER);

    assert_eq!(result, Err(ConnectError::UnknownDevice(PEER.to_string())));
    assert!(rig.link.sent().is_empty());
}

#[test]
fn test_second_connect_while_one_is_current_is_rejected() {
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");
    rig.found(OTHER, "phone");
    rig.manager.connect(PEER).expect("connect");

    let result = rig.manager.connect(OTHER);

    assert_eq!(result, Err(ConnectError::Busy(PEER.to_string())));
    assert_eq!(rig.link.sent().len(), 1);
}

#[test]
fn test_commands_arrive_through_the_event_queue() {
    let mut rig = Rig::connected();

    rig.manager
        .handle_event(ManagerEvent::Command(ManagerCommand::Scan { timeout_secs: 15 }));
    rig.line("OK");
    rig.manager
        .handle_event(ManagerEvent::Command(ManagerCommand::DisconnectAll));

    assert_eq!(rig.link.sent(), vec!["P2P_FIND 15", "P2P_GROUP_REMOVE p2p0"]);
}

// ── Failure and reset ─────────────────────────────────────────────────────────

#[test]
fn test_abnormal_exit_while_connected_resets_everything() {
    // Arrange: PEER connected as group owner, OTHER merely discovered
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");
    rig.found(OTHER, "phone");
    rig.manager.connect(PEER).expect("connect");
    rig.line("OK");
    rig.line("<3>P2P-GROUP-STARTED p2p0 GO ssid=\"DIRECT-hB\" freq=2412");
    assert!(rig.manager.peers().is_group_owner());
    rig.drain();

    // Act
    let report = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));

    // Assert
    assert_eq!(
        summarize(&rig.drain()),
        vec![
            ("state", PEER.to_string(), "disconnected".to_string()),
            ("lost", PEER.to_string(), "disconnected".to_string()),
            ("lost", OTHER.to_string(), "idle".to_string()),
        ]
    );
    assert!(rig.manager.devices().is_empty());
    assert!(!rig.manager.peers().is_group_owner());
    assert!(!rig.manager.is_connected());
    assert!(rig.manager.respawn_pending());
    assert_eq!(rig.manager.respawn_budget(), 9);
    assert_eq!(rig.server.stop_count(), 1);
}

#[test]
fn test_clean_exit_does_not_respawn() {
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");

    let report = rig.process.exit(true);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));

    assert!(!rig.manager.respawn_pending());
    assert_eq!(rig.manager.respawn_budget(), 10);
    assert_eq!(rig.manager.devices().len(), 1);
}

#[test]
fn test_exit_of_stale_generation_is_ignored() {
    let mut rig = Rig::connected();
    let old = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(old));
    rig.expire(TimerKind::Respawn);

    // The report for the generation that already failed arrives again.
    rig.manager.handle_event(ManagerEvent::ProcessExited(old));

    assert!(rig.manager.is_running());
    assert!(!rig.manager.respawn_pending());
}

#[test]
fn test_hangup_on_connected_channel_takes_failure_path() {
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");
    rig.drain();

    rig.manager.handle_event(ManagerEvent::ChannelHangup);

    assert!(!rig.manager.is_running());
    assert!(!rig.manager.is_connected());
    assert!(rig.manager.respawn_pending());
    assert_eq!(
        summarize(&rig.drain()),
        vec![("lost", PEER.to_string(), "idle".to_string())]
    );
}

#[test]
fn test_hangup_without_channel_is_ignored() {
    let mut rig = Rig::new();
    rig.manager.setup().expect("setup");

    rig.manager.handle_event(ManagerEvent::ChannelHangup);

    assert!(rig.manager.is_running());
    assert!(!rig.manager.respawn_pending());
}

#[test]
fn test_teardown_drops_queued_requests_silently() {
    let mut rig = Rig::connected();
    rig.found(PEER, "tv");
    rig.manager.scan(30).expect("scan");
    rig.manager.connect(PEER).expect("connect");
    rig.drain();

    let report = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));
    rig.expire(TimerKind::Respawn);
    rig.expire(TimerKind::ConnectControl);
    rig.link.clear_sent();
    rig.drain();
    rig.line("FAIL");

    // The late FAIL answers the new ATTACH, not the dropped P2P_CONNECT.
    assert!(rig.drain().is_empty());
    assert_eq!(rig.link.sent(), vec!["SET wifi_display 1"]);
}

// ── Respawn policy ────────────────────────────────────────────────────────────

#[test]
fn test_successful_reconnect_refills_respawn_budget() {
    let mut rig = Rig::connected();
    let report = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));
    assert_eq!(rig.manager.respawn_budget(), 9);

    rig.expire(TimerKind::Respawn);
    assert_eq!(rig.manager.respawn_budget(), 9, "spawning alone is not proof of health");
    rig.expire(TimerKind::ConnectControl);

    assert_eq!(rig.manager.respawn_budget(), 10);
    assert_eq!(rig.process.start_count(), 2);
}

#[test]
fn test_ten_consecutive_spawn_failures_exhaust_the_budget() {
    // Arrange: the child dies and every respawn fails
    let mut rig = Rig::connected();
    rig.process.fail_next_starts(u32::MAX);
    let report = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));

    // Act
    let mut failures = 0;
    while rig.timers.pending_of(TimerKind::Respawn).is_some() {
        rig.expire(TimerKind::Respawn);
        failures += 1;
        assert!(failures <= 10, "respawn kept retrying past the budget");
    }

    // Assert
    assert_eq!(failures, 10);
    assert_eq!(rig.manager.respawn_budget(), 0);
    assert!(!rig.manager.respawn_pending());
    assert!(!rig.manager.is_running());
    assert_eq!(rig.process.start_count(), 11);
}

#[test]
fn test_exit_with_exhausted_budget_schedules_nothing() {
    let mut rig = Rig::with_settings(
        ManagerSettings {
            respawn_limit: 0,
            ..Default::default()
        },
        PeerSettings::default(),
    );
    rig.bring_up();

    let report = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));

    assert!(!rig.manager.respawn_pending());
    assert!(!rig.manager.is_connected());
}

#[test]
fn test_manual_setup_restores_budget_after_exhaustion() {
    let mut rig = Rig::connected();
    rig.process.fail_next_starts(10);
    let report = rig.process.exit(false);
    rig.manager.handle_event(ManagerEvent::ProcessExited(report));
    while rig.timers.pending_of(TimerKind::Respawn).is_some() {
        rig.expire(TimerKind::Respawn);
    }
    assert_eq!(rig.manager.respawn_budget(), 0);

    rig.manager.setup().expect("manual setup");

    assert_eq!(rig.manager.respawn_budget(), 10);
    assert!(rig.manager.is_running());
}

#[test]
fn test_setup_failure_is_reported_without_respawn() {
    let mut rig = Rig::new();
    rig.process.fail_next_starts(1);

    let result = rig.manager.setup();

    assert!(result.is_err());
    assert!(!rig.manager.respawn_pending());
    assert_eq!(rig.manager.respawn_budget(), 10);
}

// ── Dispatch loop ─────────────────────────────────────────────────────────────

#[test]
fn test_run_processes_queue_until_shutdown_then_releases() {
    // Arrange
    let mut rig = Rig::connected();
    let (tx, mut rx) = mpsc::unbounded_channel();
    for event in [
        ManagerEvent::ControlLine(format!(
            "<3>P2P-DEVICE-FOUND {PEER} p2p_dev_addr={PEER} name='tv'"
        )),
        ManagerEvent::Command(ManagerCommand::Scan { timeout_secs: 30 }),
        ManagerEvent::Shutdown,
        ManagerEvent::Command(ManagerCommand::DisconnectAll),
    ] {
        tx.send(event).expect("send");
    }

    // Act
    tokio_test::block_on(rig.manager.run(&mut rx));

    // Assert: nothing after Shutdown was handled
    assert_eq!(rig.link.sent(), vec!["P2P_FIND 30"]);
    assert!(!rig.manager.is_running());
    assert!(!rig.manager.is_connected());
    assert_eq!(
        summarize(&rig.drain()),
        vec![
            ("found", PEER.to_string(), "idle".to_string()),
            ("lost", PEER.to_string(), "idle".to_string()),
        ]
    );
}
