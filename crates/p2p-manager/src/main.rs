//! P2P Manager entry point.
//!
//! Loads configuration, wires the real infrastructure into the
//! [`SupplicantManager`] and runs its dispatch loop until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()
//!  └─ SupplicantManager::new()
//!       ├─ SupplicantProcess  (child + exit watch task)
//!       ├─ ControlSocket      (datagram reader task)
//!       ├─ TokioScheduler     (one task per armed timer)
//!       └─ PeerStateMachine   (ChannelDelegate ──► logging task)
//!  └─ manager.run()           -- single dispatch loop
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use p2p_manager::application::delegate::{log_delegate_event, ChannelDelegate};
use p2p_manager::application::events::{ManagerCommand, ManagerEvent};
use p2p_manager::application::manage_peers::PeerStateMachine;
use p2p_manager::application::supervise_supplicant::SupplicantManager;
use p2p_manager::infrastructure::control::ControlSocket;
use p2p_manager::infrastructure::dhcp::StaticAddressRole;
use p2p_manager::infrastructure::storage::config::{debug_env_set, load_config};
use p2p_manager::infrastructure::supervisor::SupplicantProcess;
use p2p_manager::infrastructure::timer::TokioScheduler;

/// Wi-Fi Direct supplicant supervisor.
#[derive(Debug, Parser)]
#[command(name = "p2p-manager", version, about)]
struct Args {
    /// Configuration file (defaults to the platform config directory).
    #[arg(short, long, env = "P2P_MANAGER_CONFIG")]
    config: Option<PathBuf>,

    /// P2P interface, overriding the configuration file.
    #[arg(short, long)]
    interface: Option<String>,

    /// Issue a scan every N seconds.
    #[arg(long, value_name = "SECS")]
    scan_interval: Option<u64>,

    /// Timeout passed to each scan.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    scan_timeout: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(interface) = args.interface {
        config.supplicant.interface = interface;
    }

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    info!("P2P Manager starting on {}", config.supplicant.interface);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    // ── Delegate observer ─────────────────────────────────────────────────────
    let (delegate_tx, mut delegate_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = delegate_rx.recv().await {
            log_delegate_event(&event);
        }
    });

    // ── Manager wiring ────────────────────────────────────────────────────────
    let launch = config.launch(debug_env_set());
    let peers = PeerStateMachine::new(
        config.peer_settings(),
        Box::new(ChannelDelegate::new(delegate_tx)),
        Box::new(StaticAddressRole::client(
            config.dhcp.client_address,
            events_tx.clone(),
        )),
        Box::new(StaticAddressRole::server(config.dhcp.server_address)),
    );
    let mut manager = SupplicantManager::new(
        config.manager_settings(),
        Box::new(SupplicantProcess::new(launch.clone(), events_tx.clone())),
        Box::new(ControlSocket::new(
            &launch.interface,
            &launch.control_dir,
            events_tx.clone(),
        )),
        Box::new(TokioScheduler::new(events_tx.clone())),
        peers,
    );

    // ── Periodic scan ─────────────────────────────────────────────────────────
    if let Some(secs) = args.scan_interval.filter(|s| *s > 0) {
        let tx = events_tx.clone();
        let timeout_secs = args.scan_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                ticker.tick().await;
                let command = ManagerCommand::Scan { timeout_secs };
                if tx.send(ManagerEvent::Command(command)).is_err() {
                    break;
                }
            }
        });
    }

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let shutdown_tx = events_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(ManagerEvent::Shutdown);
        }
    });
    drop(events_tx);

    if let Err(e) = manager.setup() {
        // Not fatal: the control plane stays down until restarted.
        error!("supplicant setup failed: {e}");
        warn!("running without a supplicant; press Ctrl-C to exit");
    }

    info!("P2P Manager ready.  Press Ctrl-C to exit.");
    manager.run(&mut events_rx).await;

    info!("P2P Manager stopped");
    Ok(())
}
