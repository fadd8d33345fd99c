//! Spawns the supplicant and watches it.
//!
//! Each start gets a new generation number and its own watch task.  The task
//! waits for either the child to exit, which it reports as
//! `ManagerEvent::ProcessExited`, or for a kill request from
//! [`SupplicantProcess::stop`], in which case nothing is reported.
//!
//! On Linux the child is asked to receive `SIGKILL` when its parent dies, so
//! a crash of the manager never leaves a supplicant behind.

use std::io;
use std::process::Stdio;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::process::Command;
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, info, warn};

use super::{build_args, render_supplicant_config, SupplicantLaunch};
use crate::application::events::ManagerEvent;
use crate::application::ports::{ExitReport, Generation, ProcessControl, SupervisorError};

pub struct SupplicantProcess {
    launch: SupplicantLaunch,
    events: UnboundedSender<ManagerEvent>,
    generation: Generation,
    /// Liveness of the current generation only.
    running: Arc<AtomicBool>,
    kill: Option<oneshot::Sender<()>>,
}

impl SupplicantProcess {
    pub fn new(launch: SupplicantLaunch, events: UnboundedSender<ManagerEvent>) -> Self {
        Self {
            launch,
            events,
            generation: 0,
            running: Arc::new(AtomicBool::new(false)),
            kill: None,
        }
    }

    fn write_config(&self) -> Result<(), SupervisorError> {
        let content = render_supplicant_config(&self.launch.device_name);
        std::fs::write(&self.launch.config_path, content).map_err(|source| {
            SupervisorError::WriteConfig {
                path: self.launch.config_path.display().to_string(),
                source,
            }
        })
    }

    fn remove_stale_control_dir(&self) {
        match std::fs::remove_dir_all(&self.launch.control_dir) {
            Ok(()) => debug!("removed stale {}", self.launch.control_dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove control directory {}: {e}",
                self.launch.control_dir.display()
            ),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.launch.binary_path);
        command
            .args(build_args(&self.launch))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !self.launch.debug {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        die_with_parent(&mut command);
        command
    }
}

#[cfg(target_os = "linux")]
fn die_with_parent(command: &mut Command) {
    // SAFETY: the closure runs in the forked child before exec and only
    // calls prctl, which is async-signal-safe.
    unsafe {
        command.pre_exec(|| {
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong);
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn die_with_parent(_command: &mut Command) {}

impl ProcessControl for SupplicantProcess {
    fn start(&mut self) -> Result<Generation, SupervisorError> {
        if self.is_running() {
            return Err(SupervisorError::AlreadyRunning);
        }

        self.write_config()?;
        self.remove_stale_control_dir();

        let mut child = self
            .command()
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                binary: self.launch.binary_path.display().to_string(),
                source,
            })?;

        self.generation += 1;
        let generation = self.generation;
        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        let (kill_tx, kill_rx) = oneshot::channel();
        self.kill = Some(kill_tx);
        let events = self.events.clone();

        info!(
            pid = child.id(),
            generation,
            "spawned {}",
            self.launch.binary_path.display()
        );

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    running.store(false, Ordering::SeqCst);
                    let report = match status {
                        Ok(status) => ExitReport {
                            generation,
                            success: status.success(),
                            code: status.code(),
                        },
                        Err(e) => {
                            warn!("failed to wait for supplicant: {e}");
                            ExitReport { generation, success: false, code: None }
                        }
                    };
                    if events.send(ManagerEvent::ProcessExited(report)).is_err() {
                        debug!("exit of generation {generation} not delivered; loop is gone");
                    }
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("failed to kill supplicant: {e}");
                    }
                    running.store(false, Ordering::SeqCst);
                    debug!("supplicant generation {generation} stopped");
                }
            }
        });

        Ok(generation)
    }

    fn stop(&mut self) {
        if let Some(kill) = self.kill.take() {
            // The watch task may already have observed the exit.
            let _ = kill.send(());
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SupplicantProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
