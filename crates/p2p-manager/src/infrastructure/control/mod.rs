//! Control socket to the supplicant.
//!
//! The supplicant listens on a datagram socket at `<control_dir>/<iface>`.
//! We bind our own end at `/tmp/<iface>-<pid>`, connect it to that path and
//! switch it to non-blocking mode.  A reader task drains every datagram as
//! soon as the socket is readable and forwards each one as a
//! `ManagerEvent::ControlLine`; one datagram carries exactly one message.
//! A receive error (the peer went away) is forwarded as
//! `ManagerEvent::ChannelHangup`.

pub mod mock;

use std::io;
use std::os::unix::net::UnixDatagram as StdUnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixDatagram;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::events::ManagerEvent;
use crate::application::ports::{ControlLink, LinkError};

/// Largest datagram the supplicant sends.
const READ_BUFFER_SIZE: usize = 4096;

/// Turns one received datagram into the text of one message.
///
/// Trailing newlines and NULs are dropped.  Returns `None` for a datagram
/// with no text.
pub fn datagram_to_line(datagram: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(datagram);
    let line = text.trim_end_matches(['\r', '\n', '\0']);
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

pub struct ControlSocket {
    local_path: PathBuf,
    target_path: PathBuf,
    events: UnboundedSender<ManagerEvent>,
    socket: Option<Arc<UnixDatagram>>,
    reader: Option<JoinHandle<()>>,
}

impl ControlSocket {
    pub fn new(interface: &str, control_dir: &Path, events: UnboundedSender<ManagerEvent>) -> Self {
        Self::with_paths(
            PathBuf::from(format!("/tmp/{interface}-{}", std::process::id())),
            control_dir.join(interface),
            events,
        )
    }

    /// Uses explicit socket paths instead of the derived ones.
    pub fn with_paths(
        local_path: PathBuf,
        target_path: PathBuf,
        events: UnboundedSender<ManagerEvent>,
    ) -> Self {
        Self {
            local_path,
            target_path,
            events,
            socket: None,
            reader: None,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    fn open(&self) -> Result<StdUnixDatagram, LinkError> {
        match std::fs::remove_file(&self.local_path) {
            Ok(()) => debug!("removed stale {}", self.local_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {e}", self.local_path.display()),
        }

        let bind_error = |source: io::Error| LinkError::Bind {
            path: self.local_path.display().to_string(),
            source,
        };
        let socket = StdUnixDatagram::bind(&self.local_path).map_err(bind_error)?;

        let connected = socket
            .connect(&self.target_path)
            .and_then(|()| socket.set_nonblocking(true));
        if let Err(source) = connected {
            let _ = std::fs::remove_file(&self.local_path);
            return Err(LinkError::Connect {
                path: self.target_path.display().to_string(),
                source,
            });
        }
        Ok(socket)
    }
}

async fn read_datagrams(socket: Arc<UnixDatagram>, events: UnboundedSender<ManagerEvent>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        if let Err(e) = socket.readable().await {
            warn!("control socket readiness failed: {e}");
            let _ = events.send(ManagerEvent::ChannelHangup);
            return;
        }

        loop {
            match socket.try_recv(&mut buf) {
                Ok(n) => {
                    let Some(line) = datagram_to_line(&buf[..n]) else {
                        continue;
                    };
                    if events.send(ManagerEvent::ControlLine(line)).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("control socket receive failed: {e}");
                    let _ = events.send(ManagerEvent::ChannelHangup);
                    return;
                }
            }
        }
    }
}

impl ControlLink for ControlSocket {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.disconnect();
        info!("connecting supplicant on {}", self.target_path.display());

        let std_socket = self.open()?;
        let socket = UnixDatagram::from_std(std_socket).map_err(|source| LinkError::Connect {
            path: self.target_path.display().to_string(),
            source,
        })?;
        let socket = Arc::new(socket);

        self.reader = Some(tokio::spawn(read_datagrams(
            Arc::clone(&socket),
            self.events.clone(),
        )));
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, line: &str) -> Result<(), LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::NotConnected)?;
        socket.try_send(line.as_bytes()).map_err(LinkError::Send)?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.socket.take().is_some() {
            debug!("closing control socket {}", self.local_path.display());
            let _ = std::fs::remove_file(&self.local_path);
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
