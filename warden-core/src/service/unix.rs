// warden-core/src/service/unix.rs
//! Service surface for unix init systems.
//!
//! SIGTERM maps to Stop, SIGINT to Shutdown and SIGUSR1 to Interrogate.
//! When started by systemd with `Type=notify`, statuses are mirrored to
//! `NOTIFY_SOCKET`.

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;
use warden_common::error::{Result, WardenError};

use super::{ControlEvent, ServiceControl, ServiceState, ServiceStatus};

pub struct UnixServiceControl {
    service_name: String,
    sigterm: Signal,
    sigint: Signal,
    sigusr1: Signal,
    notify: Option<Notifier>,
}

impl UnixServiceControl {
    /// Installs the signal handlers. Must be called inside a tokio runtime.
    pub fn new(service_name: impl Into<String>) -> Result<Self> {
        let install = |kind: SignalKind, label: &str| {
            signal(kind).map_err(|e| {
                WardenError::ServiceControl(format!("failed to install {label} handler: {e}"))
            })
        };
        Ok(Self {
            service_name: service_name.into(),
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sigusr1: install(SignalKind::user_defined1(), "SIGUSR1")?,
            notify: Notifier::from_env(),
        })
    }
}

#[async_trait]
impl ServiceControl for UnixServiceControl {
    fn report_status(&mut self, status: ServiceStatus) -> Result<()> {
        debug!("{}: status {}", self.service_name, status.state);
        let Some(notify) = &self.notify else {
            return Ok(());
        };
        notify.send(&notify_message(&self.service_name, &status))
    }

    async fn next_control_event(&mut self) -> Option<ControlEvent> {
        tokio::select! {
            Some(()) = self.sigterm.recv() => Some(ControlEvent::Stop),
            Some(()) = self.sigint.recv() => Some(ControlEvent::Shutdown),
            Some(()) = self.sigusr1.recv() => Some(ControlEvent::Interrogate),
            else => None,
        }
    }
}

fn notify_message(service_name: &str, status: &ServiceStatus) -> String {
    match status.state {
        ServiceState::StartPending => format!("STATUS={service_name} starting"),
        ServiceState::Running => format!("READY=1\nSTATUS={service_name} running"),
        ServiceState::StopPending => format!("STOPPING=1\nSTATUS={service_name} stopping"),
        ServiceState::Stopped => format!(
            "STATUS={service_name} stopped\nEXIT_STATUS={}",
            status.exit_code
        ),
    }
}

/// Datagram sender for the systemd notification protocol.
struct Notifier {
    path: PathBuf,
}

impl Notifier {
    fn from_env() -> Option<Self> {
        let path = std::env::var_os("NOTIFY_SOCKET").filter(|p| !p.is_empty())?;
        Some(Self {
            path: PathBuf::from(path),
        })
    }

    fn send(&self, message: &str) -> Result<()> {
        let socket = UnixDatagram::unbound()?;
        let raw = self.path.as_os_str().as_encoded_bytes();
        if let Some(name) = raw.strip_prefix(b"@") {
            send_abstract(&socket, name, message)?;
        } else {
            socket.send_to(message.as_bytes(), &self.path)?;
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn send_abstract(socket: &UnixDatagram, name: &[u8], message: &str) -> std::io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
    socket.send_to_addr(message.as_bytes(), &addr)?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn send_abstract(_socket: &UnixDatagram, _name: &[u8], _message: &str) -> std::io::Result<()> {
    tracing::warn!("Abstract NOTIFY_SOCKET addresses are only supported on Linux");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_messages_follow_state() {
        let running = notify_message("warden", &ServiceStatus::running());
        assert!(running.starts_with("READY=1"));
        let stopping = notify_message("warden", &ServiceStatus::stop_pending());
        assert!(stopping.starts_with("STOPPING=1"));
        let stopped = notify_message("warden", &ServiceStatus::stopped(1));
        assert!(stopped.ends_with("EXIT_STATUS=1"));
    }

    #[test]
    fn notifier_writes_datagrams() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notify.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();
        let notifier = Notifier { path: path.clone() };

        notifier.send("READY=1").unwrap();

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"READY=1");
    }

    #[test]
    fn missing_socket_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let notifier = Notifier {
            path: tmp.path().join("absent.sock"),
        };
        assert!(notifier.send("READY=1").is_err());
    }
}
