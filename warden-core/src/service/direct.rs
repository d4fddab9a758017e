// warden-core/src/service/direct.rs
//! Foreground driver: no service manager, a console signal means Stop.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use warden_common::error::Result;

use super::{ControlEvent, ServiceControl, ServiceStatus};

pub struct DirectControl {
    events: mpsc::UnboundedReceiver<ControlEvent>,
}

impl DirectControl {
    /// Feeds a synthetic Stop on Ctrl+C or SIGTERM. Must be called inside a
    /// tokio runtime.
    pub fn from_signals() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            shutdown_signal().await;
            debug!("Shutdown signal received");
            let _ = tx.send(ControlEvent::Stop);
            // Keep the channel open so a closed source is never mistaken for
            // a second request.
            tx.closed().await;
        });
        Self { events: rx }
    }

    pub fn from_channel(events: mpsc::UnboundedReceiver<ControlEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl ServiceControl for DirectControl {
    fn report_status(&mut self, status: ServiceStatus) -> Result<()> {
        debug!(
            "Service status {} (exit code {})",
            status.state, status.exit_code
        );
        Ok(())
    }

    async fn next_control_event(&mut self) -> Option<ControlEvent> {
        self.events.recv().await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_common::Options;

    use super::*;
    use crate::service::{ServiceController, ServiceExit};
    use crate::supervise::{Runner, SupervisionContext};

    struct Idle;

    #[async_trait]
    impl Runner for Idle {
        async fn run(&self, ctx: &SupervisionContext) -> Result<()> {
            ctx.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_stop_shares_the_controller() {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = Arc::new(Options::default().into_foreground());
        tx.send(ControlEvent::Stop).unwrap();

        let exit = ServiceController::new(DirectControl::from_channel(rx), &options)
            .run(Arc::new(Idle), options)
            .await;
        assert_eq!(exit, ServiceExit::StopRequested);
    }
}
