// warden-core/src/service/windows.rs
//! Windows Service Control Manager surface.

use std::ffi::OsString;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use warden_common::error::{Result, WardenError};
use windows_service::service::{
    ServiceControl as WinControl, ServiceControlAccept, ServiceExitCode,
    ServiceState as WinState, ServiceStatus as WinStatus, ServiceType,
};
use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
};
use windows_service::{define_windows_service, service_dispatcher};

use super::{Accepts, ControlEvent, ServiceControl, ServiceState, ServiceStatus};

const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS;

type ServiceMain = Box<dyn Fn(Vec<OsString>) + Send + Sync>;

static SERVICE_MAIN: OnceLock<ServiceMain> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

fn service_main(arguments: Vec<OsString>) {
    match SERVICE_MAIN.get() {
        Some(main) => main(arguments),
        None => error!("Service dispatcher started without a service main"),
    }
}

/// Hands the current thread to the SCM dispatcher. `main` runs on the
/// dispatcher's service thread and must drive the controller to completion.
/// Blocks until the service stops.
pub fn run_dispatcher<F>(service_name: &str, main: F) -> Result<()>
where
    F: Fn(Vec<OsString>) + Send + Sync + 'static,
{
    if SERVICE_MAIN.set(Box::new(main)).is_err() {
        return Err(WardenError::ServiceControl(
            "service dispatcher already started".to_string(),
        ));
    }
    info!("Starting service dispatcher for {}", service_name);
    service_dispatcher::start(service_name, ffi_service_main)
        .map_err(|e| WardenError::ServiceControl(format!("dispatcher failed: {e}")))
}

/// Control handler registration plus the channel its callbacks feed.
pub struct WindowsServiceControl {
    status_handle: ServiceStatusHandle,
    events: mpsc::UnboundedReceiver<ControlEvent>,
}

impl WindowsServiceControl {
    /// Registers the control handler. Call from the service main thread.
    pub fn register(service_name: &str) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let event_handler = move |control_event: WinControl| -> ServiceControlHandlerResult {
            debug!("Got service control event: {:?}", control_event);
            let (event, result) = match control_event {
                WinControl::Stop => (ControlEvent::Stop, ServiceControlHandlerResult::NoError),
                WinControl::Shutdown => {
                    (ControlEvent::Shutdown, ServiceControlHandlerResult::NoError)
                }
                WinControl::Interrogate => {
                    (ControlEvent::Interrogate, ServiceControlHandlerResult::NoError)
                }
                other => (
                    ControlEvent::Other(other.raw_value()),
                    ServiceControlHandlerResult::NotImplemented,
                ),
            };
            let _ = tx.send(event);
            result
        };

        let status_handle = service_control_handler::register(service_name, event_handler)
            .map_err(|e| {
                WardenError::ServiceControl(format!("failed to register control handler: {e}"))
            })?;
        Ok(Self {
            status_handle,
            events,
        })
    }
}

#[async_trait]
impl ServiceControl for WindowsServiceControl {
    fn report_status(&mut self, status: ServiceStatus) -> Result<()> {
        self.status_handle
            .set_service_status(to_native(&status))
            .map_err(|e| WardenError::ServiceControl(format!("set_service_status failed: {e}")))
    }

    async fn next_control_event(&mut self) -> Option<ControlEvent> {
        self.events.recv().await
    }
}

fn to_native(status: &ServiceStatus) -> WinStatus {
    let current_state = match status.state {
        ServiceState::StartPending => WinState::StartPending,
        ServiceState::Running => WinState::Running,
        ServiceState::StopPending => WinState::StopPending,
        ServiceState::Stopped => WinState::Stopped,
    };
    let mut controls_accepted = ServiceControlAccept::empty();
    if status.accepts.contains(Accepts::STOP) {
        controls_accepted |= ServiceControlAccept::STOP;
    }
    if status.accepts.contains(Accepts::SHUTDOWN) {
        controls_accepted |= ServiceControlAccept::SHUTDOWN;
    }
    WinStatus {
        service_type: SERVICE_TYPE,
        current_state,
        controls_accepted,
        exit_code: ServiceExitCode::Win32(status.exit_code),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    }
}
