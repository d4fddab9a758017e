// warden-core/src/service/mod.rs
//! OS service-manager integration.
//!
//! Every platform surface implements [`ServiceControl`]; the
//! [`ServiceController`] drives the lifecycle state machine against it.

pub mod controller;
pub mod direct;
#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

use std::fmt;

use async_trait::async_trait;
use bitflags::bitflags;
use warden_common::error::Result;

pub use controller::ServiceController;
pub use direct::DirectControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StartPending => "start pending",
            Self::Running => "running",
            Self::StopPending => "stop pending",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Control requests the service is willing to receive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Accepts: u32 {
        const STOP = 0x0000_0001;
        const SHUTDOWN = 0x0000_0004;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepts: Accepts,
    /// Only meaningful in `Stopped`.
    pub exit_code: u32,
}

impl ServiceStatus {
    pub fn start_pending() -> Self {
        Self::new(ServiceState::StartPending, Accepts::empty())
    }

    pub fn running() -> Self {
        Self::new(ServiceState::Running, Accepts::STOP | Accepts::SHUTDOWN)
    }

    pub fn stop_pending() -> Self {
        Self::new(ServiceState::StopPending, Accepts::empty())
    }

    pub fn stopped(exit_code: u32) -> Self {
        Self {
            exit_code,
            ..Self::new(ServiceState::Stopped, Accepts::empty())
        }
    }

    fn new(state: ServiceState, accepts: Accepts) -> Self {
        Self {
            state,
            accepts,
            exit_code: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Shutdown,
    Interrogate,
    /// A control code this service does not handle.
    Other(u32),
}

/// A host service-manager surface: where statuses go and control events
/// come from.
#[async_trait]
pub trait ServiceControl: Send {
    fn report_status(&mut self, status: ServiceStatus) -> Result<()>;

    /// Next control request, or `None` once the source is gone.
    async fn next_control_event(&mut self) -> Option<ControlEvent>;
}

/// How a controlled run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    StopRequested,
    RunCompleted,
    RunFailed,
}

impl ServiceExit {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::StopRequested | Self::RunCompleted => 0,
            Self::RunFailed => 1,
        }
    }
}
