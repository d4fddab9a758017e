// warden-core/src/lib.rs

// Declare the top-level modules within the library crate
pub mod service;
pub mod supervise;
pub mod update;

// Re-export key types for easier use by the CLI crate
pub use service::{
    ControlEvent, DirectControl, ServiceControl, ServiceController, ServiceExit, ServiceState,
    ServiceStatus,
};
pub use supervise::{DeferredAction, ProcessRunner, Runner, SupervisedRun, SupervisionContext};
pub use update::{find_newest, FindOptions, ScanReport};
