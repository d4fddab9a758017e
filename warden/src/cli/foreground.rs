//! Contains the logic for the `svc-fg` command.
use std::sync::Arc;

use warden_common::error::Result;
use warden_common::Options;
use warden_core::{DirectControl, ProcessRunner, ServiceController};

#[derive(clap::Args, Debug)]
pub struct Foreground;

impl Foreground {
    /// Same controller and supervision as `svc`, without a service manager.
    /// Ctrl+C or SIGTERM stops the run.
    pub async fn run(&self, options: Options) -> Result<i32> {
        let options = Arc::new(options.into_foreground());
        tracing::debug!("Running {} in the foreground", options.service_name);
        let exit = ServiceController::new(DirectControl::from_signals(), &options)
            .run(Arc::new(ProcessRunner::new()), Arc::clone(&options))
            .await;
        Ok(exit.exit_code())
    }
}
