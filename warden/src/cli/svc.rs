//! Contains the logic for the `svc` command.
use std::sync::Arc;

use warden_common::error::Result;
use warden_common::Options;
#[cfg(not(any(unix, windows)))]
use warden_common::WardenError;
use warden_core::{ProcessRunner, ServiceController};

#[derive(clap::Args, Debug)]
pub struct Svc;

impl Svc {
    pub async fn run(&self, options: Options) -> Result<i32> {
        let options = Arc::new(options);
        tracing::info!("Starting {} service", options.service_name);
        run_service(options).await
    }
}

#[cfg(unix)]
async fn run_service(options: Arc<Options>) -> Result<i32> {
    use warden_core::service::unix::UnixServiceControl;

    let control = UnixServiceControl::new(options.service_name.as_str())?;
    let exit = ServiceController::new(control, &options)
        .run(Arc::new(ProcessRunner::new()), Arc::clone(&options))
        .await;
    Ok(exit.exit_code())
}

#[cfg(windows)]
async fn run_service(options: Arc<Options>) -> Result<i32> {
    use std::ffi::OsString;
    use std::sync::atomic::{AtomicI32, Ordering};

    use warden_common::WardenError;
    use warden_core::service::windows::{run_dispatcher, WindowsServiceControl};

    let exit_code = Arc::new(AtomicI32::new(0));
    let runtime = tokio::runtime::Handle::current();
    let service_name = options.service_name.clone();

    let service_main = {
        let exit_code = Arc::clone(&exit_code);
        move |_arguments: Vec<OsString>| {
            let control = match WindowsServiceControl::register(&options.service_name) {
                Ok(control) => control,
                Err(e) => {
                    tracing::error!("Failed to register service control handler: {}", e);
                    exit_code.store(1, Ordering::SeqCst);
                    return;
                }
            };
            let exit = runtime.block_on(
                ServiceController::new(control, &options)
                    .run(Arc::new(ProcessRunner::new()), Arc::clone(&options)),
            );
            exit_code.store(exit.exit_code(), Ordering::SeqCst);
        }
    };

    tokio::task::spawn_blocking(move || run_dispatcher(&service_name, service_main))
        .await
        .map_err(|e| WardenError::ServiceControl(format!("dispatcher thread failed: {e}")))??;
    Ok(exit_code.load(Ordering::SeqCst))
}

#[cfg(not(any(unix, windows)))]
async fn run_service(_options: Arc<Options>) -> Result<i32> {
    Err(WardenError::ServiceControl(
        "no service manager integration for this platform".to_string(),
    ))
}
