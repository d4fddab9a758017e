// warden-core/src/service/controller.rs
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn, Instrument};
use warden_common::error::{Result, WardenError};
use warden_common::Options;

use super::{ControlEvent, ServiceControl, ServiceExit, ServiceState, ServiceStatus};
use crate::supervise::{schedule_update_cleanup, Runner, SupervisedRun, SupervisionContext};

/// Maps service-manager control requests onto one supervised run.
///
/// `StartPending -> Running -> StopPending -> Stopped`. Every path into
/// `Stopped` reports `StopPending` exactly once first, and cancels the run
/// before the terminal report.
pub struct ServiceController<C> {
    control: C,
    current: ServiceStatus,
    stop_grace: Duration,
    interrogate_delay: Duration,
}

enum Step {
    Exited(Result<()>),
    Control(Option<ControlEvent>),
}

impl<C: ServiceControl> ServiceController<C> {
    pub fn new(control: C, options: &Options) -> Self {
        Self {
            control,
            current: ServiceStatus::start_pending(),
            stop_grace: options.stop_grace,
            interrogate_delay: options.interrogate_delay,
        }
    }

    /// Drives one service start to its terminal status. The caller exits the
    /// process with [`ServiceExit::exit_code`].
    ///
    /// A panic in the control source or the status reporter is caught here:
    /// the run is cancelled and `Stopped` with exit code 1 is still reported.
    pub async fn run<R>(mut self, runner: Arc<R>, options: Arc<Options>) -> ServiceExit
    where
        R: Runner + ?Sized,
    {
        let ctx = SupervisionContext::new(options);
        let span = ctx.span().clone();
        let token = ctx.token().clone();

        let outcome = AssertUnwindSafe(async {
            self.report(ServiceStatus::start_pending());
            self.drive(ctx, runner).await
        })
        .catch_unwind()
        .instrument(span)
        .await;

        match outcome {
            Ok(exit) => exit,
            Err(_) => {
                error!("Service control loop panicked; stopping service");
                token.cancel();
                self.report_after_panic();
                ServiceExit::RunFailed
            }
        }
    }

    async fn drive<R>(&mut self, ctx: SupervisionContext, runner: Arc<R>) -> ServiceExit
    where
        R: Runner + ?Sized,
    {
        schedule_update_cleanup(&ctx);
        let mut run = ctx.spawn(runner);

        self.report(ServiceStatus::running());
        info!("Service running");

        loop {
            let step = tokio::select! {
                biased;
                result = &mut run => Step::Exited(result),
                event = self.control.next_control_event() => Step::Control(event),
            };

            match step {
                Step::Exited(Ok(())) => {
                    info!("Supervised run finished; stopping service");
                    run.cancel();
                    self.finish(0);
                    return ServiceExit::RunCompleted;
                }
                Step::Exited(Err(e)) => {
                    log_run_failure(&e);
                    run.cancel();
                    self.finish(1);
                    return ServiceExit::RunFailed;
                }
                Step::Control(Some(ControlEvent::Interrogate)) => {
                    // Answering twice avoids a known deadlock in the
                    // Windows control protocol.
                    let status = self.current;
                    self.report(status);
                    tokio::time::sleep(self.interrogate_delay).await;
                    self.report(status);
                }
                Step::Control(Some(event @ (ControlEvent::Stop | ControlEvent::Shutdown))) => {
                    info!("Received {:?}; stopping service", event);
                    self.stop(&mut run).await;
                    return ServiceExit::StopRequested;
                }
                Step::Control(None) => {
                    info!("Control source closed; stopping service");
                    self.stop(&mut run).await;
                    return ServiceExit::StopRequested;
                }
                Step::Control(Some(ControlEvent::Other(code))) => {
                    warn!("Ignoring unexpected control request #{}", code);
                }
            }
        }
    }

    async fn stop(&mut self, run: &mut SupervisedRun) {
        self.report(ServiceStatus::stop_pending());
        run.cancel();
        match tokio::time::timeout(self.stop_grace, run).await {
            Ok(Ok(())) => debug!("Supervised run stopped within grace period"),
            Ok(Err(e)) => log_run_failure(&e),
            Err(_) => warn!(
                "Supervised run still active after {:?}; reporting stopped anyway",
                self.stop_grace
            ),
        }
        self.report(ServiceStatus::stopped(0));
    }

    fn finish(&mut self, exit_code: u32) {
        self.report(ServiceStatus::stop_pending());
        self.report(ServiceStatus::stopped(exit_code));
    }

    /// Terminal reports after the control loop unwound. Skips `StopPending`
    /// if it was already the last status sent.
    fn report_after_panic(&mut self) {
        let reported = std::panic::catch_unwind(AssertUnwindSafe(|| {
            if self.current.state != ServiceState::StopPending {
                self.report(ServiceStatus::stop_pending());
            }
            self.report(ServiceStatus::stopped(1));
        }));
        if reported.is_err() {
            error!("Status reporting panicked again; final status not sent");
        }
    }

    fn report(&mut self, status: ServiceStatus) {
        self.current = status;
        debug!("Reporting service status {}", status.state);
        if let Err(e) = self.control.report_status(status) {
            error!("Failed to report service status {}: {}", status.state, e);
        }
    }
}

fn log_run_failure(e: &WardenError) {
    info!("Supervised run failed: {}", e);
    debug!("Supervised run failed: {:?}", e);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::service::{Accepts, ServiceState};

    struct Scripted {
        events: mpsc::UnboundedReceiver<ControlEvent>,
        reported: Arc<Mutex<Vec<ServiceStatus>>>,
    }

    #[async_trait]
    impl ServiceControl for Scripted {
        fn report_status(&mut self, status: ServiceStatus) -> Result<()> {
            self.reported.lock().unwrap().push(status);
            Ok(())
        }

        async fn next_control_event(&mut self) -> Option<ControlEvent> {
            self.events.recv().await
        }
    }

    fn scripted() -> (
        Scripted,
        mpsc::UnboundedSender<ControlEvent>,
        Arc<Mutex<Vec<ServiceStatus>>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reported = Arc::new(Mutex::new(Vec::new()));
        let control = Scripted {
            events: rx,
            reported: Arc::clone(&reported),
        };
        (control, tx, reported)
    }

    /// Records like [`Scripted`] but blows up at a chosen point.
    struct Faulty {
        panic_reporting: Option<ServiceState>,
        reported: Arc<Mutex<Vec<ServiceStatus>>>,
    }

    #[async_trait]
    impl ServiceControl for Faulty {
        fn report_status(&mut self, status: ServiceStatus) -> Result<()> {
            if self.panic_reporting == Some(status.state) {
                panic!("status sink failed");
            }
            self.reported.lock().unwrap().push(status);
            Ok(())
        }

        async fn next_control_event(&mut self) -> Option<ControlEvent> {
            if self.panic_reporting.is_none() {
                panic!("control source failed");
            }
            std::future::pending().await
        }
    }

    struct UntilCancelled;
    #[async_trait]
    impl Runner for UntilCancelled {
        async fn run(&self, ctx: &SupervisionContext) -> Result<()> {
            ctx.cancelled().await;
            Ok(())
        }
    }

    struct Returns(fn() -> Result<()>);
    #[async_trait]
    impl Runner for Returns {
        async fn run(&self, _ctx: &SupervisionContext) -> Result<()> {
            (self.0)()
        }
    }

    struct Panics;
    #[async_trait]
    impl Runner for Panics {
        async fn run(&self, _ctx: &SupervisionContext) -> Result<()> {
            panic!("supervised code panicked");
        }
    }

    fn states(reported: &Mutex<Vec<ServiceStatus>>) -> Vec<ServiceState> {
        reported.lock().unwrap().iter().map(|s| s.state).collect()
    }

    async fn drive<R: Runner>(control: Scripted, runner: R) -> ServiceExit {
        let options = Arc::new(Options::default());
        ServiceController::new(control, &options)
            .run(Arc::new(runner), options)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_walks_the_full_table() {
        let (control, tx, reported) = scripted();
        tx.send(ControlEvent::Stop).unwrap();

        let exit = drive(control, UntilCancelled).await;

        assert_eq!(exit, ServiceExit::StopRequested);
        assert_eq!(exit.exit_code(), 0);
        assert_eq!(
            states(&reported),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
        let running = reported.lock().unwrap()[1];
        assert!(running.accepts.contains(Accepts::STOP | Accepts::SHUTDOWN));
    }

    #[tokio::test(start_paused = true)]
    async fn interrogate_echoes_twice() {
        let (control, tx, reported) = scripted();
        tx.send(ControlEvent::Interrogate).unwrap();
        tx.send(ControlEvent::Shutdown).unwrap();

        drive(control, UntilCancelled).await;

        assert_eq!(
            states(&reported),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::Running,
                ServiceState::Running,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_control_is_ignored() {
        let (control, tx, reported) = scripted();
        tx.send(ControlEvent::Other(0x80)).unwrap();
        tx.send(ControlEvent::Stop).unwrap();

        let exit = drive(control, UntilCancelled).await;

        assert_eq!(exit, ServiceExit::StopRequested);
        assert_eq!(reported.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_error_exits_non_zero() {
        let (control, _tx, reported) = scripted();

        let exit = drive(control, Returns(|| Err(WardenError::ProcessExited(2)))).await;

        assert_eq!(exit, ServiceExit::RunFailed);
        assert_eq!(exit.exit_code(), 1);
        let reported = reported.lock().unwrap();
        let tail: Vec<_> = reported.iter().rev().take(2).collect();
        assert_eq!(tail[0].state, ServiceState::Stopped);
        assert_eq!(tail[0].exit_code, 1);
        assert_eq!(tail[1].state, ServiceState::StopPending);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_return_exits_zero() {
        let (control, _tx, reported) = scripted();

        let exit = drive(control, Returns(|| Ok(()))).await;

        assert_eq!(exit, ServiceExit::RunCompleted);
        assert_eq!(exit.exit_code(), 0);
        let pending = states(&reported)
            .into_iter()
            .filter(|s| *s == ServiceState::StopPending)
            .count();
        assert_eq!(pending, 1);
        assert_eq!(states(&reported).last(), Some(&ServiceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn panic_still_reports_stopped() {
        let (control, _tx, reported) = scripted();

        let exit = drive(control, Panics).await;

        assert_eq!(exit, ServiceExit::RunFailed);
        assert_eq!(states(&reported).last(), Some(&ServiceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_control_source_stops() {
        let (control, tx, reported) = scripted();
        drop(tx);

        let exit = drive(control, UntilCancelled).await;

        assert_eq!(exit, ServiceExit::StopRequested);
        assert_eq!(states(&reported).last(), Some(&ServiceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn control_source_panic_reports_stopped_once() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let control = Faulty {
            panic_reporting: None,
            reported: Arc::clone(&reported),
        };
        let options = Arc::new(Options::default());

        let exit = ServiceController::new(control, &options)
            .run(Arc::new(UntilCancelled), options)
            .await;

        assert_eq!(exit, ServiceExit::RunFailed);
        assert_eq!(
            states(&reported),
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
        assert_eq!(reported.lock().unwrap()[3].exit_code, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_report_panic_still_ends_stopped() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let control = Faulty {
            panic_reporting: Some(ServiceState::Running),
            reported: Arc::clone(&reported),
        };
        let options = Arc::new(Options::default());

        let exit = ServiceController::new(control, &options)
            .run(Arc::new(UntilCancelled), options)
            .await;

        assert_eq!(exit, ServiceExit::RunFailed);
        assert_eq!(exit.exit_code(), 1);
        assert_eq!(
            states(&reported),
            vec![
                ServiceState::StartPending,
                ServiceState::StopPending,
                ServiceState::Stopped,
            ]
        );
    }
}
