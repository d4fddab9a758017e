// warden-core/src/supervise/mod.rs
//! One cancellable run of the supervised process and the tasks hanging off it.
//!
//! A [`SupervisionContext`] is created per service start and consumed by
//! [`SupervisionContext::spawn`]; a restart builds a fresh one. Cancelling
//! its token is the only signal that tears the run and its deferred work down.

pub mod deferred;
pub mod process;

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument, Span};
use warden_common::error::{Result, WardenError};
use warden_common::Options;

pub use deferred::DeferredAction;
pub use process::ProcessRunner;

use crate::update::{find_newest, FindOptions};

/// The supervised workload. `Ok(())` means a clean, intentional shutdown;
/// any error is an unexpected failure.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    async fn run(&self, ctx: &SupervisionContext) -> Result<()>;
}

pub struct SupervisionContext {
    token: CancellationToken,
    options: Arc<Options>,
    span: Span,
}

impl SupervisionContext {
    pub fn new(options: Arc<Options>) -> Self {
        let span = info_span!("supervise", service = %options.service_name);
        Self {
            token: CancellationToken::new(),
            options,
            span,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Logger handle shared by every task this context spawns.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Schedules a one-shot action tied to this context's cancellation.
    pub fn schedule<F, Fut>(&self, delay: Duration, action: F) -> DeferredAction
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let _guard = self.span.enter();
        DeferredAction::schedule(delay, self.token.clone(), action)
    }

    /// Starts the runner on its own task. The returned handle resolves to
    /// the run's result, with a panic converted into [`WardenError::Panicked`].
    pub fn spawn<R>(self, runner: Arc<R>) -> SupervisedRun
    where
        R: Runner + ?Sized,
    {
        let token = self.token.clone();
        let span = self.span.clone();
        let handle = tokio::spawn(
            async move {
                debug!("Supervised run starting");
                let result = runner.run(&self).await;
                debug!("Supervised run returned: {:?}", result);
                result
            }
            .instrument(span),
        );
        SupervisedRun { handle, token }
    }
}

/// Handle to a spawned supervised run.
#[derive(Debug)]
pub struct SupervisedRun {
    handle: JoinHandle<Result<()>>,
    token: CancellationToken,
}

impl SupervisedRun {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Future for SupervisedRun {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(WardenError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(WardenError::Supervision(format!(
                "supervised run was aborted: {e}"
            ))),
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Purges stale versions of the running agent binary once the new process
/// has settled.
pub fn schedule_update_cleanup(ctx: &SupervisionContext) -> DeferredAction {
    let delay = ctx.options().cleanup_delay;
    debug!("Scheduling update cleanup in {:?}", delay);
    ctx.schedule(delay, |token| async move {
        let running = match std::env::current_exe() {
            Ok(path) => path,
            Err(e) => {
                info!("Cannot determine running executable, skipping cleanup: {}", e);
                return;
            }
        };
        match find_newest(&token, &running, FindOptions::new().delete_old_updates()).await {
            Ok(report) => debug!(
                "Update cleanup done: {} removed, {} failed",
                report.removed.len(),
                report.failed.len()
            ),
            Err(e) => info!("Update cleanup failed: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Waits;

    #[async_trait]
    impl Runner for Waits {
        async fn run(&self, ctx: &SupervisionContext) -> Result<()> {
            ctx.cancelled().await;
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Runner for Panics {
        async fn run(&self, _ctx: &SupervisionContext) -> Result<()> {
            panic!("collaborator blew up");
        }
    }

    #[tokio::test]
    async fn cancellation_ends_the_run_cleanly() {
        let ctx = SupervisionContext::new(Arc::new(Options::default()));
        let run = ctx.spawn(Arc::new(Waits));
        run.cancel();
        assert!(run.await.is_ok());
    }

    #[tokio::test]
    async fn panic_becomes_an_error() {
        let ctx = SupervisionContext::new(Arc::new(Options::default()));
        let runner: Arc<dyn Runner> = Arc::new(Panics);
        match ctx.spawn(runner).await {
            Err(WardenError::Panicked(msg)) => assert_eq!(msg, "collaborator blew up"),
            other => panic!("expected panic error, got {other:?}"),
        }
    }
}
