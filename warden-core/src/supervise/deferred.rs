// warden-core/src/supervise/deferred.rs
use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

/// A "sleep, then act once" task bound to a cancellation token.
///
/// The action runs at most once: after `delay`, or immediately on
/// [`fire`](Self::fire). It never runs once the token is cancelled.
/// Dropping the handle detaches the task; it still obeys the token.
#[derive(Debug)]
pub struct DeferredAction {
    fire_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<bool>,
}

impl DeferredAction {
    pub fn schedule<F, Fut>(delay: Duration, token: CancellationToken, action: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (fire_tx, fire_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Deferred action cancelled before it ran");
                        return false;
                    }
                    Ok(()) = fire_rx => debug!("Deferred action fired early"),
                    _ = tokio::time::sleep(delay) => {}
                }
                if token.is_cancelled() {
                    return false;
                }
                action(token).await;
                true
            }
            .in_current_span(),
        );
        Self {
            fire_tx: Some(fire_tx),
            handle,
        }
    }

    /// Skips the remaining delay.
    pub fn fire(&mut self) {
        if let Some(tx) = self.fire_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Waits for the task and reports whether the action ran.
    pub async fn join(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}
