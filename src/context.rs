//! Execution context carrying optional cancellation

use tokio::sync::watch;

/// Context threaded through every engine call.
///
/// A background context never cancels. A context from [`ExecContext::with_cancel`]
/// resolves [`ExecContext::cancelled`] once its [`CancelHandle`] fires; the
/// engine then kills the running process and the call returns
/// [`MlpipeError::Cancelled`](crate::error::MlpipeError::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancel: Option<watch::Receiver<bool>>,
}

/// Fires cancellation for every clone of the paired [`ExecContext`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl ExecContext {
    /// A context that is never cancelled
    pub fn background() -> Self {
        Self { cancel: None }
    }

    /// A cancellable context and the handle that cancels it
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel: Some(rx) }, CancelHandle { tx })
    }

    /// Whether cancellation has already been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once cancellation is requested. Pends forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancel else {
            return std::future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling
                return std::future::pending().await;
            }
        }
    }
}
