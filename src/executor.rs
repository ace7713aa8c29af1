//! Execution collaborator for scalar sub-queries, and cancellation.
//!
//! The compiler never talks to a database itself. The percent-of-total pass
//! hands a scalar [`Query`] to an [`Executor`] supplied by the caller and
//! waits for the value, racing the caller's [`CancelSignal`].

use async_trait::async_trait;
use tokio::sync::watch;

use crate::model::Query;

/// Error type executors report; wrapped as a rewrite failure.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// Runs scalar aggregations on behalf of the compiler.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Compile and run `query` (no dimensions, one measure) and return its
    /// single value. `None` means the aggregate was NULL or returned no row.
    ///
    /// Implementations should stop early when `cancel` fires.
    async fn query_scalar(
        &self,
        query: Query,
        cancel: &CancelSignal,
    ) -> Result<Option<f64>, ExecutorError>;
}

/// Receiving side of a cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side; dropping it without cancelling leaves the signal unfired.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Create a linked handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
