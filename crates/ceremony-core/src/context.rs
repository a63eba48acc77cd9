//! Shared run deadline and cancellation
//!
//! Every blocking step of a run is raced against one `RunContext`. When the
//! deadline elapses or the context is cancelled, all waits return promptly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ContextError;

/// Run-wide deadline and cancellation signal
#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Instant,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl RunContext {
    /// Context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context expiring at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            deadline,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Cancel the run; idempotent
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Why the context is finished, if it is
    pub fn err(&self) -> Option<ContextError> {
        if *self.cancel_tx.borrow() {
            Some(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the deadline elapses or the context is cancelled
    pub async fn done(&self) -> ContextError {
        if let Some(reason) = self.err() {
            return reason;
        }

        let mut cancel_rx = self.cancel_tx.subscribe();
        tokio::select! {
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => ContextError::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => ContextError::DeadlineExceeded,
        }
    }

    /// Drive `fut` unless the context finishes first
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(reason) = self.err() {
            return Err(reason);
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }

    /// Sleep bounded by the context
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        self.run(tokio::time::sleep(duration)).await
    }
}
