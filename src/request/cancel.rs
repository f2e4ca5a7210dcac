//! Caller-owned cancellation signal.
//!
//! When a call adopts a [`CancelToken`], the pipeline starts no internal
//! timeout timer; the caller owns cancellation entirely and a fire is
//! classified as a manual cancel, not a timeout.

use tokio::sync::watch;

/// Create a linked cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Caller-held side; firing it aborts the in-flight request.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Pipeline-held side, attached to a request through
/// [`RequestOptions`](crate::RequestOptions).
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Resolve when the handle fires. If the handle was dropped without
    /// firing, this never resolves and the request runs to completion.
    pub(crate) async fn cancelled(mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_resolves_after_cancel() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        // Already-fired tokens resolve immediately.
        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .expect("cancelled token must resolve");
    }

    #[tokio::test]
    async fn dropped_handle_never_resolves() {
        let (handle, token) = cancel_pair();
        drop(handle);
        let waited =
            tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err(), "token must stay pending after handle drop");
    }
}
