//! Cooperative cancellation for long waits

use std::sync::Arc;
use tokio::sync::watch;

/// A token for cooperative cancellation.
///
/// Clones share the same state. Cancellation is idempotent: only the first
/// reason is kept.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<Option<String>>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Request cancellation. Wakes every task waiting in [`cancelled`](Self::cancelled).
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let first = self.state.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.clone());
                true
            } else {
                false
            }
        });
        if first {
            tracing::debug!("Cancellation requested: {}", reason);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    /// Resolves once the token is cancelled; returns immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only resolves on cancel.
        let _ = rx.wait_for(Option::is_some).await;
    }
}
