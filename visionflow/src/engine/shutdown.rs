//! Cooperative shutdown signal for the worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A one-way flag workers poll between tasks.
///
/// Shutdown is cooperative: a worker mid-task finishes and settles its lease
/// before observing the flag.
#[derive(Debug, Default)]
pub struct ShutdownToken {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Creates a token in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Waits until shutdown is requested.
    pub async fn wait(&self) {
        while !self.is_shutdown() {
            let notified = self.notify.notified();
            if self.is_shutdown() {
                break;
            }
            notified.await;
        }
    }
}
