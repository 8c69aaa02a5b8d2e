//! The task queue contract and its in-memory backing implementation.
//!
//! At-least-once delivery: a leased task that is neither acked nor nacked
//! before its lease expires is redelivered, and redelivered tasks carry a
//! bumped attempt counter. Tasks whose attempts exhaust the configured
//! budget move to the dead-letter list instead of being dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::Task;
use crate::errors::QueueError;

mod memory;
mod retry;

pub use memory::MemoryTaskQueue;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};

/// A task handed to a worker, with the handle used to settle it.
#[derive(Debug, Clone)]
pub struct Leased {
    /// The task to process.
    pub task: Task,
    /// Opaque settle handle; pass to `ack` or `nack` exactly once.
    pub handle: u64,
}

/// Pressure level of the queue's backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthStatus {
    /// Backlog is normal.
    Normal,
    /// Backlog crossed the warning threshold.
    Warning,
    /// Backlog crossed the critical threshold.
    Critical,
}

/// Configuration for queue delivery behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum delivery attempts per task before dead-lettering.
    pub max_attempts: u32,
    /// Redelivery backoff policy.
    pub retry: RetryPolicy,
    /// How long a lease may stay unsettled before redelivery.
    pub lease_timeout_ms: u64,
    /// Backlog size that logs a warning.
    pub warning_threshold: usize,
    /// Backlog size considered critical.
    pub critical_threshold: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry: RetryPolicy::default(),
            lease_timeout_ms: 30_000,
            warning_threshold: 100,
            critical_threshold: 500,
        }
    }
}

impl QueueConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the lease timeout.
    #[must_use]
    pub const fn with_lease_timeout_ms(mut self, ms: u64) -> Self {
        self.lease_timeout_ms = ms;
        self
    }

    /// Returns the lease timeout as a duration.
    #[must_use]
    pub const fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

/// Durable, at-least-once carrier of work units.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after shutdown.
    async fn enqueue(&self, task: Task) -> Result<(), QueueError>;

    /// Leases the next ready task without waiting.
    ///
    /// `Ok(None)` means nothing is currently ready.
    ///
    /// # Errors
    ///
    /// Returns a queue error when the backend fails.
    async fn lease(&self) -> Result<Option<Leased>, QueueError>;

    /// Leases the next ready task, waiting up to `timeout` for one.
    ///
    /// # Errors
    ///
    /// Returns a queue error when the backend fails.
    async fn lease_wait(&self, timeout: Duration) -> Result<Option<Leased>, QueueError>;

    /// Settles a lease as processed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownLease`] for stale handles — the lease
    /// may have expired and been redelivered.
    async fn ack(&self, handle: u64) -> Result<(), QueueError>;

    /// Settles a lease as failed; the task is redelivered with backoff or
    /// dead-lettered once attempts exhaust.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownLease`] for stale handles.
    async fn nack(&self, handle: u64) -> Result<(), QueueError>;

    /// Current backlog (ready + delayed), excluding in-flight leases.
    fn depth(&self) -> usize;

    /// Pressure level of the current backlog.
    fn depth_status(&self) -> DepthStatus;

    /// Removes and returns all dead-lettered tasks.
    async fn drain_dead_letters(&self) -> Vec<Task>;
}
