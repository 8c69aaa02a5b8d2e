//! The pipeline execution engine: orchestrator, worker pool, and config.
//!
//! The engine consumes queued tasks, runs the analysis stage they name,
//! persists results, and advances or terminates each image's path. See
//! [`Orchestrator`] for the per-task algorithm and [`WorkerPool`] for the
//! scheduling model.

use std::time::Duration;

mod orchestrator;
mod shutdown;
mod worker;

#[cfg(test)]
mod integration_tests;

pub use orchestrator::{Orchestrator, TaskOutcome};
pub use shutdown::ShutdownToken;
pub use worker::WorkerPool;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of parallel workers.
    pub worker_count: usize,
    /// Bound on each analysis service call.
    pub analysis_timeout: Duration,
    /// How long an idle worker waits on the queue per poll.
    pub poll_interval: Duration,
    /// Cadence of the dead-letter drain.
    pub drain_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            analysis_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            drain_interval: Duration::from_millis(250),
        }
    }
}

impl EngineConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Sets the analysis call bound.
    #[must_use]
    pub const fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// Sets the idle poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the dead-letter drain cadence.
    #[must_use]
    pub const fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }
}
