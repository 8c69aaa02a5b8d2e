//! The parallel worker pool.
//!
//! Each worker leases one task at a time and processes it to completion
//! before taking the next. A separate drain loop converts dead-lettered
//! tasks into failed results so every job reaches a terminal state.

use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::queue::TaskQueue;

use super::orchestrator::{Orchestrator, TaskOutcome};
use super::shutdown::ShutdownToken;
use super::EngineConfig;

/// A running set of workers plus the dead-letter drain.
pub struct WorkerPool {
    shutdown: Arc<ShutdownToken>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the configured number of workers against the orchestrator.
    #[must_use]
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        queue: Arc<dyn TaskQueue>,
        config: &EngineConfig,
    ) -> Self {
        let shutdown = Arc::new(ShutdownToken::new());
        let mut handles = Vec::with_capacity(config.worker_count + 1);

        for worker_id in 0..config.worker_count {
            let orchestrator = orchestrator.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            let poll_interval = config.poll_interval;

            handles.push(tokio::spawn(async move {
                debug!(worker_id, "worker started");
                while !shutdown.is_shutdown() {
                    let leased = tokio::select! {
                        leased = queue.lease_wait(poll_interval) => leased,
                        () = shutdown.wait() => break,
                    };

                    let leased = match leased {
                        Ok(Some(leased)) => leased,
                        Ok(None) => continue,
                        Err(err) => {
                            debug!(worker_id, error = %err, "queue closed, worker exiting");
                            break;
                        }
                    };

                    match orchestrator.process(&leased.task).await {
                        Ok(TaskOutcome::Retry(transport)) => {
                            debug!(worker_id, task = %leased.task, error = %transport, "nacking for retry");
                            if let Err(err) = queue.nack(leased.handle).await {
                                warn!(worker_id, error = %err, "nack failed");
                            }
                        }
                        Ok(outcome) => {
                            debug!(worker_id, task = %leased.task, outcome = ?outcome, "task settled");
                            if let Err(err) = queue.ack(leased.handle).await {
                                warn!(worker_id, error = %err, "ack failed");
                            }
                        }
                        Err(err) => {
                            error!(worker_id, task = %leased.task, error = %err, "task processing failed");
                            if let Err(err) = queue.nack(leased.handle).await {
                                warn!(worker_id, error = %err, "nack failed");
                            }
                        }
                    }
                }
                debug!(worker_id, "worker stopped");
            }));
        }

        // Dead-letter drain: exhausted tasks become failed results and
        // terminated paths.
        {
            let orchestrator = orchestrator.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            let drain_interval = config.drain_interval;

            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(drain_interval) => {}
                        () = shutdown.wait() => break,
                    }

                    for task in queue.drain_dead_letters().await {
                        if let Err(err) = orchestrator.handle_dead_letter(&task).await {
                            error!(task = %task, error = %err, "dead-letter handling failed");
                        }
                    }
                }
            }));
        }

        info!(workers = config.worker_count, "worker pool started");
        Self { shutdown, handles }
    }

    /// Returns the shutdown token shared by all workers.
    #[must_use]
    pub fn shutdown_token(&self) -> Arc<ShutdownToken> {
        self.shutdown.clone()
    }

    /// Requests shutdown and waits for every worker to exit.
    ///
    /// Workers finish the task they hold; nothing is forcibly aborted.
    pub async fn shutdown(self) {
        self.shutdown.shutdown();
        for result in join_all(self.handles).await {
            if let Err(err) = result {
                warn!(error = %err, "worker join failed");
            }
        }
        info!("worker pool stopped");
    }
}
