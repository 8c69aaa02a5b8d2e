//! The per-task processing core.
//!
//! One [`Orchestrator::process`] call drives one image one stage forward:
//! it records the stage's result, evaluates the filter, and either enqueues
//! the continuation or terminates the path and settles the job's counters.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisClient, TimeoutClient};
use crate::core::{Job, JobResult, JobStatus, Task};
use crate::errors::{EngineError, TransportError};
use crate::evaluator::{evaluate, PathDecision};
use crate::events::{names, EventSink};
use crate::queue::TaskQueue;
use crate::store::{JobStore, PathCompletion, RecordOutcome, TransitionOutcome};

use super::EngineConfig;

/// How a processed task should be settled with the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The job is gone or cancelled; the task is a no-op. Ack.
    Discarded,
    /// A continuation was enqueued for the next stage. Ack.
    Advanced,
    /// The image's path terminated. Ack.
    Terminated {
        /// True when the path ended in stage failure.
        failed: bool,
        /// True when this termination drained the job.
        job_finished: bool,
    },
    /// Transport failure; hand the task back to the queue's retry policy.
    Retry(TransportError),
}

/// Drives queued tasks through their stage, owning no threads of its own.
///
/// All collaborators are injected; the orchestrator holds them behind
/// trait objects and can be shared across any number of workers.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    client: TimeoutClient,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Wires an orchestrator from its collaborators.
    ///
    /// The analysis client is wrapped in the configured per-call timeout;
    /// an elapsed wait surfaces as a transport failure for the queue to
    /// retry.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        client: Arc<dyn AnalysisClient>,
        sink: Arc<dyn EventSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            client: TimeoutClient::new(client, config.analysis_timeout),
            sink,
        }
    }

    /// Processes one task to a settle decision.
    ///
    /// # Errors
    ///
    /// Returns an error when the store or queue fails; the caller should
    /// nack so the task is redelivered.
    pub async fn process(&self, task: &Task) -> Result<TaskOutcome, EngineError> {
        // Step 1: load the job; missing or cancelled means the task is a
        // cooperative no-op, not an error.
        let Some(job) = self.store.fetch_job(task.job_id).await? else {
            debug!(task = %task, "job gone, discarding task");
            return Ok(TaskOutcome::Discarded);
        };
        if job.status.is_terminal() {
            debug!(task = %task, status = %job.status, "job terminal, discarding task");
            return Ok(TaskOutcome::Discarded);
        }
        if job.status == JobStatus::Pending {
            self.store.mark_processing(job.id).await?;
            self.sink
                .emit(names::JOB_PROCESSING, Some(json!({ "job_id": job.id })))
                .await;
        }

        self.sink.try_emit(
            names::TASK_STARTED,
            Some(json!({
                "job_id": task.job_id,
                "image_id": task.image_id,
                "stage_index": task.stage_index,
                "attempt": task.attempt,
            })),
        );

        // Step 2: resolve the stage from the submission-time snapshot.
        let Some(stage) = job.snapshot.stage_at(task.stage_index) else {
            error!(task = %task, stages = job.snapshot.len(), "stage index out of range");
            return self
                .terminate_path(&job, task.image_id, PathDecision::StageFailed)
                .await;
        };

        // Step 3: idempotent replay. A redelivered task whose result is
        // already recorded must not re-invoke the analysis service.
        let result = match self
            .store
            .find_result(task.job_id, task.image_id, task.stage_index)
            .await?
        {
            Some(existing) => {
                debug!(task = %task, key = %task.idempotency_key(), "replaying recorded result");
                existing.result
            }
            None => {
                // Step 4: the single blocking call; bounded by the timeout
                // decorator, retried by the queue on transport failure.
                let analysis = match self.client.evaluate(task.image_id, &stage.prompt).await {
                    Ok(analysis) => analysis,
                    Err(transport) => {
                        warn!(task = %task, error = %transport, "transport failure, handing back for retry");
                        self.sink.try_emit(
                            names::TASK_RETRIED,
                            Some(json!({
                                "job_id": task.job_id,
                                "image_id": task.image_id,
                                "stage_index": task.stage_index,
                                "attempt": task.attempt,
                            })),
                        );
                        return Ok(TaskOutcome::Retry(transport));
                    }
                };

                // Step 5: persist before any continuation is enqueued, so a
                // reader never sees stage N+1 without stage N.
                let record = JobResult::new(
                    task.job_id,
                    task.image_id,
                    stage.id,
                    task.stage_index,
                    analysis,
                );
                match self.store.record_result(record.clone()).await? {
                    RecordOutcome::Inserted => record.result,
                    // Lost a concurrent-delivery race; the stored record wins.
                    RecordOutcome::Duplicate(prior) => prior.result,
                }
            }
        };

        // Step 6: filter evaluation.
        let decision = evaluate(stage, &result);

        // Step 7: advance, unless cancellation landed while we were busy.
        if decision.continues() && job.snapshot.has_stage_after(task.stage_index) {
            let cancelled = self
                .store
                .fetch_job(task.job_id)
                .await?
                .map_or(true, |j| j.status == JobStatus::Cancelled);
            if cancelled {
                debug!(task = %task, "cancelled before continuation, suppressing enqueue");
                return Ok(TaskOutcome::Discarded);
            }

            self.queue.enqueue(task.continuation()).await?;
            return Ok(TaskOutcome::Advanced);
        }

        // Step 8: the path is terminal.
        self.terminate_path(&job, task.image_id, decision).await
    }

    /// Converts a dead-lettered task into a failed result and a terminated
    /// path, so exhausted retries still leave the job accountable.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn handle_dead_letter(&self, task: &Task) -> Result<(), EngineError> {
        let Some(job) = self.store.fetch_job(task.job_id).await? else {
            return Ok(());
        };
        if job.status.is_terminal() {
            return Ok(());
        }

        self.sink
            .emit(
                names::TASK_DEAD_LETTERED,
                Some(json!({
                    "job_id": task.job_id,
                    "image_id": task.image_id,
                    "stage_index": task.stage_index,
                    "attempt": task.attempt,
                })),
            )
            .await;

        if let Some(stage) = job.snapshot.stage_at(task.stage_index) {
            let record = JobResult::new(
                task.job_id,
                task.image_id,
                stage.id,
                task.stage_index,
                crate::core::AnalysisResult::failed(format!(
                    "analysis transport failed after {} attempts",
                    task.attempt
                )),
            );
            // Put-if-absent: a racing delivery may have recorded a real result.
            let _ = self.store.record_result(record).await?;
        }

        self.terminate_path(&job, task.image_id, PathDecision::StageFailed)
            .await?;
        Ok(())
    }

    async fn terminate_path(
        &self,
        job: &Job,
        image_id: Uuid,
        decision: PathDecision,
    ) -> Result<TaskOutcome, EngineError> {
        let failed = decision.is_failure();
        let completion = self.store.complete_path(job.id, image_id, failed).await?;

        if completion == PathCompletion::AlreadyCounted {
            debug!(job_id = %job.id, image_id = %image_id, "path already counted, skipping");
            return Ok(TaskOutcome::Terminated {
                failed,
                job_finished: false,
            });
        }

        self.sink.try_emit(
            names::PATH_TERMINATED,
            Some(json!({
                "job_id": job.id,
                "image_id": image_id,
                "decision": decision.to_string(),
            })),
        );

        let job_finished = completion.reached_total() && self.finalize_job(job.id).await?;
        Ok(TaskOutcome::Terminated {
            failed,
            job_finished,
        })
    }

    /// Moves a drained job to its terminal status. Exactly one caller gets
    /// here per job because only one `complete_path` observes the total.
    async fn finalize_job(&self, job_id: Uuid) -> Result<bool, EngineError> {
        let Some(job) = self.store.fetch_job(job_id).await? else {
            return Ok(false);
        };

        let terminal = job.terminal_status();
        if terminal == JobStatus::Failed {
            self.store
                .set_error(
                    job_id,
                    format!(
                        "{} of {} image paths failed",
                        job.failed_paths, job.total_images
                    ),
                )
                .await?;
        }

        match self.store.transition(job_id, terminal).await? {
            TransitionOutcome::Applied => {
                let event = if terminal == JobStatus::Failed {
                    names::JOB_FAILED
                } else {
                    names::JOB_COMPLETED
                };
                self.sink
                    .emit(
                        event,
                        Some(json!({
                            "job_id": job_id,
                            "processed_images": job.processed_images,
                            "failed_paths": job.failed_paths,
                        })),
                    )
                    .await;
                Ok(true)
            }
            // A cancel won the race; the job stays cancelled.
            TransitionOutcome::AlreadyInTarget | TransitionOutcome::Rejected { .. } => Ok(false),
        }
    }
}
