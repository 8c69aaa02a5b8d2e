//! The API-facing job supervisor: submit, inspect, cancel.
//!
//! Submission is all-or-nothing: every image id must resolve inside the
//! target library before a job row is created or a task enqueued. Jobs are
//! owned by their submitter; inspection and cancellation by anyone else
//! behave as if the job did not exist.

use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::core::{Job, JobStatus, JobView, Task};
use crate::errors::{SubmitError, SupervisorError};
use crate::events::{names, EventSink};
use crate::queue::TaskQueue;
use crate::store::{Catalog, JobStore, TransitionOutcome};

/// A job submission request.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// The pipeline to execute.
    pub pipeline_id: Uuid,
    /// The library the images belong to.
    pub library_id: Uuid,
    /// The images to process.
    pub image_ids: Vec<Uuid>,
    /// The submitting user; becomes the job owner.
    pub requester: Uuid,
}

/// Exposes the engine's submit/inspect/cancel surface to the API layer.
pub struct JobSupervisor {
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn Catalog>,
    queue: Arc<dyn TaskQueue>,
    sink: Arc<dyn EventSink>,
}

impl JobSupervisor {
    /// Wires a supervisor from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn Catalog>,
        queue: Arc<dyn TaskQueue>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            queue,
            sink,
        }
    }

    /// Validates and submits a job, returning its id immediately.
    ///
    /// The job is created in `Pending` with one stage-0 task enqueued per
    /// image; no stage has run by the time this returns.
    ///
    /// # Errors
    ///
    /// Rejects the whole submission — creating nothing — when the pipeline
    /// or library is unknown, the pipeline belongs to another library, the
    /// image list is empty, or any image id is missing from the library
    /// (every offending id is returned).
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid, SubmitError> {
        let pipeline = self
            .catalog
            .pipeline(request.pipeline_id)
            .await
            .ok_or(SubmitError::PipelineNotFound {
                pipeline_id: request.pipeline_id,
            })?;

        if !self.catalog.library_exists(request.library_id).await {
            return Err(SubmitError::LibraryNotFound {
                library_id: request.library_id,
            });
        }
        if pipeline.library_id != request.library_id {
            return Err(SubmitError::LibraryMismatch {
                pipeline_id: request.pipeline_id,
                library_id: request.library_id,
            });
        }
        if request.image_ids.is_empty() {
            return Err(SubmitError::NoImages);
        }

        let missing = self
            .catalog
            .missing_images(request.library_id, &request.image_ids)
            .await;
        if !missing.is_empty() {
            return Err(SubmitError::ImagesNotFound { missing });
        }

        let snapshot = pipeline.snapshot()?;
        let job = Job::new(
            request.pipeline_id,
            request.library_id,
            snapshot,
            request.image_ids,
            request.requester,
        );
        let job_id = job.id;
        let image_ids = job.image_ids.clone();
        let total = job.total_images;

        self.store.insert_job(job).await?;
        for image_id in image_ids {
            self.queue.enqueue(Task::initial(job_id, image_id)).await?;
        }

        info!(job_id = %job_id, total_images = total, "job submitted");
        self.sink
            .emit(
                names::JOB_SUBMITTED,
                Some(json!({
                    "job_id": job_id,
                    "pipeline_id": request.pipeline_id,
                    "total_images": total,
                })),
            )
            .await;

        Ok(job_id)
    }

    /// Returns the current view of a job, counters included, without ever
    /// blocking on completion.
    ///
    /// The full ordered results list is attached only once the job is
    /// `Completed`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the job does not exist or belongs to a
    /// different user.
    pub async fn inspect(&self, job_id: Uuid, requester: Uuid) -> Result<JobView, SupervisorError> {
        let job = self.owned_job(job_id, requester).await?;

        let view = JobView::from_job(&job);
        if job.status == JobStatus::Completed {
            let results = self.store.fetch_results(job_id).await?;
            return Ok(view.with_results(results));
        }
        Ok(view)
    }

    /// Cancels a job cooperatively.
    ///
    /// In-flight tasks are not killed; they observe the status at their
    /// next check and become no-ops.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for missing or foreign jobs and `InvalidState`
    /// when the job is already terminal.
    pub async fn cancel(&self, job_id: Uuid, requester: Uuid) -> Result<(), SupervisorError> {
        let job = self.owned_job(job_id, requester).await?;

        if job.status.is_terminal() {
            return Err(SupervisorError::InvalidState {
                job_id,
                status: job.status,
            });
        }

        match self.store.transition(job_id, JobStatus::Cancelled).await? {
            TransitionOutcome::Applied => {
                info!(job_id = %job_id, "job cancelled");
                self.sink
                    .emit(names::JOB_CANCELLED, Some(json!({ "job_id": job_id })))
                    .await;
                Ok(())
            }
            // Lost a race against completion or another cancel.
            TransitionOutcome::AlreadyInTarget => Err(SupervisorError::InvalidState {
                job_id,
                status: JobStatus::Cancelled,
            }),
            TransitionOutcome::Rejected { current } => Err(SupervisorError::InvalidState {
                job_id,
                status: current,
            }),
        }
    }

    async fn owned_job(&self, job_id: Uuid, requester: Uuid) -> Result<Job, SupervisorError> {
        let job = self
            .store
            .fetch_job(job_id)
            .await?
            .ok_or(SupervisorError::NotFound { job_id })?;

        // Foreign jobs look identical to missing ones.
        if job.created_by != requester {
            return Err(SupervisorError::NotFound { job_id });
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FilterCondition, Pipeline, PromptConfig, PromptType, Stage};
    use crate::events::NoOpEventSink;
    use crate::queue::{MemoryTaskQueue, QueueConfig};
    use crate::store::{MemoryCatalog, MemoryJobStore};

    struct Harness {
        supervisor: JobSupervisor,
        store: Arc<MemoryJobStore>,
        queue: Arc<MemoryTaskQueue>,
        pipeline_id: Uuid,
        library_id: Uuid,
        images: Vec<Uuid>,
        owner: Uuid,
    }

    fn harness(image_count: usize) -> Harness {
        let store = Arc::new(MemoryJobStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let owner = Uuid::new_v4();
        let library_id = Uuid::new_v4();

        let prompt = PromptConfig::new("person", "Is there a person?", PromptType::Boolean);
        let stage = Stage::new(1, prompt).with_filter(FilterCondition::IfTrue);
        let pipeline = Pipeline::new(library_id, "people", owner, vec![stage]);
        let pipeline_id = pipeline.id;
        catalog.insert_pipeline(pipeline);

        let images: Vec<Uuid> = (0..image_count).map(|_| Uuid::new_v4()).collect();
        catalog.insert_library(library_id, images.clone());

        let supervisor = JobSupervisor::new(
            store.clone(),
            catalog,
            queue.clone(),
            Arc::new(NoOpEventSink),
        );

        Harness {
            supervisor,
            store,
            queue,
            pipeline_id,
            library_id,
            images,
            owner,
        }
    }

    fn request(h: &Harness) -> SubmitRequest {
        SubmitRequest {
            pipeline_id: h.pipeline_id,
            library_id: h.library_id,
            image_ids: h.images.clone(),
            requester: h.owner,
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job_and_tasks() {
        let h = harness(3);
        let job_id = h.supervisor.submit(request(&h)).await.unwrap();

        let job = h.store.fetch_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_images, 3);
        assert_eq!(h.queue.depth(), 3);

        // Every initial task targets stage 0.
        for _ in 0..3 {
            let leased = h.queue.lease().await.unwrap().unwrap();
            assert_eq!(leased.task.stage_index, 0);
            assert_eq!(leased.task.job_id, job_id);
        }
    }

    #[tokio::test]
    async fn test_submit_unknown_pipeline() {
        let h = harness(1);
        let mut req = request(&h);
        req.pipeline_id = Uuid::new_v4();

        let err = h.supervisor.submit(req).await.unwrap_err();
        assert!(matches!(err, SubmitError::PipelineNotFound { .. }));
        assert_eq!(h.store.job_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_unknown_library() {
        let h = harness(1);
        let mut req = request(&h);
        req.library_id = Uuid::new_v4();

        let err = h.supervisor.submit(req).await.unwrap_err();
        assert!(matches!(err, SubmitError::LibraryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_submit_empty_image_list() {
        let h = harness(1);
        let mut req = request(&h);
        req.image_ids.clear();

        let err = h.supervisor.submit(req).await.unwrap_err();
        assert_eq!(err, SubmitError::NoImages);
    }

    #[tokio::test]
    async fn test_submit_missing_images_rejected_whole() {
        let h = harness(2);
        let stranger_a = Uuid::new_v4();
        let stranger_b = Uuid::new_v4();
        let mut req = request(&h);
        req.image_ids.push(stranger_a);
        req.image_ids.push(stranger_b);

        let err = h.supervisor.submit(req).await.unwrap_err();
        match err {
            SubmitError::ImagesNotFound { missing } => {
                assert_eq!(missing, vec![stranger_a, stranger_b]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // No job row, no tasks.
        assert_eq!(h.store.job_count(), 0);
        assert_eq!(h.queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_inspect_returns_live_counters() {
        let h = harness(2);
        let job_id = h.supervisor.submit(request(&h)).await.unwrap();

        let view = h.supervisor.inspect(job_id, h.owner).await.unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert_eq!(view.processed_images, 0);
        assert!(view.results.is_none());
    }

    #[tokio::test]
    async fn test_inspect_foreign_job_is_not_found() {
        let h = harness(1);
        let job_id = h.supervisor.submit(request(&h)).await.unwrap();

        let err = h
            .supervisor
            .inspect(job_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound { .. }));

        let err = h
            .supervisor
            .inspect(Uuid::new_v4(), h.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let h = harness(2);
        let job_id = h.supervisor.submit(request(&h)).await.unwrap();

        h.supervisor.cancel(job_id, h.owner).await.unwrap();

        let job = h.store.fetch_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_invalid_state() {
        let h = harness(1);
        let job_id = h.supervisor.submit(request(&h)).await.unwrap();

        h.store.mark_processing(job_id).await.unwrap();
        h.store
            .transition(job_id, JobStatus::Completed)
            .await
            .unwrap();

        let err = h.supervisor.cancel(job_id, h.owner).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::InvalidState {
                status: JobStatus::Completed,
                ..
            }
        ));

        // Cancelling twice is also invalid.
        let h2 = harness(1);
        let job_id = h2.supervisor.submit(request(&h2)).await.unwrap();
        h2.supervisor.cancel(job_id, h2.owner).await.unwrap();
        let err = h2.supervisor.cancel(job_id, h2.owner).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidState { .. }));
    }
}
