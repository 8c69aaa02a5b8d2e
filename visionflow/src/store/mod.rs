//! Durable record store contracts for jobs, results, and catalog lookups.
//!
//! The orchestrator and supervisor receive these as `Arc<dyn ...>`
//! constructor parameters; there are no module-level singletons. The
//! in-memory backend in [`memory`] is the reference implementation used by
//! tests and benches.

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{Job, JobResult, JobStatus, Pipeline};
use crate::errors::StoreError;

mod memory;

pub use memory::{MemoryCatalog, MemoryJobStore};

/// Outcome of a compare-and-set status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was applied.
    Applied,
    /// The job was already in the target status; nothing changed.
    AlreadyInTarget,
    /// The machine forbids the transition from the current status.
    Rejected {
        /// The status that blocked the transition.
        current: JobStatus,
    },
}

impl TransitionOutcome {
    /// Returns true if the job ended up in the target status.
    #[must_use]
    pub fn reached_target(&self) -> bool {
        matches!(self, Self::Applied | Self::AlreadyInTarget)
    }
}

/// Outcome of recording a stage result.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// The result was written.
    Inserted,
    /// A result for this (job, image, stage index) already exists; the
    /// stored record is returned so the caller can replay its decision.
    Duplicate(JobResult),
}

/// Outcome of terminating one image's path.
///
/// Produced by a single atomic check-and-increment: the counter moves at
/// most once per image, and `reached_total` is handed to exactly one caller
/// even under concurrent completions of a job's last paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCompletion {
    /// The path was counted.
    Counted {
        /// The counter value after the increment.
        processed: u32,
        /// The job's image total.
        total: u32,
        /// True for the one caller whose increment hit the total.
        reached_total: bool,
    },
    /// This image's path was already counted; nothing changed.
    AlreadyCounted,
}

impl PathCompletion {
    /// Returns true if this call's increment hit the job total.
    #[must_use]
    pub fn reached_total(&self) -> bool {
        matches!(
            self,
            Self::Counted {
                reached_total: true,
                ..
            }
        )
    }
}

/// Durable store for job records and their per-stage results.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateJob`] if the id is already present.
    async fn insert_job(&self, job: Job) -> Result<(), StoreError>;

    /// Fetches a job by id. `None` when the job does not exist.
    ///
    /// # Errors
    ///
    /// Returns a store error when the backend fails.
    async fn fetch_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Moves a `Pending` job to `Processing`, stamping `started_at`.
    ///
    /// Idempotent: a job already past `Pending` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids.
    async fn mark_processing(&self, id: Uuid) -> Result<(), StoreError>;

    /// Compare-and-set status transition honoring the job status machine.
    ///
    /// Terminal targets stamp `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids.
    async fn transition(&self, id: Uuid, to: JobStatus) -> Result<TransitionOutcome, StoreError>;

    /// Returns the stored result for (job, image, stage index), if any.
    ///
    /// A redelivered task uses this to skip re-invoking the analysis
    /// service and replay the recorded decision instead.
    ///
    /// # Errors
    ///
    /// Returns a store error when the backend fails.
    async fn find_result(
        &self,
        job_id: Uuid,
        image_id: Uuid,
        stage_index: usize,
    ) -> Result<Option<JobResult>, StoreError>;

    /// Records a stage result, put-if-absent on (job, image, stage index).
    ///
    /// # Errors
    ///
    /// Returns a store error when the backend fails.
    async fn record_result(&self, result: JobResult) -> Result<RecordOutcome, StoreError>;

    /// Atomically counts one terminated path, bumping `failed_paths` when
    /// the path ended in stage failure.
    ///
    /// Idempotent per image: a path already counted (e.g., a redelivered
    /// terminal task) returns [`PathCompletion::AlreadyCounted`] and moves
    /// no counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids and
    /// [`StoreError::CounterOverflow`] if the counter would pass
    /// `total_images`.
    async fn complete_path(
        &self,
        job_id: Uuid,
        image_id: Uuid,
        failed: bool,
    ) -> Result<PathCompletion, StoreError>;

    /// Returns all results for a job, ordered by image submission order and
    /// then stage index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids.
    async fn fetch_results(&self, job_id: Uuid) -> Result<Vec<JobResult>, StoreError>;

    /// Attaches a failure detail message to the job record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids.
    async fn set_error(&self, job_id: Uuid, message: String) -> Result<(), StoreError>;
}

/// Read-only catalog used for submission-time validation.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolves a pipeline definition.
    async fn pipeline(&self, id: Uuid) -> Option<Pipeline>;

    /// Returns true if the library exists.
    async fn library_exists(&self, id: Uuid) -> bool;

    /// Returns every id from `ids` that does not resolve to an image in the
    /// given library, preserving input order.
    async fn missing_images(&self, library_id: Uuid, ids: &[Uuid]) -> Vec<Uuid>;
}
