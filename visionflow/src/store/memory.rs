//! In-memory store backends.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::core::{Job, JobResult, JobStatus, Pipeline};
use crate::errors::StoreError;

use super::{Catalog, JobStore, PathCompletion, RecordOutcome, TransitionOutcome};

/// In-memory [`JobStore`] backed by concurrent maps.
///
/// Mutations of one job's record happen under that job's map shard lock, so
/// `complete_path` and `transition` behave as the single atomic operations
/// the orchestrator requires.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Uuid, Job>,
    results: DashMap<Uuid, Mutex<HashMap<(Uuid, usize), JobResult>>>,
    terminated: DashMap<Uuid, HashSet<Uuid>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Returns the number of stored results for a job.
    #[must_use]
    pub fn result_count(&self, job_id: Uuid) -> usize {
        self.results
            .get(&job_id)
            .map_or(0, |entry| entry.lock().len())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: Job) -> Result<(), StoreError> {
        let job_id = job.id;
        match self.jobs.entry(job_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::DuplicateJob { job_id })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    async fn fetch_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), StoreError> {
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(StoreError::JobNotFound { job_id: id })?;

        if job.status == JobStatus::Pending {
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn transition(&self, id: Uuid, to: JobStatus) -> Result<TransitionOutcome, StoreError> {
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(StoreError::JobNotFound { job_id: id })?;

        if job.status == to {
            return Ok(TransitionOutcome::AlreadyInTarget);
        }
        if !job.status.can_transition_to(to) {
            return Ok(TransitionOutcome::Rejected {
                current: job.status,
            });
        }

        job.status = to;
        if to.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn find_result(
        &self,
        job_id: Uuid,
        image_id: Uuid,
        stage_index: usize,
    ) -> Result<Option<JobResult>, StoreError> {
        Ok(self
            .results
            .get(&job_id)
            .and_then(|entry| entry.lock().get(&(image_id, stage_index)).cloned()))
    }

    async fn record_result(&self, result: JobResult) -> Result<RecordOutcome, StoreError> {
        let entry = self.results.entry(result.job_id).or_default();
        let mut map = entry.lock();

        let key = (result.image_id, result.stage_index);
        if let Some(existing) = map.get(&key) {
            return Ok(RecordOutcome::Duplicate(existing.clone()));
        }
        map.insert(key, result);
        Ok(RecordOutcome::Inserted)
    }

    async fn complete_path(
        &self,
        job_id: Uuid,
        image_id: Uuid,
        failed: bool,
    ) -> Result<PathCompletion, StoreError> {
        // The job entry lock spans the whole check-and-increment; the
        // terminated set is only ever touched while it is held.
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound { job_id })?;

        if !self.terminated.entry(job_id).or_default().insert(image_id) {
            return Ok(PathCompletion::AlreadyCounted);
        }

        if job.processed_images >= job.total_images {
            return Err(StoreError::CounterOverflow {
                job_id,
                total: job.total_images,
            });
        }

        job.processed_images += 1;
        if failed {
            job.failed_paths += 1;
        }

        Ok(PathCompletion::Counted {
            processed: job.processed_images,
            total: job.total_images,
            reached_total: job.processed_images == job.total_images,
        })
    }

    async fn fetch_results(&self, job_id: Uuid) -> Result<Vec<JobResult>, StoreError> {
        let job = self
            .jobs
            .get(&job_id)
            .ok_or(StoreError::JobNotFound { job_id })?;

        // Image submission order, then stage order within each path.
        let image_positions: HashMap<Uuid, usize> = job
            .image_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        drop(job);

        let mut results: Vec<JobResult> = self
            .results
            .get(&job_id)
            .map(|entry| entry.lock().values().cloned().collect())
            .unwrap_or_default();

        results.sort_by_key(|r| {
            (
                image_positions.get(&r.image_id).copied().unwrap_or(usize::MAX),
                r.stage_index,
            )
        });
        Ok(results)
    }

    async fn set_error(&self, job_id: Uuid, message: String) -> Result<(), StoreError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound { job_id })?;
        job.error_message = Some(message);
        Ok(())
    }
}

/// In-memory [`Catalog`] seeded by tests and fixtures.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    pipelines: DashMap<Uuid, Pipeline>,
    libraries: DashMap<Uuid, HashSet<Uuid>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipeline.
    pub fn insert_pipeline(&self, pipeline: Pipeline) {
        self.pipelines.insert(pipeline.id, pipeline);
    }

    /// Registers a library with its image set.
    pub fn insert_library(&self, library_id: Uuid, image_ids: impl IntoIterator<Item = Uuid>) {
        self.libraries
            .insert(library_id, image_ids.into_iter().collect());
    }

    /// Adds one image to an existing library.
    pub fn add_image(&self, library_id: Uuid, image_id: Uuid) {
        self.libraries.entry(library_id).or_default().insert(image_id);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn pipeline(&self, id: Uuid) -> Option<Pipeline> {
        self.pipelines.get(&id).map(|entry| entry.value().clone())
    }

    async fn library_exists(&self, id: Uuid) -> bool {
        self.libraries.contains_key(&id)
    }

    async fn missing_images(&self, library_id: Uuid, ids: &[Uuid]) -> Vec<Uuid> {
        match self.libraries.get(&library_id) {
            Some(images) => ids
                .iter()
                .filter(|id| !images.contains(id))
                .copied()
                .collect(),
            None => ids.to_vec(),
        }
    }
}
