//! Job records, the job status machine, and per-stage result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::pipeline::PipelineSnapshot;
use crate::core::prompt::AnalysisResult;

/// The lifecycle state of a job.
///
/// ```text
/// pending -> processing -> completed
/// pending -> processing -> failed
/// pending -> cancelled
/// processing -> cancelled
/// ```
///
/// Terminal states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, no task accepted by a worker yet.
    Pending,
    /// At least one task has been accepted.
    Processing,
    /// Every path terminated and none failed.
    Completed,
    /// Every path terminated and at least one failed.
    Failed,
    /// Explicitly cancelled by the owner.
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the machine permits a transition to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending | Self::Processing, Self::Cancelled)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}

/// One execution request: a pipeline applied to an explicit image set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id.
    pub id: Uuid,
    /// The pipeline this job executes.
    pub pipeline_id: Uuid,
    /// The library the images belong to.
    pub library_id: Uuid,
    /// Stage list frozen at submission time.
    pub snapshot: PipelineSnapshot,
    /// The images to process.
    pub image_ids: Vec<Uuid>,
    /// Number of target images.
    pub total_images: u32,
    /// Number of images whose path has terminated. Monotone, <= total.
    pub processed_images: u32,
    /// Number of paths that terminated in a stage failure.
    pub failed_paths: u32,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// The user that submitted the job; owns inspection and cancellation.
    pub created_by: Uuid,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When the first task was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure detail, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// Creates a new job in `Pending` over the given snapshot and images.
    #[must_use]
    pub fn new(
        pipeline_id: Uuid,
        library_id: Uuid,
        snapshot: PipelineSnapshot,
        image_ids: Vec<Uuid>,
        created_by: Uuid,
    ) -> Self {
        let total_images = image_ids.len() as u32;
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            library_id,
            snapshot,
            image_ids,
            total_images,
            processed_images: 0,
            failed_paths: 0,
            status: JobStatus::Pending,
            created_by,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Returns true if every image's path has terminated.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.processed_images == self.total_images
    }

    /// The terminal status this job should land in once drained.
    ///
    /// A job with any failed path ends `Failed`; the distinction is recorded
    /// explicitly rather than coerced to `Completed`.
    #[must_use]
    pub fn terminal_status(&self) -> JobStatus {
        if self.failed_paths > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }
}

/// Append-only record of one image's outcome at one stage.
///
/// At most one record exists per (job, image, stage index); a redelivered
/// task replays the stored record instead of writing a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// The job this result belongs to.
    pub job_id: Uuid,
    /// The image that was analyzed.
    pub image_id: Uuid,
    /// The stage that ran, by id.
    pub stage_id: Uuid,
    /// The stage that ran, by snapshot index.
    pub stage_index: usize,
    /// The raw analysis outcome, success or failure.
    pub result: AnalysisResult,
    /// When the stage executed.
    pub executed_at: DateTime<Utc>,
}

impl JobResult {
    /// Creates a result record stamped with the current time.
    #[must_use]
    pub fn new(
        job_id: Uuid,
        image_id: Uuid,
        stage_id: Uuid,
        stage_index: usize,
        result: AnalysisResult,
    ) -> Self {
        Self {
            job_id,
            image_id,
            stage_id,
            stage_index,
            result,
            executed_at: Utc::now(),
        }
    }
}

/// Read-only view of a job returned by inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    /// The job id.
    pub id: Uuid,
    /// The pipeline the job executes.
    pub pipeline_id: Uuid,
    /// Current status.
    pub status: JobStatus,
    /// Number of target images.
    pub total_images: u32,
    /// Number of terminated paths.
    pub processed_images: u32,
    /// Number of paths that failed.
    pub failed_paths: u32,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When the first task was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure detail, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Full ordered results; only populated for `Completed` jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<JobResult>>,
}

impl JobView {
    /// Builds a view from a job, without results.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            pipeline_id: job.pipeline_id,
            status: job.status,
            total_images: job.total_images,
            processed_images: job.processed_images,
            failed_paths: job.failed_paths,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message.clone(),
            results: None,
        }
    }

    /// Attaches the ordered results list.
    #[must_use]
    pub fn with_results(mut self, results: Vec<JobResult>) -> Self {
        self.results = Some(results);
        self
    }
}
