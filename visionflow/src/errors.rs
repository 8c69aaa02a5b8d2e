//! Error taxonomy for the execution engine.
//!
//! Submission-time validation, store, queue, and transport failures each get
//! their own focused enum; [`EngineError`] is the umbrella used at the
//! crate's outer edges.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::core::JobStatus;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A pipeline definition failed validation.
    #[error("{0}")]
    PipelineValidation(#[from] PipelineValidationError),

    /// A job submission was rejected.
    #[error("{0}")]
    Submit(#[from] SubmitError),

    /// An inspection or cancellation request failed.
    #[error("{0}")]
    Supervisor(#[from] SupervisorError),

    /// A durable-store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A queue operation failed.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// The analysis service could not be reached.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error raised when a pipeline definition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineValidationError {
    /// The pipeline has no stages.
    #[error("pipeline {pipeline_id} has no stages")]
    Empty {
        /// The offending pipeline.
        pipeline_id: Uuid,
    },

    /// A stage order value is zero; orders are positive integers.
    #[error("pipeline {pipeline_id} stage {stage_id} has order 0")]
    NonPositiveOrder {
        /// The offending pipeline.
        pipeline_id: Uuid,
        /// The offending stage.
        stage_id: Uuid,
    },

    /// Two stages share an order value.
    #[error("pipeline {pipeline_id} has duplicate stage order {order}")]
    DuplicateOrder {
        /// The offending pipeline.
        pipeline_id: Uuid,
        /// The duplicated order value.
        order: u32,
    },
}

/// Error raised when a job submission is rejected.
///
/// Submissions are all-or-nothing: any failure means no job row was created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The referenced pipeline does not exist.
    #[error("pipeline not found: {pipeline_id}")]
    PipelineNotFound {
        /// The missing pipeline.
        pipeline_id: Uuid,
    },

    /// The referenced library does not exist.
    #[error("library not found: {library_id}")]
    LibraryNotFound {
        /// The missing library.
        library_id: Uuid,
    },

    /// The pipeline belongs to a different library than the one submitted.
    #[error("pipeline {pipeline_id} does not belong to library {library_id}")]
    LibraryMismatch {
        /// The submitted pipeline.
        pipeline_id: Uuid,
        /// The submitted library.
        library_id: Uuid,
    },

    /// The submission named no images.
    #[error("submission contains no images")]
    NoImages,

    /// One or more image ids do not resolve within the target library.
    #[error("{} image id(s) not found in library", missing.len())]
    ImagesNotFound {
        /// Every offending id, returned to the caller.
        missing: Vec<Uuid>,
    },

    /// The pipeline definition itself is invalid.
    #[error("{0}")]
    InvalidPipeline(#[from] PipelineValidationError),

    /// The job record could not be stored.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Initial tasks could not be enqueued.
    #[error("{0}")]
    Queue(#[from] QueueError),
}

/// Error raised by job inspection and cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// The job does not exist or is not owned by the requester.
    #[error("job not found: {job_id}")]
    NotFound {
        /// The requested job.
        job_id: Uuid,
    },

    /// The job is already in a terminal state.
    #[error("job {job_id} is {status}, operation not permitted")]
    InvalidState {
        /// The requested job.
        job_id: Uuid,
        /// The status that blocked the operation.
        status: JobStatus,
    },

    /// The backing store failed.
    #[error("{0}")]
    Store(#[from] StoreError),
}

/// Error raised by durable-store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The job does not exist.
    #[error("job not found: {job_id}")]
    JobNotFound {
        /// The requested job.
        job_id: Uuid,
    },

    /// A job with this id already exists.
    #[error("job already exists: {job_id}")]
    DuplicateJob {
        /// The duplicated job id.
        job_id: Uuid,
    },

    /// `processed_images` would exceed `total_images`.
    #[error("job {job_id} counter overflow: processed would exceed total {total}")]
    CounterOverflow {
        /// The affected job.
        job_id: Uuid,
        /// The job's image total.
        total: u32,
    },
}

/// Error raised by queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue has been shut down.
    #[error("queue is closed")]
    Closed,

    /// The lease handle is unknown or already settled.
    #[error("unknown lease handle: {handle}")]
    UnknownLease {
        /// The offending handle.
        handle: u64,
    },
}

/// Error raised when the analysis service cannot be reached.
///
/// Transport failures are retried by the queue's backoff policy; they never
/// become a recorded `JobResult` until retries are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The bounded wait on the service call elapsed.
    #[error("analysis call timed out after {timeout:?}")]
    Timeout {
        /// The enforced bound.
        timeout: Duration,
    },

    /// The service was unreachable.
    #[error("analysis service unreachable: {reason}")]
    Unreachable {
        /// Connection-level detail.
        reason: String,
    },

    /// The service returned a non-success protocol status.
    #[error("analysis service returned status {status}")]
    Status {
        /// The protocol status code.
        status: u16,
    },

    /// The service response could not be decoded.
    #[error("malformed analysis response: {reason}")]
    Malformed {
        /// Decoding detail.
        reason: String,
    },
}

impl TransportError {
    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_lists_missing_ids() {
        let missing = vec![Uuid::new_v4(), Uuid::new_v4()];
        let err = SubmitError::ImagesNotFound {
            missing: missing.clone(),
        };

        assert!(err.to_string().contains("2 image id(s)"));
        if let SubmitError::ImagesNotFound { missing: got } = err {
            assert_eq!(got, missing);
        }
    }

    #[test]
    fn test_supervisor_invalid_state_message() {
        let job_id = Uuid::new_v4();
        let err = SupervisorError::InvalidState {
            job_id,
            status: JobStatus::Completed,
        };
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn test_engine_error_wraps_submit() {
        let err: EngineError = SubmitError::NoImages.into();
        assert!(matches!(err, EngineError::Submit(SubmitError::NoImages)));
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout {
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("timed out"));

        let err = TransportError::unreachable("connection refused");
        assert!(err.to_string().contains("connection refused"));
    }
}
