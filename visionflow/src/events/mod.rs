//! Engine event emission.
//!
//! Sinks receive a narrow stream of lifecycle events (job submitted, task
//! started, path terminated, ...) for observability and test assertions.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the engine.
pub mod names {
    /// A job was created and its initial tasks enqueued.
    pub const JOB_SUBMITTED: &str = "job.submitted";
    /// A job's first task was accepted by a worker.
    pub const JOB_PROCESSING: &str = "job.processing";
    /// Every path terminated and none failed.
    pub const JOB_COMPLETED: &str = "job.completed";
    /// Every path terminated and at least one failed.
    pub const JOB_FAILED: &str = "job.failed";
    /// The owner cancelled the job.
    pub const JOB_CANCELLED: &str = "job.cancelled";
    /// A worker started processing a task.
    pub const TASK_STARTED: &str = "task.started";
    /// A task was handed back for redelivery after a transport failure.
    pub const TASK_RETRIED: &str = "task.retried";
    /// A task exhausted its delivery attempts.
    pub const TASK_DEAD_LETTERED: &str = "task.dead_lettered";
    /// One image's path terminated.
    pub const PATH_TERMINATED: &str = "path.terminated";
}
