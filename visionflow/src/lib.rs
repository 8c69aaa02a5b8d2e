//! # Visionflow
//!
//! A pipeline execution engine for batch image analysis.
//!
//! Visionflow drives a batch of images through an ordered sequence of
//! AI-analysis stages, honoring per-stage conditional filtering, tracking
//! fine-grained progress, persisting partial results, and surviving
//! failures, retries, and cancellation:
//!
//! - **Stage evaluation**: boolean stages can filter images out of the
//!   remainder of the pipeline
//! - **Durable job records**: counters and per-stage results survive
//!   redelivery and concurrent workers
//! - **At-least-once task queue**: backoff retries and dead-lettering for
//!   transport failures
//! - **Cooperative cancellation**: in-flight work settles cleanly instead
//!   of being killed
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use visionflow::prelude::*;
//!
//! let supervisor = JobSupervisor::new(store, catalog, queue.clone(), sink.clone());
//! let orchestrator = Arc::new(Orchestrator::new(store, queue.clone(), client, sink, &config));
//! let pool = WorkerPool::start(orchestrator, queue, &config);
//!
//! let job_id = supervisor.submit(request).await?;
//! let view = supervisor.inspect(job_id, requester).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod analysis;
pub mod core;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod events;
pub mod queue;
pub mod store;
pub mod supervisor;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::analysis::{AnalysisClient, TimeoutClient};
    pub use crate::core::{
        AnalysisPayload, AnalysisResult, FilterCondition, Job, JobResult, JobStatus,
        JobView, Pipeline, PipelineSnapshot, PromptConfig, PromptType, Stage, Task,
    };
    pub use crate::engine::{EngineConfig, Orchestrator, ShutdownToken, TaskOutcome, WorkerPool};
    pub use crate::errors::{
        EngineError, PipelineValidationError, QueueError, StoreError, SubmitError,
        SupervisorError, TransportError,
    };
    pub use crate::evaluator::{evaluate, PathDecision};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::queue::{
        BackoffStrategy, JitterStrategy, MemoryTaskQueue, QueueConfig, RetryPolicy,
        TaskQueue,
    };
    pub use crate::store::{Catalog, JobStore, MemoryCatalog, MemoryJobStore};
    pub use crate::supervisor::{JobSupervisor, SubmitRequest};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        assert!(true);
    }
}
