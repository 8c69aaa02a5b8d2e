//! Fixtures that wire a fully in-memory engine.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::analysis::AnalysisClient;
use crate::core::{FilterCondition, Job, JobStatus, Pipeline, PromptConfig, PromptType, Stage};
use crate::engine::{EngineConfig, Orchestrator, WorkerPool};
use crate::errors::{StoreError, SubmitError};
use crate::events::CollectingEventSink;
use crate::queue::{JitterStrategy, MemoryTaskQueue, QueueConfig, RetryPolicy, TaskQueue};
use crate::store::{JobStore, MemoryCatalog, MemoryJobStore};
use crate::supervisor::{JobSupervisor, SubmitRequest};

/// Installs a compact tracing subscriber for test runs.
///
/// Honors `RUST_LOG`; safe to call from several tests, only the first call
/// installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Builds a boolean stage with an optional filter.
#[must_use]
pub fn boolean_stage(order: u32, filter: Option<FilterCondition>) -> Stage {
    let prompt = PromptConfig::new(
        format!("boolean-{order}"),
        "Does the image match?",
        PromptType::Boolean,
    );
    let stage = Stage::new(order, prompt);
    match filter {
        Some(condition) => stage.with_filter(condition),
        None => stage,
    }
}

/// Builds a descriptive stage.
#[must_use]
pub fn descriptive_stage(order: u32) -> Stage {
    let prompt = PromptConfig::new(
        format!("describe-{order}"),
        "Describe the image.",
        PromptType::Descriptive,
    );
    Stage::new(order, prompt)
}

/// Builds a keywords stage.
#[must_use]
pub fn keywords_stage(order: u32) -> Stage {
    let prompt = PromptConfig::new(
        format!("keywords-{order}"),
        "List keywords for the image.",
        PromptType::Keywords,
    );
    Stage::new(order, prompt)
}

/// A fully wired in-memory engine for integration-style tests.
///
/// Uses fast retry and poll intervals so at-least-once behavior can be
/// exercised in milliseconds.
pub struct EngineHarness {
    /// The backing job store.
    pub store: Arc<MemoryJobStore>,
    /// The catalog seeded with one library and one pipeline.
    pub catalog: Arc<MemoryCatalog>,
    /// The task queue.
    pub queue: Arc<MemoryTaskQueue>,
    /// Collects every emitted event.
    pub sink: Arc<CollectingEventSink>,
    /// The submit/inspect/cancel surface.
    pub supervisor: JobSupervisor,
    /// The per-task processor.
    pub orchestrator: Arc<Orchestrator>,
    /// Engine tunables used by [`EngineHarness::start_pool`].
    pub config: EngineConfig,
    /// The seeded pipeline.
    pub pipeline_id: Uuid,
    /// The seeded library.
    pub library_id: Uuid,
    /// The seeded images.
    pub images: Vec<Uuid>,
    /// The job owner used by [`EngineHarness::submit`].
    pub owner: Uuid,
}

impl EngineHarness {
    /// Wires a harness around the given stages, image count, and client.
    #[must_use]
    pub fn new(stages: Vec<Stage>, image_count: usize, client: Arc<dyn AnalysisClient>) -> Self {
        let queue_config = QueueConfig::new()
            .with_max_attempts(3)
            .with_retry(
                RetryPolicy::new()
                    .with_base_delay_ms(1)
                    .with_jitter(JitterStrategy::None),
            )
            .with_lease_timeout_ms(10_000);

        let engine_config = EngineConfig::new()
            .with_worker_count(4)
            .with_analysis_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10))
            .with_drain_interval(Duration::from_millis(15));

        Self::with_configs(stages, image_count, client, queue_config, engine_config)
    }

    /// Wires a harness with explicit queue and engine configs.
    #[must_use]
    pub fn with_configs(
        stages: Vec<Stage>,
        image_count: usize,
        client: Arc<dyn AnalysisClient>,
        queue_config: QueueConfig,
        engine_config: EngineConfig,
    ) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let queue = Arc::new(MemoryTaskQueue::new(queue_config));
        let sink = Arc::new(CollectingEventSink::new());

        let owner = Uuid::new_v4();
        let library_id = Uuid::new_v4();
        let pipeline = Pipeline::new(library_id, "harness", owner, stages);
        let pipeline_id = pipeline.id;
        catalog.insert_pipeline(pipeline);

        let images: Vec<Uuid> = (0..image_count).map(|_| Uuid::new_v4()).collect();
        catalog.insert_library(library_id, images.clone());

        let supervisor = JobSupervisor::new(
            store.clone(),
            catalog.clone(),
            queue.clone(),
            sink.clone(),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            queue.clone(),
            client,
            sink.clone(),
            &engine_config,
        ));

        Self {
            store,
            catalog,
            queue,
            sink,
            supervisor,
            orchestrator,
            config: engine_config,
            pipeline_id,
            library_id,
            images,
            owner,
        }
    }

    /// Builds a submission for the seeded pipeline over all seeded images.
    #[must_use]
    pub fn submit_request(&self) -> SubmitRequest {
        SubmitRequest {
            pipeline_id: self.pipeline_id,
            library_id: self.library_id,
            image_ids: self.images.clone(),
            requester: self.owner,
        }
    }

    /// Submits the seeded job.
    ///
    /// # Errors
    ///
    /// Propagates submission validation failures.
    pub async fn submit(&self) -> Result<Uuid, SubmitError> {
        self.supervisor.submit(self.submit_request()).await
    }

    /// Starts a worker pool over the harness queue.
    #[must_use]
    pub fn start_pool(&self) -> WorkerPool {
        WorkerPool::start(
            self.orchestrator.clone(),
            self.queue.clone() as Arc<dyn TaskQueue>,
            &self.config,
        )
    }

    /// Fetches the job record.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.store.fetch_job(job_id).await
    }

    /// Polls until the job reaches a terminal status, or `None` on timeout.
    pub async fn wait_terminal(&self, job_id: Uuid, timeout: Duration) -> Option<JobStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(Some(job)) = self.store.fetch_job(job_id).await {
                if job.status.is_terminal() {
                    return Some(job.status);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
