//! End-to-end tests over a fully in-memory engine.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    AnalysisPayload, AnalysisResult, FilterCondition, JobStatus,
};
use crate::engine::TaskOutcome;
use crate::events::names;
use crate::queue::TaskQueue;
use crate::store::JobStore;
use crate::testing::{
    boolean_stage, descriptive_stage, keywords_stage, EngineHarness, FlakyAnalysisClient,
    ScriptedAnalysisClient,
};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_filtered_pipeline_end_to_end() {
    crate::testing::init_test_logging();

    // Stage 1 filters on "true", stage 2 describes survivors.
    let stage1 = boolean_stage(1, Some(FilterCondition::IfTrue));
    let stage2 = descriptive_stage(2);
    let boolean_prompt = stage1.prompt.id;
    let describe_prompt = stage2.prompt.id;

    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(vec![stage1, stage2], 3, client.clone());

    // Verdicts per image: true, false, true.
    client.script(
        harness.images[1],
        boolean_prompt,
        AnalysisResult::succeeded(AnalysisPayload::Boolean { value: false }),
    );
    for &image in &[harness.images[0], harness.images[2]] {
        client.script(
            image,
            describe_prompt,
            AnalysisResult::succeeded(AnalysisPayload::Descriptive {
                text: "a person on a beach".to_string(),
            }),
        );
    }

    let job_id = harness.submit().await.unwrap();
    let pool = harness.start_pool();
    let status = harness.wait_terminal(job_id, DRAIN_TIMEOUT).await;
    pool.shutdown().await;

    assert_eq!(status, Some(JobStatus::Completed));

    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.processed_images, 3);
    assert_eq!(job.failed_paths, 0);

    // Image 2 stops after stage 1; images 1 and 3 run both stages.
    let results = harness.store.fetch_results(job_id).await.unwrap();
    assert_eq!(results.len(), 5);
    let per_image = |image| {
        results
            .iter()
            .filter(|r| r.image_id == image)
            .count()
    };
    assert_eq!(per_image(harness.images[0]), 2);
    assert_eq!(per_image(harness.images[1]), 1);
    assert_eq!(per_image(harness.images[2]), 2);

    // Completed jobs expose the ordered results through inspection.
    let view = harness
        .supervisor
        .inspect(job_id, harness.owner)
        .await
        .unwrap();
    let ordered = view.results.unwrap();
    assert_eq!(ordered.len(), 5);
    assert_eq!(ordered[0].image_id, harness.images[0]);
    assert_eq!(ordered[0].stage_index, 0);
    assert_eq!(ordered[1].stage_index, 1);

    assert_eq!(harness.sink.events_of(names::JOB_SUBMITTED).len(), 1);
    assert_eq!(harness.sink.events_of(names::JOB_COMPLETED).len(), 1);
    assert!(harness.sink.events_of(names::JOB_FAILED).is_empty());
}

#[tokio::test]
async fn test_redelivered_task_replays_without_side_effects() {
    // Two images so the job is still live when the duplicate arrives.
    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(vec![boolean_stage(1, None)], 2, client.clone());

    let job_id = harness.submit().await.unwrap();
    let leased = harness.queue.lease().await.unwrap().unwrap();

    let outcome = harness.orchestrator.process(&leased.task).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Terminated {
            failed: false,
            job_finished: false
        }
    );
    harness.queue.ack(leased.handle).await.unwrap();
    assert_eq!(client.total_calls(), 1);

    // Simulate at-least-once delivery of the same unit of work. The stored
    // result is replayed: no second service call, no second count.
    let outcome = harness
        .orchestrator
        .process(&leased.task.redelivered())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Terminated {
            failed: false,
            job_finished: false
        }
    );

    assert_eq!(client.total_calls(), 1);
    assert_eq!(harness.store.result_count(job_id), 1);
    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.processed_images, 1);
    assert_eq!(job.status, JobStatus::Processing);

    // The remaining image drains the job normally.
    let leased = harness.queue.lease().await.unwrap().unwrap();
    let outcome = harness.orchestrator.process(&leased.task).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Terminated {
            failed: false,
            job_finished: true
        }
    );
    harness.queue.ack(leased.handle).await.unwrap();

    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_images, 2);
}

#[tokio::test]
async fn test_concurrent_last_images_single_terminal_transition() {
    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(vec![boolean_stage(1, None)], 2, client);

    let job_id = harness.submit().await.unwrap();
    let first = harness.queue.lease().await.unwrap().unwrap();
    let second = harness.queue.lease().await.unwrap().unwrap();

    let orchestrator_a = harness.orchestrator.clone();
    let orchestrator_b = harness.orchestrator.clone();
    let task_a = first.task.clone();
    let task_b = second.task.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { orchestrator_a.process(&task_a).await.unwrap() }),
        tokio::spawn(async move { orchestrator_b.process(&task_b).await.unwrap() }),
    );

    let finishes = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|outcome| {
            matches!(
                outcome,
                TaskOutcome::Terminated {
                    job_finished: true,
                    ..
                }
            )
        })
        .count();

    // Exactly one of the two finishing workers performs the transition.
    assert_eq!(finishes, 1);
    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_images, 2);
}

#[tokio::test]
async fn test_cancel_suppresses_continuations() {
    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(
        vec![boolean_stage(1, None), descriptive_stage(2)],
        10,
        client.clone(),
    );

    let job_id = harness.submit().await.unwrap();

    // Advance 5 of 10 images through stage 1 by hand; each enqueues its
    // stage-2 continuation.
    for _ in 0..5 {
        let leased = harness.queue.lease().await.unwrap().unwrap();
        let outcome = harness.orchestrator.process(&leased.task).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Advanced);
        harness.queue.ack(leased.handle).await.unwrap();
    }

    harness.supervisor.cancel(job_id, harness.owner).await.unwrap();
    let calls_at_cancel = client.total_calls();

    // Everything still queued is now a no-op.
    while let Some(leased) = harness.queue.lease().await.unwrap() {
        let outcome = harness.orchestrator.process(&leased.task).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Discarded);
        harness.queue.ack(leased.handle).await.unwrap();
    }

    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.processed_images, 0);
    assert_eq!(client.total_calls(), calls_at_cancel);
    assert_eq!(harness.queue.depth(), 0);
}

#[tokio::test]
async fn test_stage_failure_fails_job_but_not_other_paths() {
    let stage = boolean_stage(1, None);
    let prompt_id = stage.prompt.id;

    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(vec![stage], 3, client.clone());
    client.script(
        harness.images[1],
        prompt_id,
        AnalysisResult::failed("image could not be decoded"),
    );

    let job_id = harness.submit().await.unwrap();
    let pool = harness.start_pool();
    let status = harness.wait_terminal(job_id, DRAIN_TIMEOUT).await;
    pool.shutdown().await;

    // One failed path makes the job Failed, but every path ran.
    assert_eq!(status, Some(JobStatus::Failed));
    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.processed_images, 3);
    assert_eq!(job.failed_paths, 1);
    assert!(job.error_message.unwrap().contains("1 of 3"));

    let results = harness.store.fetch_results(job_id).await.unwrap();
    assert_eq!(results.len(), 3);
    let failed: Vec<_> = results.iter().filter(|r| !r.result.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].image_id, harness.images[1]);
}

#[tokio::test]
async fn test_transport_failure_retried_by_queue_then_succeeds() {
    // Two transport failures, then a clean answer: within the 3-attempt
    // budget, so the path completes without a failure record.
    let client = Arc::new(FlakyAnalysisClient::new(
        2,
        AnalysisResult::succeeded(AnalysisPayload::Boolean { value: true }),
    ));
    let harness = EngineHarness::new(vec![boolean_stage(1, None)], 1, client.clone());

    let job_id = harness.submit().await.unwrap();
    let pool = harness.start_pool();
    let status = harness.wait_terminal(job_id, DRAIN_TIMEOUT).await;
    pool.shutdown().await;

    assert_eq!(status, Some(JobStatus::Completed));
    assert_eq!(client.total_calls(), 3);
    assert_eq!(harness.store.result_count(job_id), 1);

    let results = harness.store.fetch_results(job_id).await.unwrap();
    assert!(results[0].result.success);
    assert!(!harness.sink.events_of(names::TASK_RETRIED).is_empty());
}

#[tokio::test]
async fn test_transport_exhaustion_dead_letters_and_fails_path() {
    // The service never recovers; after 3 deliveries the task dead-letters
    // and the drain records the failure so the job still terminates.
    let client = Arc::new(FlakyAnalysisClient::new(
        u32::MAX,
        AnalysisResult::succeeded(AnalysisPayload::Boolean { value: true }),
    ));
    let harness = EngineHarness::new(vec![boolean_stage(1, None)], 1, client.clone());

    let job_id = harness.submit().await.unwrap();
    let pool = harness.start_pool();
    let status = harness.wait_terminal(job_id, DRAIN_TIMEOUT).await;
    pool.shutdown().await;

    assert_eq!(status, Some(JobStatus::Failed));
    assert_eq!(client.total_calls(), 3);

    let results = harness.store.fetch_results(job_id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results[0].result.success);
    assert!(results[0]
        .result
        .error
        .as_deref()
        .unwrap()
        .contains("transport failed"));

    let job = harness.job(job_id).await.unwrap().unwrap();
    assert_eq!(job.processed_images, 1);
    assert_eq!(job.failed_paths, 1);
    assert_eq!(harness.sink.events_of(names::TASK_DEAD_LETTERED).len(), 1);
}

#[tokio::test]
async fn test_results_never_skip_a_stage() {
    // Stage N's result is persisted before stage N+1's task exists, so a
    // mid-flight read never shows a later stage without its predecessors.
    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(
        vec![
            boolean_stage(1, None),
            keywords_stage(2),
            descriptive_stage(3),
        ],
        4,
        client,
    );

    let job_id = harness.submit().await.unwrap();
    let pool = harness.start_pool();

    for _ in 0..50 {
        let results = harness.store.fetch_results(job_id).await.unwrap();
        for image in &harness.images {
            let mut indices: Vec<usize> = results
                .iter()
                .filter(|r| r.image_id == *image)
                .map(|r| r.stage_index)
                .collect();
            indices.sort_unstable();
            let expected: Vec<usize> = (0..indices.len()).collect();
            assert_eq!(indices, expected, "stage gap for image {image}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let status = harness.wait_terminal(job_id, DRAIN_TIMEOUT).await;
    pool.shutdown().await;
    assert_eq!(status, Some(JobStatus::Completed));
}

#[tokio::test]
async fn test_inspect_mid_flight_returns_counters_without_results() {
    let client = Arc::new(ScriptedAnalysisClient::new());
    let harness = EngineHarness::new(vec![boolean_stage(1, None)], 2, client);

    let job_id = harness.submit().await.unwrap();

    // Terminate one path by hand, then inspect mid-flight.
    let leased = harness.queue.lease().await.unwrap().unwrap();
    harness.orchestrator.process(&leased.task).await.unwrap();
    harness.queue.ack(leased.handle).await.unwrap();

    let view = harness
        .supervisor
        .inspect(job_id, harness.owner)
        .await
        .unwrap();
    assert_eq!(view.status, JobStatus::Processing);
    assert_eq!(view.processed_images, 1);
    assert!(view.results.is_none());
}
