//! Dispatcher retry, archive and shutdown behavior

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use docflow_common::time;
use docflow_worker::models::AnalysisRecord;
use docflow_worker::queue::{Broker, NewTask, TaskState};
use docflow_worker::store::AnalysisStore;
use docflow_worker::tasks::{
    EnrichTextPayload, ProcessDocumentPayload, QueueName, TaskKind, TaskPayload, TraceFields,
};
use docflow_worker::worker::WorkerConfig;
use helpers::{drain, test_config, FakeAi, FakeMode, FixedScoreAnalyzer, TestEnv, ARTICLE};
use uuid::Uuid;

async fn seeded_record(env: &TestEnv) -> Uuid {
    let record = AnalysisRecord::new(Uuid::new_v4());
    env.store.save_analysis(&record).await.unwrap();
    record.id
}

fn enrich_text(analysis_id: Uuid) -> TaskPayload {
    TaskPayload::EnrichText(EnrichTextPayload {
        analysis_id,
        text: ARTICLE.to_string(),
        offline_cleaned_text: None,
        original_markup: None,
        trace: TraceFields::default(),
    })
}

/// Poll until `check` holds or five seconds pass
async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_transient_provider_failure_schedules_retry() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Transient, &["ignored"])),
    );

    let id = seeded_record(&env).await;
    let info = env.client().enqueue(enrich_text(id), None).await.unwrap();
    let before = time::now_millis();
    assert_eq!(drain(&dispatcher).await, 1);

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Retry);
    assert_eq!(task.retried, 1);
    assert!(task.last_error.unwrap().contains("503"));
    // First AI-bound retry waits 30 seconds
    assert!(task.process_at >= before + 29_000);

    // Nothing was written to the record
    let record = env.store.get_analysis(id).await.unwrap();
    assert!(record.synopsis.is_none());
    assert!(record.tags.is_empty());
    assert_eq!(env.metrics.snapshot().retried, 1);
}

#[tokio::test]
async fn test_permanent_provider_failure_archives() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Permanent, &[])),
    );

    let id = seeded_record(&env).await;
    let info = env.client().enqueue(enrich_text(id), None).await.unwrap();
    drain(&dispatcher).await;

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Archived);
    assert_eq!(task.retried, 0);
    assert_eq!(env.metrics.snapshot().archived, 1);
}

#[tokio::test]
async fn test_retriable_failure_without_retries_left_archives() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Transient, &[])),
    );

    let id = seeded_record(&env).await;
    let mut options = TaskKind::EnrichText.default_options();
    options.max_retries = 0;
    let info = env
        .client()
        .enqueue_with_options(enrich_text(id), options, None)
        .await
        .unwrap();
    drain(&dispatcher).await;

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Archived);
    assert_eq!(task.retried, 0);
}

#[tokio::test]
async fn test_malformed_payload_is_archived() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Succeed, &[])),
    );

    let info = env
        .broker
        .enqueue(NewTask {
            kind: TaskKind::EnrichText,
            payload: "{not json".to_string(),
            options: TaskKind::EnrichText.default_options(),
        })
        .await
        .unwrap();
    drain(&dispatcher).await;

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Archived);
    assert!(task.last_error.unwrap().starts_with("Invalid payload"));
}

#[tokio::test]
async fn test_missing_record_is_permanent() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Succeed, &[])),
    );

    let info = env
        .client()
        .enqueue(enrich_text(Uuid::new_v4()), None)
        .await
        .unwrap();
    drain(&dispatcher).await;

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Archived);
    assert!(task.last_error.unwrap().contains("Not found"));
}

#[tokio::test]
async fn test_panicking_handler_is_archived_not_left_active() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Panic, &[])),
    );

    let id = seeded_record(&env).await;
    let info = env.client().enqueue(enrich_text(id), None).await.unwrap();
    assert_eq!(drain(&dispatcher).await, 1);

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Archived);
    assert!(task.last_error.unwrap().contains("panicked"));
    assert_eq!(env.broker.recover_orphans().await.unwrap(), 0);
    assert_eq!(env.metrics.snapshot().archived, 1);
}

#[tokio::test]
async fn test_orphaned_task_is_recovered_and_processed() {
    let env = TestEnv::new().await;
    let dispatcher = env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.2)),
        Arc::new(FakeAi::new(FakeMode::Succeed, &[])),
    );

    let payload = TaskPayload::ProcessDocument(ProcessDocumentPayload {
        analysis_id: Uuid::new_v4(),
        text: ARTICLE.to_string(),
        original_markup: None,
        images: vec![],
        trace: TraceFields::default(),
    });
    let info = env.client().enqueue(payload, None).await.unwrap();

    // Claimed by a worker that then died
    assert!(env
        .broker
        .dequeue(QueueName::OfflineProcessing)
        .await
        .unwrap()
        .is_some());
    assert_eq!(drain(&dispatcher).await, 0);

    assert_eq!(env.broker.recover_orphans().await.unwrap(), 1);
    assert_eq!(drain(&dispatcher).await, 1);

    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Completed);
}

// ============================================================================
// Run loop and shutdown
// ============================================================================

#[tokio::test]
async fn test_run_processes_queues_until_shutdown() {
    let env = TestEnv::new().await;
    let dispatcher = Arc::new(env.dispatcher(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Succeed, &["transit"])),
    ));

    let mut ids = Vec::new();
    for _ in 0..3 {
        let payload = TaskPayload::ProcessDocument(ProcessDocumentPayload {
            analysis_id: Uuid::new_v4(),
            text: ARTICLE.to_string(),
            original_markup: None,
            images: vec![],
            trace: TraceFields::default(),
        });
        ids.push(payload.analysis_id());
        env.client().enqueue(payload, None).await.unwrap();
    }

    let runner = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run().await })
    };

    // Three documents plus one text enrichment each
    let metrics = env.metrics.clone();
    assert!(wait_for(|| metrics.snapshot().succeeded == 6).await);

    dispatcher.shutdown();
    runner.await.unwrap().unwrap();

    for id in ids {
        let record = env.store.get_analysis(id).await.unwrap();
        assert_eq!(record.tags, vec!["transit"]);
    }
    assert_eq!(env.stats(QueueName::TextEnrichment).await.completed, 3);
}

#[tokio::test]
async fn test_shutdown_cancels_hung_task_without_writing() {
    let env = TestEnv::new().await;
    let config = WorkerConfig {
        shutdown_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let dispatcher = Arc::new(env.dispatcher_with_config(
        Arc::new(FixedScoreAnalyzer(0.8)),
        Arc::new(FakeAi::new(FakeMode::Hang, &["never"])),
        config,
    ));

    let id = seeded_record(&env).await;
    let info = env.client().enqueue(enrich_text(id), None).await.unwrap();

    let runner = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run().await })
    };

    let metrics = env.metrics.clone();
    assert!(wait_for(|| metrics.snapshot().started == 1).await);

    dispatcher.shutdown();
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("dispatcher did not stop")
        .unwrap()
        .unwrap();

    // Cancelled tasks go back to the queue for a later attempt
    let task = env.broker.get_task(&info.id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Retry);
    assert_eq!(task.retried, 1);

    let record = env.store.get_analysis(id).await.unwrap();
    assert!(record.synopsis.is_none());
    assert!(record.tags.is_empty());
}
