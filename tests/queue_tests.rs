use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use bench_catalog::error::CatalogError;
use bench_catalog::queue::matrix::populate;
use bench_catalog::queue::{
    Clock, ConfigQueue, ConfigStore, JobStatus, MatrixSpec, MemoryConfigStore, StaleReaper,
};

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn setup() -> (Arc<MemoryConfigStore>, Arc<ManualClock>, ConfigQueue) {
    let store = Arc::new(MemoryConfigStore::new());
    let clock = ManualClock::new();
    let queue = ConfigQueue::new(store.clone()).with_clock(clock.clone());
    (store, clock, queue)
}

/// One hardware, one framework, chatbot, batch 1, sequence 1024 and 2048.
fn small_spec(model_version_id: Uuid) -> MatrixSpec {
    MatrixSpec::new(model_version_id, strings(&["L4"]), strings(&["vllm"]))
        .with_workloads(strings(&["chatbot"]))
        .with_batch_sizes(vec![1])
        .with_sequence_lengths(vec![1024, 2048])
}

#[tokio::test]
async fn test_full_matrix_generation_is_idempotent() {
    let (store, clock, queue) = setup();
    let mv = Uuid::new_v4();
    let hardware: Vec<String> = (0..10).map(|i| format!("hw-{}", i)).collect();
    let spec = MatrixSpec::new(mv, hardware, strings(&["vllm", "tgi", "trt-llm"]))
        .with_sequence_lengths(vec![1024, 2048, 4096]);
    assert_eq!(spec.workload_types.len(), 5);
    assert_eq!(spec.batch_sizes.len(), 4);

    let first = populate(store.as_ref(), &spec, clock.now()).await.unwrap();
    assert_eq!(first.requested, 1800);
    assert_eq!(first.inserted, 1800);
    assert_eq!(first.skipped, 0);

    let progress = queue.progress(mv).await.unwrap();
    assert_eq!(progress.total, 1800);
    assert_eq!(progress.pending, 1800);
    assert_eq!(progress.percent_complete, 0.0);

    let second = populate(store.as_ref(), &spec, clock.now()).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 1800);
    assert_eq!(store.len().await, 1800);
}

#[tokio::test]
async fn test_regeneration_leaves_existing_status_untouched() {
    let (store, clock, queue) = setup();
    let mv = Uuid::new_v4();
    populate(store.as_ref(), &small_spec(mv), clock.now())
        .await
        .unwrap();

    let batch = queue.dequeue_batch(1, 1000).await.unwrap();
    queue.mark_completed(batch[0].id).await.unwrap();

    // Widening the matrix only adds the missing cells.
    let wider = small_spec(mv).with_sequence_lengths(vec![1024, 2048, 4096]);
    let outcome = populate(store.as_ref(), &wider, clock.now()).await.unwrap();
    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.skipped, 2);

    let done = queue.get(batch[0].id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    let progress = queue.progress(mv).await.unwrap();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.pending, 2);
    assert_eq!(progress.percent_complete, 33.33);
}

#[tokio::test]
async fn test_dequeue_orders_by_priority_and_respects_threshold() {
    let (store, clock, queue) = setup();
    let mv = Uuid::new_v4();
    let spec = MatrixSpec::new(mv, strings(&["L4"]), strings(&["vllm"]))
        .with_workloads(strings(&["summarization", "chatbot"]))
        .with_batch_sizes(vec![1, 8])
        .with_sequence_lengths(vec![1024]);
    populate(store.as_ref(), &spec, clock.now()).await.unwrap();

    // chatbot bs1 = 100, chatbot bs8 = 170, summarization bs1 = 500, bs8 = 570
    let batch = queue.dequeue_batch(10, 200).await.unwrap();
    let priorities: Vec<i32> = batch.iter().map(|c| c.priority).collect();
    assert_eq!(priorities, vec![100, 170]);
    for config in &batch {
        assert_eq!(config.status, JobStatus::Running);
        assert_eq!(config.started_at, Some(clock.now()));
    }

    assert!(queue.dequeue_batch(10, 200).await.unwrap().is_empty());
    let rest = queue.dequeue_batch(10, 1000).await.unwrap();
    assert_eq!(rest.iter().map(|c| c.priority).collect::<Vec<_>>(), vec![500, 570]);
    assert!(queue.dequeue_batch(10, 1000).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transitions_require_running() {
    let (store, clock, queue) = setup();
    let mv = Uuid::new_v4();
    populate(store.as_ref(), &small_spec(mv), clock.now())
        .await
        .unwrap();

    let pending = queue
        .configs_for_model_version(mv, Some(JobStatus::Pending), 10)
        .await
        .unwrap();
    assert!(matches!(
        queue.mark_completed(pending[0].id).await,
        Err(CatalogError::InvalidTransition {
            from: JobStatus::Pending,
            ..
        })
    ));

    let batch = queue.dequeue_batch(1, 1000).await.unwrap();
    let id = batch[0].id;
    let failed = queue.mark_failed(id, "CUDA out of memory").await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("CUDA out of memory"));
    assert_eq!(failed.completed_at, Some(clock.now()));

    // A double acknowledgement is rejected and leaves the row alone.
    assert!(matches!(
        queue.mark_completed(id).await,
        Err(CatalogError::InvalidTransition { .. })
    ));
    assert_eq!(queue.get(id).await.unwrap().status, JobStatus::Failed);

    assert!(matches!(
        queue.mark_completed(Uuid::new_v4()).await,
        Err(CatalogError::ConfigNotFound(_))
    ));
}

#[tokio::test]
async fn test_stale_config_reclaimed_exactly_once() {
    let (store, clock, queue) = setup();
    let mv = Uuid::new_v4();
    populate(store.as_ref(), &small_spec(mv), clock.now())
        .await
        .unwrap();

    let batch = queue.dequeue_batch(1, 1000).await.unwrap();
    let id = batch[0].id;
    assert_eq!(batch[0].retry_count, 0);

    clock.advance(Duration::minutes(119));
    assert!(queue
        .reset_stale(Duration::minutes(120))
        .await
        .unwrap()
        .is_empty());

    clock.advance(Duration::minutes(2));
    let outcome = queue.reset_stale(Duration::minutes(120)).await.unwrap();
    assert_eq!(outcome.reset, vec![id]);
    assert!(outcome.failed.is_empty());

    let config = queue.get(id).await.unwrap();
    assert_eq!(config.status, JobStatus::Pending);
    assert_eq!(config.retry_count, 1);
    assert_eq!(config.started_at, None);

    let again = queue.reset_stale(Duration::minutes(120)).await.unwrap();
    assert!(again.reset.is_empty());

    // The reclaimed config is eligible again, ahead of the other by priority.
    let redo = queue.dequeue_batch(1, 1000).await.unwrap();
    assert_eq!(redo[0].id, id);
}

#[tokio::test]
async fn test_acknowledged_config_is_not_reclaimed() {
    let (store, clock, queue) = setup();
    populate(store.as_ref(), &small_spec(Uuid::new_v4()), clock.now())
        .await
        .unwrap();

    let batch = queue.dequeue_batch(2, 1000).await.unwrap();
    clock.advance(Duration::hours(3));
    queue.mark_completed(batch[0].id).await.unwrap();

    let outcome = queue.reset_stale(Duration::minutes(120)).await.unwrap();
    assert_eq!(outcome.reset, vec![batch[1].id]);
    assert_eq!(
        queue.get(batch[0].id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_retry_bound_fails_repeatedly_stale_configs() {
    let store = Arc::new(MemoryConfigStore::new());
    let clock = ManualClock::new();
    let queue = ConfigQueue::new(store.clone())
        .with_clock(clock.clone())
        .with_max_retries(Some(1));
    let spec = small_spec(Uuid::new_v4()).with_sequence_lengths(vec![1024]);
    populate(store.as_ref(), &spec, clock.now()).await.unwrap();

    let id = queue.dequeue_batch(1, 1000).await.unwrap()[0].id;
    clock.advance(Duration::hours(3));
    assert_eq!(
        queue.reset_stale(Duration::hours(2)).await.unwrap().reset,
        vec![id]
    );

    queue.dequeue_batch(1, 1000).await.unwrap();
    clock.advance(Duration::hours(3));
    let outcome = queue.reset_stale(Duration::hours(2)).await.unwrap();
    assert!(outcome.reset.is_empty());
    assert_eq!(outcome.failed, vec![id]);

    let config = queue.get(id).await.unwrap();
    assert_eq!(config.status, JobStatus::Failed);
    assert_eq!(config.retry_count, 1);
    assert!(config.error_message.is_some());
    assert!(queue.dequeue_batch(1, 1000).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_negative_timeout_rejected() {
    let (_store, _clock, queue) = setup();
    assert!(matches!(
        queue.reset_stale(Duration::minutes(-1)).await,
        Err(CatalogError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_unbounded_timeout_reclaims_nothing() {
    let (store, clock, queue) = setup();
    populate(store.as_ref(), &small_spec(Uuid::new_v4()), clock.now())
        .await
        .unwrap();
    let id = queue.dequeue_batch(1, 1000).await.unwrap()[0].id;
    clock.advance(Duration::days(365));

    let outcome = queue.reset_stale(Duration::MAX).await.unwrap();
    assert!(outcome.is_empty());
    assert_eq!(queue.get(id).await.unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_progress_for_unknown_model_version() {
    let (_store, _clock, queue) = setup();
    let progress = queue.progress(Uuid::new_v4()).await.unwrap();
    assert_eq!(progress.total, 0);
    assert_eq!(progress.percent_complete, 0.0);
}

#[tokio::test]
async fn test_reaper_sweep_reclaims_stale_configs() {
    let (store, clock, queue) = setup();
    let mv = Uuid::new_v4();
    populate(store.as_ref(), &small_spec(mv), clock.now())
        .await
        .unwrap();
    queue.dequeue_batch(2, 1000).await.unwrap();
    clock.advance(Duration::hours(1));

    let reaper = StaleReaper::new(
        queue.clone(),
        std::time::Duration::from_secs(60),
        Duration::minutes(30),
    );
    assert_eq!(reaper.sweep().await, 2);
    assert_eq!(reaper.sweep().await, 0);

    let counts = store.status_counts(mv).await.unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.running, 0);
}
