//! End-to-end tests for the execution environment.

use super::*;
use crate::errors::{PipelineError, SourceError, TransformError};
use crate::pool::{BoundedPool, DirectPool, WorkerPool};
use crate::record::Record;
use crate::sink::{CollectingSink, RecordWriter, Sink};
use crate::source::{IterSource, Source};
use crate::transform::{FnTransform, IdentityTransform, Transform};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type StringTransform = Arc<dyn Transform<String, String, String, String>>;
type StringSink = Arc<dyn Sink<String, String>>;

fn pairs(n: usize) -> Vec<(String, String)> {
    (0..n).map(|i| (i.to_string(), i.to_string())).collect()
}

fn identity() -> StringTransform {
    Arc::new(IdentityTransform)
}

fn always_failing() -> StringTransform {
    Arc::new(FnTransform::new(|record: Record<String, String>| {
        Err::<Vec<Record<String, String>>, _>(TransformError::failed(format!(
            "no output for {}",
            record.key
        )))
    }))
}

fn sorted_values(sink: &CollectingSink<String, String>) -> Vec<String> {
    let mut values: Vec<String> = sink.records().into_iter().map(|r| r.value).collect();
    values.sort();
    values
}

fn both_policies() -> Vec<Arc<dyn WorkerPool>> {
    vec![Arc::new(DirectPool), Arc::new(BoundedPool::new(2))]
}

/// Fails the first attempt for every key, succeeds afterwards.
#[derive(Debug, Default)]
struct FailOncePerKey {
    attempts: DashMap<String, usize>,
}

#[async_trait]
impl Transform<String, String, String, String> for FailOncePerKey {
    async fn map(
        &self,
        record: Record<String, String>,
        out: &dyn RecordWriter<String, String>,
    ) -> Result<(), TransformError> {
        let attempt = {
            let mut entry = self.attempts.entry(record.key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt == 1 {
            return Err(TransformError::failed(format!(
                "first attempt for {}",
                record.key
            )));
        }
        out.write(record).await?;
        Ok(())
    }
}

/// Fails each attempt independently with the configured probability.
#[derive(Debug)]
struct RandomlyFailing {
    failure_rate: f64,
}

#[async_trait]
impl Transform<String, String, String, String> for RandomlyFailing {
    async fn map(
        &self,
        record: Record<String, String>,
        out: &dyn RecordWriter<String, String>,
    ) -> Result<(), TransformError> {
        let failed = rand::thread_rng().gen_bool(self.failure_rate);
        if failed {
            return Err(TransformError::failed("unlucky attempt"));
        }
        out.write(record).await?;
        Ok(())
    }
}

/// Blocks on a per-key channel until a value arrives, then writes it.
struct GatedTransform {
    gates: Mutex<HashMap<String, mpsc::Receiver<String>>>,
}

impl GatedTransform {
    fn new(gates: Vec<(String, mpsc::Receiver<String>)>) -> Self {
        Self {
            gates: Mutex::new(gates.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Transform<String, String, String, String> for GatedTransform {
    async fn map(
        &self,
        record: Record<String, String>,
        out: &dyn RecordWriter<String, String>,
    ) -> Result<(), TransformError> {
        let receiver = self.gates.lock().remove(&record.key);
        let Some(mut receiver) = receiver else {
            return Err(TransformError::failed(format!("no gate for {}", record.key)));
        };
        let Some(value) = receiver.recv().await else {
            return Err(TransformError::failed("gate closed"));
        };
        out.write(Record::new(record.key, value)).await?;
        Ok(())
    }
}

/// Listener that retries every failure through the envelope.
struct AlwaysRetry;

#[async_trait]
impl FailureListener for AlwaysRetry {
    async fn on_failure(&self, failure: &TaskFailure) {
        failure.retry().await;
    }
}

/// Listener that re-runs the task inline until it succeeds.
struct ManualRerun;

#[async_trait]
impl FailureListener for ManualRerun {
    async fn on_failure(&self, failure: &TaskFailure) {
        while failure.task().run().await.is_err() {}
    }
}

/// Source wrapper exposing whether it was closed.
struct TrackedSource {
    inner: IterSource<String, String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Source<String, String> for TrackedSource {
    async fn next(&mut self) -> Result<Option<Record<String, String>>, SourceError> {
        self.inner.next().await
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.closed.store(true, Ordering::SeqCst);
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_single_record_direct() {
    let env = ExecutionEnvironment::new();
    let sink = Arc::new(CollectingSink::new());

    let summary = env
        .execute(
            IterSource::from_pairs(vec![("X".to_string(), "X".to_string())]),
            identity(),
            sink.clone() as StringSink,
        )
        .await
        .unwrap();

    assert_eq!(
        sink.records(),
        vec![Record::new("X".to_string(), "X".to_string())]
    );
    assert_eq!(summary.records, 1);
    assert_eq!(summary.failures, 0);
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_same_result_under_both_policies() {
    for pool in both_policies() {
        let env = ExecutionEnvironment::new().with_worker_pool(pool);
        let sink = Arc::new(CollectingSink::new());

        env.execute(
            IterSource::from_pairs(pairs(8)),
            identity(),
            sink.clone() as StringSink,
        )
        .await
        .unwrap();

        let expected: Vec<String> = {
            let mut v: Vec<String> = (0..8).map(|i| i.to_string()).collect();
            v.sort();
            v
        };
        assert_eq!(sorted_values(&sink), expected);
    }
}

#[tokio::test]
async fn test_pooled_tasks_block_until_fed() {
    let (tx_a, rx_a) = mpsc::channel(1);
    let (tx_b, rx_b) = mpsc::channel(1);
    let transform = Arc::new(GatedTransform::new(vec![
        ("a".to_string(), rx_a),
        ("b".to_string(), rx_b),
    ]));
    let env = ExecutionEnvironment::new().with_worker_pool(Arc::new(BoundedPool::new(2)));
    let sink = Arc::new(CollectingSink::new());

    let handle = {
        let transform = transform as StringTransform;
        let sink = sink.clone() as StringSink;
        tokio::spawn(async move {
            env.execute(
                IterSource::from_pairs(vec![
                    ("a".to_string(), "a".to_string()),
                    ("b".to_string(), "b".to_string()),
                ]),
                transform,
                sink,
            )
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.is_empty());

    tx_a.send("X".to_string()).await.unwrap();
    tx_b.send("X".to_string()).await.unwrap();

    handle.await.unwrap().unwrap();
    assert_eq!(sink.len(), 2);
    assert_eq!(sorted_values(&sink), vec!["X".to_string(), "X".to_string()]);
}

#[tokio::test]
async fn test_failure_without_listener_is_fatal() {
    for pool in both_policies() {
        let env = ExecutionEnvironment::new().with_worker_pool(pool);
        let sink = Arc::new(CollectingSink::new());

        let err = env
            .execute(
                IterSource::from_pairs(pairs(3)),
                always_failing(),
                sink.clone() as StringSink,
            )
            .await
            .unwrap_err();

        match err {
            PipelineError::TaskFailed { source } => {
                assert!(source.to_string().contains("no output for"));
            }
            other => panic!("expected task failure, got {other}"),
        }
        assert!(sink.is_empty());
        assert!(sink.is_closed());
    }
}

#[tokio::test]
async fn test_no_listener_is_fatal_even_with_drop_policy() {
    let env = ExecutionEnvironment::new().with_drop_failed_tasks(true);
    let sink = Arc::new(CollectingSink::new());

    let result = env
        .execute(
            IterSource::from_pairs(pairs(1)),
            always_failing(),
            sink.clone() as StringSink,
        )
        .await;

    assert!(matches!(result, Err(PipelineError::TaskFailed { .. })));
}

#[tokio::test]
async fn test_fatal_stops_pulling_remaining_records() {
    let env = ExecutionEnvironment::new();
    let sink = Arc::new(CollectingSink::new());
    let closed = Arc::new(AtomicBool::new(false));
    let source = TrackedSource {
        inner: IterSource::from_pairs(pairs(5)),
        closed: closed.clone(),
    };

    let failing_on_second: StringTransform =
        Arc::new(FnTransform::new(|record: Record<String, String>| {
            if record.key == "1" {
                Err(TransformError::failed("record 1 rejected"))
            } else {
                Ok(vec![record])
            }
        }));

    let err = env
        .execute(source, failing_on_second, sink.clone() as StringSink)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::TaskFailed { .. }));
    // Direct scheduling: record "0" succeeded, "1" failed, the rest were
    // never pulled.
    assert_eq!(sink.len(), 1);
    assert!(closed.load(Ordering::SeqCst));
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_dropped_failures_leave_sink_empty() {
    let listener = Arc::new(CollectingListener::new());
    let env = ExecutionEnvironment::new().with_drop_failed_tasks(true);
    let sink = Arc::new(CollectingSink::new());

    let summary = env
        .execute_with_listener(
            IterSource::from_pairs(pairs(3)),
            always_failing(),
            sink.clone() as StringSink,
            listener.clone(),
        )
        .await
        .unwrap();

    assert!(sink.is_empty());
    assert_eq!(listener.len(), 3);
    assert_eq!(summary.dropped, 3);
    assert_eq!(summary.failures, 3);
}

#[tokio::test]
async fn test_retry_recovers_under_both_policies() {
    for pool in both_policies() {
        let env = ExecutionEnvironment::new().with_worker_pool(pool);
        let sink = Arc::new(CollectingSink::new());
        let transform: StringTransform = Arc::new(FailOncePerKey::default());

        let summary = env
            .execute_with_listener(
                IterSource::from_pairs(pairs(4)),
                transform,
                sink.clone() as StringSink,
                Arc::new(AlwaysRetry),
            )
            .await
            .unwrap();

        let expected: Vec<String> = {
            let mut v: Vec<String> = (0..4).map(|i| i.to_string()).collect();
            v.sort();
            v
        };
        assert_eq!(sorted_values(&sink), expected);
        assert_eq!(summary.failures, 4);
        assert_eq!(summary.retries, 4);
        assert_eq!(summary.dropped, 0);
    }
}

#[tokio::test]
async fn test_manual_rerun_recovers_under_both_policies() {
    for pool in both_policies() {
        let env = ExecutionEnvironment::new().with_worker_pool(pool);
        let sink = Arc::new(CollectingSink::new());
        let transform: StringTransform = Arc::new(FailOncePerKey::default());

        let summary = env
            .execute_with_listener(
                IterSource::from_pairs(pairs(4)),
                transform,
                sink.clone() as StringSink,
                Arc::new(ManualRerun),
            )
            .await
            .unwrap();

        let expected: Vec<String> = {
            let mut v: Vec<String> = (0..4).map(|i| i.to_string()).collect();
            v.sort();
            v
        };
        assert_eq!(sorted_values(&sink), expected);
        assert_eq!(summary.retries, 0);
    }
}

#[tokio::test]
async fn test_retrying_listener_with_policy_recovers() {
    let policy = RetryPolicy::new()
        .with_max_attempts(5)
        .with_initial_delay(Duration::from_millis(1))
        .without_jitter();
    let env = ExecutionEnvironment::new();
    let sink = Arc::new(CollectingSink::new());
    let transform: StringTransform = Arc::new(FailOncePerKey::default());

    env.execute_with_listener(
        IterSource::from_pairs(pairs(2)),
        transform,
        sink.clone() as StringSink,
        Arc::new(RetryingListener::new(policy)),
    )
    .await
    .unwrap();

    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_retrying_listener_exhaustion_respects_drop_policy() {
    let policy = RetryPolicy::new()
        .with_max_attempts(2)
        .with_initial_delay(Duration::from_millis(1))
        .without_jitter();
    let env = ExecutionEnvironment::new().with_drop_failed_tasks(true);
    let sink = Arc::new(CollectingSink::new());

    let summary = env
        .execute_with_listener(
            IterSource::from_pairs(pairs(2)),
            always_failing(),
            sink.clone() as StringSink,
            Arc::new(RetryingListener::new(policy)),
        )
        .await
        .unwrap();

    assert!(sink.is_empty());
    // Two attempts per record, then dropped.
    assert_eq!(summary.failures, 4);
    assert_eq!(summary.dropped, 2);
}

#[tokio::test]
async fn test_stress_random_failures_with_retry() {
    let labels = 24;
    for pool in [
        Arc::new(DirectPool) as Arc<dyn WorkerPool>,
        Arc::new(BoundedPool::new(4)) as Arc<dyn WorkerPool>,
    ] {
        let env = ExecutionEnvironment::new().with_worker_pool(pool);
        let sink = Arc::new(CollectingSink::new());
        let transform: StringTransform = Arc::new(RandomlyFailing { failure_rate: 0.7 });

        env.execute_with_listener(
            IterSource::from_pairs(pairs(labels)),
            transform,
            sink.clone() as StringSink,
            Arc::new(AlwaysRetry),
        )
        .await
        .unwrap();

        let expected: Vec<String> = {
            let mut v: Vec<String> = (0..labels).map(|i| i.to_string()).collect();
            v.sort();
            v
        };
        assert_eq!(sorted_values(&sink), expected);
    }
}

#[tokio::test]
async fn test_stress_random_failures_with_manual_rerun() {
    let labels = 24;
    let env = ExecutionEnvironment::new().with_worker_pool(Arc::new(BoundedPool::new(4)));
    let sink = Arc::new(CollectingSink::new());
    let transform: StringTransform = Arc::new(RandomlyFailing { failure_rate: 0.7 });

    env.execute_with_listener(
        IterSource::from_pairs(pairs(labels)),
        transform,
        sink.clone() as StringSink,
        Arc::new(ManualRerun),
    )
    .await
    .unwrap();

    let expected: Vec<String> = {
        let mut v: Vec<String> = (0..labels).map(|i| i.to_string()).collect();
        v.sort();
        v
    };
    assert_eq!(sorted_values(&sink), expected);
}

#[tokio::test]
async fn test_source_error_surfaces_and_closes_everything() {
    struct FailingSource {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Source<String, String> for FailingSource {
        async fn next(&mut self) -> Result<Option<Record<String, String>>, SourceError> {
            Err(SourceError::read("backend unavailable"))
        }

        async fn close(&mut self) -> Result<(), SourceError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    let env = ExecutionEnvironment::new();
    let sink = Arc::new(CollectingSink::new());
    let closed = Arc::new(AtomicBool::new(false));

    let err = env
        .execute(
            FailingSource {
                closed: closed.clone(),
            },
            identity(),
            sink.clone() as StringSink,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Source(_)));
    assert!(closed.load(Ordering::SeqCst));
    assert!(sink.is_closed());
}
