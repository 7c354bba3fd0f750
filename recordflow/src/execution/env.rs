//! The execution environment.
//!
//! Drives one full pass over a source, applying a transform to every
//! record and writing the results to a sink, under a pluggable scheduling
//! policy and a drop/retry/escalate failure protocol.

use super::failure::{FailureListener, TaskFailure};
use super::task::Task;
use crate::errors::{PipelineError, SourceError, TransformError};
use crate::pool::{DirectPool, WorkUnit, WorkerPool};
use crate::record::Datum;
use crate::sink::Sink;
use crate::source::Source;
use crate::transform::Transform;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Statistics for one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Records pulled from the source.
    pub records: u64,
    /// Failed task attempts, counting every attempt.
    pub failures: u64,
    /// Re-submissions through the failure envelope.
    pub retries: u64,
    /// Tasks permanently abandoned under the drop policy.
    pub dropped: u64,
}

impl RunSummary {
    /// Converts the summary to a JSON value.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.to_rfc3339(),
            "records": self.records,
            "failures": self.failures,
            "retries": self.retries,
            "dropped": self.dropped,
        })
    }
}

/// Count of submitted-but-unfinished units, including retries.
#[derive(Debug, Default)]
struct InflightGauge {
    count: AtomicUsize,
    idle: Notify,
}

impl InflightGauge {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.idle.notified();
            // Re-check after registering, so a final exit cannot slip
            // between the load and the wait.
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    records: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

/// Shared state of one in-progress run.
pub(crate) struct RunContext {
    run_id: Uuid,
    pool: Arc<dyn WorkerPool>,
    listener: Option<Arc<dyn FailureListener>>,
    drop_failed_tasks: bool,
    gauge: InflightGauge,
    fatal: Mutex<Option<TransformError>>,
    stats: RunStats,
}

impl RunContext {
    fn unit(self: Arc<Self>, task: Arc<Task>) -> WorkUnit {
        Box::pin(async move {
            match task.run().await {
                Ok(()) => {
                    debug!(run_id = %self.run_id, task = %task.label(), "task completed");
                }
                Err(cause) => self.clone().handle_failure(&task, cause).await,
            }
            self.gauge.exit();
        })
    }

    async fn submit(self: Arc<Self>, task: Arc<Task>) {
        self.gauge.enter();
        let pool = self.pool.clone();
        let unit = self.unit(task);
        pool.submit(unit).await;
    }

    /// Re-submits a failed task through the original scheduling path.
    pub(crate) async fn resubmit(self: Arc<Self>, task: Arc<Task>) {
        self.stats.retries.fetch_add(1, Ordering::Relaxed);
        if self.pool.runs_inline() {
            // Direct scheduling: the retry re-runs inline on the caller.
            self.submit(task).await;
        } else {
            // Admission may have to wait for a slot; wait off-worker so the
            // slot held by the failing attempt can drain meanwhile.
            self.gauge.enter();
            let pool = self.pool.clone();
            let unit = self.unit(task);
            tokio::spawn(async move {
                pool.submit(unit).await;
            });
        }
    }

    async fn handle_failure(self: Arc<Self>, task: &Arc<Task>, cause: TransformError) {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);

        let Some(listener) = self.listener.clone() else {
            // No listener: every failure is fatal, regardless of the drop
            // policy.
            self.record_fatal(task, cause);
            return;
        };

        let failure = TaskFailure::new(cause, task.clone(), self.clone());
        listener.on_failure(&failure).await;

        if failure.was_resubmitted() {
            // The re-submitted attempt decides the task's fate.
            return;
        }
        if task.is_completed() {
            debug!(run_id = %self.run_id, task = %task.label(), "task recovered by manual re-run");
            return;
        }
        if self.drop_failed_tasks {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(run_id = %self.run_id, task = %task.label(), error = %failure.cause(), "dropping failed task");
        } else {
            self.record_fatal(task, failure.into_cause());
        }
    }

    fn record_fatal(&self, task: &Arc<Task>, cause: TransformError) {
        error!(run_id = %self.run_id, task = %task.label(), error = %cause, "fatal task failure");
        let mut slot = self.fatal.lock();
        if slot.is_none() {
            *slot = Some(cause);
        }
    }

    fn fatal_pending(&self) -> bool {
        self.fatal.lock().is_some()
    }

    fn take_fatal(&self) -> Option<TransformError> {
        self.fatal.lock().take()
    }
}

/// Orchestrates source -> transform -> sink under a scheduling policy.
///
/// The environment is the only component aware of retries: it builds one
/// re-runnable task per record, submits it to the configured worker pool,
/// and applies the failure protocol. Sinks only need to be thread-safe and
/// to honor their commit-boundary contract.
pub struct ExecutionEnvironment {
    pool: Arc<dyn WorkerPool>,
    drop_failed_tasks: bool,
}

impl Default for ExecutionEnvironment {
    fn default() -> Self {
        Self {
            pool: Arc::new(DirectPool),
            drop_failed_tasks: false,
        }
    }
}

impl ExecutionEnvironment {
    /// Creates an environment with the default direct scheduling policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker pool, replacing the default direct policy.
    #[must_use]
    pub fn with_worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the fallback for failures the listener declines to handle:
    /// `true` abandons the task, `false` escalates it as fatal.
    #[must_use]
    pub fn with_drop_failed_tasks(mut self, drop: bool) -> Self {
        self.drop_failed_tasks = drop;
        self
    }

    /// Replaces the worker pool; takes effect for subsequent `execute`
    /// calls.
    pub fn set_worker_pool(&mut self, pool: Arc<dyn WorkerPool>) {
        self.pool = pool;
    }

    /// Replaces the drop policy; takes effect for subsequent `execute`
    /// calls.
    pub fn set_drop_failed_tasks(&mut self, drop: bool) {
        self.drop_failed_tasks = drop;
    }

    /// Drives a full pass over `source` with no failure listener: any task
    /// failure is fatal.
    ///
    /// Blocks until the source is exhausted and every submitted task has
    /// reached a terminal outcome. The source and sink are closed on every
    /// exit path.
    pub async fn execute<S, IK, IV, OK, OV>(
        &self,
        source: S,
        transform: Arc<dyn Transform<IK, IV, OK, OV>>,
        sink: Arc<dyn Sink<OK, OV>>,
    ) -> Result<RunSummary, PipelineError>
    where
        S: Source<IK, IV>,
        IK: Datum,
        IV: Datum,
        OK: Datum,
        OV: Datum,
    {
        self.run(source, transform, sink, None).await
    }

    /// As [`execute`](Self::execute), but every task failure is first
    /// reported to `listener` on the worker that detected it.
    pub async fn execute_with_listener<S, IK, IV, OK, OV>(
        &self,
        source: S,
        transform: Arc<dyn Transform<IK, IV, OK, OV>>,
        sink: Arc<dyn Sink<OK, OV>>,
        listener: Arc<dyn FailureListener>,
    ) -> Result<RunSummary, PipelineError>
    where
        S: Source<IK, IV>,
        IK: Datum,
        IV: Datum,
        OK: Datum,
        OV: Datum,
    {
        self.run(source, transform, sink, Some(listener)).await
    }

    async fn run<S, IK, IV, OK, OV>(
        &self,
        mut source: S,
        transform: Arc<dyn Transform<IK, IV, OK, OV>>,
        sink: Arc<dyn Sink<OK, OV>>,
        listener: Option<Arc<dyn FailureListener>>,
    ) -> Result<RunSummary, PipelineError>
    where
        S: Source<IK, IV>,
        IK: Datum,
        IV: Datum,
        OK: Datum,
        OV: Datum,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let ctx = Arc::new(RunContext {
            run_id,
            pool: self.pool.clone(),
            listener,
            drop_failed_tasks: self.drop_failed_tasks,
            gauge: InflightGauge::default(),
            fatal: Mutex::new(None),
            stats: RunStats::default(),
        });
        debug!(run_id = %run_id, concurrency = ctx.pool.concurrency(), "starting run");

        let mut pull_error: Option<SourceError> = None;
        loop {
            // Stop pulling once a fatal failure is pending; in-flight
            // tasks are left to finish.
            if ctx.fatal_pending() {
                break;
            }
            match source.next().await {
                Ok(Some(record)) => {
                    ctx.stats.records.fetch_add(1, Ordering::Relaxed);
                    let task = Task::bind(record, transform.clone(), sink.clone());
                    ctx.clone().submit(task).await;
                }
                Ok(None) => break,
                Err(error) => {
                    pull_error = Some(error);
                    break;
                }
            }
        }

        let source_close = source.close().await;
        ctx.gauge.wait_idle().await;
        let sink_close = sink.close().await;

        if let Some(cause) = ctx.take_fatal() {
            return Err(PipelineError::TaskFailed { source: cause });
        }
        if let Some(error) = pull_error {
            return Err(PipelineError::Source(error));
        }
        if let Err(error) = source_close {
            warn!(run_id = %run_id, error = %error, "source close failed");
            return Err(PipelineError::Source(error));
        }
        sink_close.map_err(PipelineError::from_close)?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            records: ctx.stats.records.load(Ordering::Relaxed),
            failures: ctx.stats.failures.load(Ordering::Relaxed),
            retries: ctx.stats.retries.load(Ordering::Relaxed),
            dropped: ctx.stats.dropped.load(Ordering::Relaxed),
        };
        debug!(
            run_id = %run_id,
            records = summary.records,
            failures = summary.failures,
            retries = summary.retries,
            "run complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("concurrency", &self.pool.concurrency())
            .field("drop_failed_tasks", &self.drop_failed_tasks)
            .finish()
    }
}
