//! The failure envelope and listener contract.
//!
//! A task failure is modeled as a value carrying the cause and a handle
//! back to the failed task, rather than as unwinding: retries cross thread
//! boundaries, so the recovery path must be an explicit object that can be
//! handed to whichever worker detected the failure.

use super::env::RunContext;
use super::task::Task;
use crate::errors::TransformError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Envelope describing one failed task attempt.
///
/// Delivered to the failure listener on the worker that detected the
/// failure, and destroyed once the listener returns. The listener may:
///
/// - call [`retry`](Self::retry) to re-submit the task through the same
///   scheduling path as the original attempt;
/// - call [`task`](Self::task) and re-run it inline, repeatedly if needed;
/// - do neither, leaving the task's fate to the environment's
///   drop-failed-tasks policy.
pub struct TaskFailure {
    cause: TransformError,
    task: Arc<Task>,
    ctx: Arc<RunContext>,
    resubmitted: AtomicBool,
}

impl TaskFailure {
    pub(crate) fn new(cause: TransformError, task: Arc<Task>, ctx: Arc<RunContext>) -> Self {
        Self {
            cause,
            task,
            ctx,
            resubmitted: AtomicBool::new(false),
        }
    }

    /// The error that failed the attempt.
    #[must_use]
    pub fn cause(&self) -> &TransformError {
        &self.cause
    }

    /// The failed task; re-runnable inline via [`Task::run`].
    #[must_use]
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Re-submits the task through the same scheduling path used for the
    /// original attempt.
    ///
    /// Under direct scheduling the re-run happens inline before this call
    /// returns; under a pool it is admitted like any other task and may run
    /// concurrently with unrelated, still-pending tasks.
    pub async fn retry(&self) {
        self.resubmitted.store(true, Ordering::SeqCst);
        self.ctx.clone().resubmit(self.task.clone()).await;
    }

    pub(crate) fn was_resubmitted(&self) -> bool {
        self.resubmitted.load(Ordering::SeqCst)
    }

    pub(crate) fn into_cause(self) -> TransformError {
        self.cause
    }
}

impl std::fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFailure")
            .field("task", &self.task.label())
            .field("cause", &self.cause.to_string())
            .finish()
    }
}

/// Callback invoked for every task failure.
///
/// Invocations for distinct tasks may happen concurrently and must be safe
/// to interleave; invocations for one task are strictly sequential.
#[async_trait]
pub trait FailureListener: Send + Sync {
    /// Handles one failed attempt.
    async fn on_failure(&self, failure: &TaskFailure);
}

/// A listener that records every failure it sees and handles none of them.
#[derive(Debug, Default)]
pub struct CollectingListener {
    failures: RwLock<Vec<(String, String)>>,
}

impl CollectingListener {
    /// Creates an empty collecting listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(task label, cause)` pairs for every observed failure.
    #[must_use]
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failures.read().clone()
    }

    /// Returns the number of observed failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.read().len()
    }

    /// Returns true if no failures were observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.read().is_empty()
    }
}

#[async_trait]
impl FailureListener for CollectingListener {
    async fn on_failure(&self, failure: &TaskFailure) {
        self.failures
            .write()
            .push((failure.task().label().to_string(), failure.cause().to_string()));
    }
}
