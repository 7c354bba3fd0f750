//! Re-runnable units of work.

use crate::errors::TransformError;
use crate::record::{Datum, Record};
use crate::sink::Sink;
use crate::transform::Transform;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type AttemptFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), TransformError>> + Send + Sync>;

/// One record bound to a transform and a sink.
///
/// Created once per record pulled from the source and never persisted; a
/// task may be invoked multiple times (the original attempt plus any
/// retries), but attempts for one task are never concurrent with each
/// other.
pub struct Task {
    label: String,
    attempt: AttemptFn,
    attempts: AtomicUsize,
    completed: AtomicBool,
}

impl Task {
    pub(crate) fn bind<IK, IV, OK, OV>(
        record: Record<IK, IV>,
        transform: Arc<dyn Transform<IK, IV, OK, OV>>,
        sink: Arc<dyn Sink<OK, OV>>,
    ) -> Arc<Self>
    where
        IK: Datum,
        IV: Datum,
        OK: Datum,
        OV: Datum,
    {
        let label = format!("{:?}", record.key);
        let attempt: AttemptFn = Arc::new(move || {
            let record = record.clone();
            let transform = transform.clone();
            let sink = sink.clone();
            Box::pin(async move { transform.map(record, &sink).await })
        });

        Arc::new(Self {
            label,
            attempt,
            attempts: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
        })
    }

    /// Runs one attempt inline on the caller.
    ///
    /// May be invoked repeatedly if it fails again; a successful run marks
    /// the task completed.
    pub async fn run(&self) -> Result<(), TransformError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = (self.attempt)().await;
        if result.is_ok() {
            self.completed.store(true, Ordering::SeqCst);
        }
        result
    }

    /// A debug rendering of the record key, for diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The number of attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// True once any attempt has succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("attempts", &self.attempts())
            .field("completed", &self.is_completed())
            .finish()
    }
}
