//! # Recordflow
//!
//! A generic record transform and execution pipeline.
//!
//! Recordflow pulls records from a [`Source`](source::Source), runs a
//! (possibly chained) [`Transform`](transform::Transform) over each record,
//! and writes the results to a [`Sink`](sink::Sink), with precise
//! concurrency, retry, and exactly-once-commit semantics:
//!
//! - **Worker pools**: direct inline execution, or bounded parallelism with
//!   blocking admission so the record puller is backpressured instead of
//!   buffering unboundedly
//! - **Transform chains**: composable multi-stage transformation with
//!   compile-time stage type checking
//! - **Failure protocol**: per-task failure envelopes delivered to a
//!   listener that may retry, re-run inline, or let the task be dropped or
//!   escalated
//! - **Index sinks**: a commit-boundary contract (invisibility before
//!   commit, durability after, isolation, idempotency, thread-safety) that
//!   keeps retried work from corrupting or duplicating committed state
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recordflow::prelude::*;
//!
//! let env = ExecutionEnvironment::new()
//!     .with_worker_pool(Arc::new(BoundedPool::new(4)));
//!
//! let summary = env
//!     .execute_with_listener(source, transform, sink, Arc::new(RetryingListener::default()))
//!     .await?;
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

pub mod errors;
pub mod execution;
pub mod index;
pub mod observability;
pub mod pool;
pub mod record;
pub mod sink;
pub mod source;
pub mod transform;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::{
        IndexError, PipelineError, SinkError, SourceError, TransformError,
    };
    pub use crate::execution::{
        CollectingListener, ExecutionEnvironment, FailureListener, RetryPolicy,
        RetryingListener, RunSummary, Task, TaskFailure,
    };
    pub use crate::index::{
        Index, IndexSinkFactory, IndexValue, MemoryIndex, MemoryIndexSink,
        MemoryIndexSinkFactory,
    };
    pub use crate::pool::{BoundedPool, DirectPool, WorkUnit, WorkerPool};
    pub use crate::record::{Datum, Record};
    pub use crate::sink::{CollectingSink, NoOpSink, RecordWriter, Sink};
    pub use crate::source::{ChannelSource, IterSource, Source};
    pub use crate::transform::{
        Chained, FnTransform, IdentityTransform, Transform, TransformChain, TransformExt,
    };
}
