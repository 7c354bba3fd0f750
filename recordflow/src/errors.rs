//! Error types for the recordflow framework.
//!
//! Each failure domain carries its own error enum; `PipelineError` is the
//! only type visible to a caller of `execute`. Per-record transform
//! failures travel through the failure-envelope machinery instead, so that
//! retries can cross thread boundaries without language-level unwinding.

use thiserror::Error;

/// Error produced while pulling records from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source failed to produce the next record.
    #[error("source read failed: {0}")]
    Read(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SourceError {
    /// Creates a read error.
    #[must_use]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }
}

/// Error produced while writing to or closing a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The write was rejected because the sink was already closed.
    #[error("sink is closed")]
    Closed,

    /// The sink backend rejected the write.
    #[error("write failed: {0}")]
    Write(String),

    /// A downstream transform stage failed while consuming this write.
    #[error("downstream stage failed: {source}")]
    Downstream {
        /// The failing stage's error.
        #[source]
        source: Box<TransformError>,
    },

    /// The backing index reported an error.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SinkError {
    /// Creates a write error.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    /// Wraps a downstream stage failure.
    #[must_use]
    pub fn downstream(source: TransformError) -> Self {
        Self::Downstream {
            source: Box::new(source),
        }
    }
}

/// Error raised by a transform while producing output for one record.
///
/// Always recoverable in principle; its ultimate disposition (retried,
/// dropped, or fatal) is decided by the failure listener and the
/// environment's drop policy.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The transform failed to produce output.
    #[error("transform failed: {0}")]
    Failed(String),

    /// A write into the output sink failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransformError {
    /// Creates a transform failure with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Error raised by a commit-oriented index backend.
///
/// Surfaced at the sink's commit boundary, distinct from per-record
/// transform failures: it represents a storage-layer problem.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The commit boundary failed; staged writes may not be durable.
    #[error("index commit failed: {0}")]
    Commit(String),

    /// The backend failed to answer a query or store an entry.
    #[error("index backend error: {0}")]
    Backend(String),
}

impl IndexError {
    /// Creates a commit error.
    #[must_use]
    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit(message.into())
    }

    /// Creates a backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// The error returned by `ExecutionEnvironment::execute`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A record's transform failed and no recovery path was taken.
    #[error("task failed permanently: {source}")]
    TaskFailed {
        /// The transform's original error.
        #[source]
        source: TransformError,
    },

    /// The source failed while producing records.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The sink failed to flush at close.
    #[error("sink close failed: {0}")]
    SinkClose(#[source] SinkError),

    /// A backing index rejected a commit.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl PipelineError {
    /// Wraps a sink-close failure, keeping commit-time index errors distinct.
    #[must_use]
    pub fn from_close(error: SinkError) -> Self {
        match error {
            SinkError::Index(index) => Self::Index(index),
            other => Self::SinkClose(other),
        }
    }
}
