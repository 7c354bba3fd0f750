//! Record sinks.
//!
//! The write capability (`RecordWriter`) is split from the closable
//! resource (`Sink`): transforms only ever see a writer, while the
//! execution environment owns the close, which is invoked even on the
//! failure path. Wrapper writers built by transform chains therefore never
//! propagate a close.

use crate::errors::SinkError;
use crate::record::{Datum, Record};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Write capability handed to transforms.
#[async_trait]
pub trait RecordWriter<K, V>: Send + Sync
where
    K: Datum,
    V: Datum,
{
    /// Consumes one record.
    async fn write(&self, record: Record<K, V>) -> Result<(), SinkError>;
}

/// A closable record consumer.
///
/// Sinks are the only resource shared across concurrently-running tasks
/// and must tolerate interleaved writers.
#[async_trait]
pub trait Sink<K, V>: RecordWriter<K, V>
where
    K: Datum,
    V: Datum,
{
    /// Flushes and releases the sink.
    async fn close(&self) -> Result<(), SinkError>;
}

#[async_trait]
impl<K, V> RecordWriter<K, V> for Arc<dyn Sink<K, V>>
where
    K: Datum,
    V: Datum,
{
    async fn write(&self, record: Record<K, V>) -> Result<(), SinkError> {
        (**self).write(record).await
    }
}

/// A sink that accumulates records in memory, for tests and small runs.
#[derive(Debug, Default)]
pub struct CollectingSink<K, V> {
    records: RwLock<Vec<Record<K, V>>>,
    closed: AtomicBool,
}

impl<K, V> CollectingSink<K, V>
where
    K: Datum,
    V: Datum,
{
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<Record<K, V>> {
        self.records.read().clone()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns true once the sink has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<K, V> RecordWriter<K, V> for CollectingSink<K, V>
where
    K: Datum,
    V: Datum,
{
    async fn write(&self, record: Record<K, V>) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.records.write().push(record);
        Ok(())
    }
}

#[async_trait]
impl<K, V> Sink<K, V> for CollectingSink<K, V>
where
    K: Datum,
    V: Datum,
{
    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// A sink that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

#[async_trait]
impl<K, V> RecordWriter<K, V> for NoOpSink
where
    K: Datum,
    V: Datum,
{
    async fn write(&self, _record: Record<K, V>) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl<K, V> Sink<K, V> for NoOpSink
where
    K: Datum,
    V: Datum,
{
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collecting_sink_accumulates() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());

        sink.write(Record::new("a", 1)).await.unwrap();
        sink.write(Record::new("b", 2)).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[0], Record::new("a", 1));
    }

    #[tokio::test]
    async fn test_collecting_sink_rejects_after_close() {
        let sink = CollectingSink::new();
        sink.close().await.unwrap();
        assert!(sink.is_closed());

        let err = sink.write(Record::new("a", 1)).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        let sink = NoOpSink;
        sink.write(Record::new("a", 1)).await.unwrap();
        Sink::<&'static str, i32>::close(&sink).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_sink_writes_through_arc() {
        let sink: Arc<dyn Sink<&'static str, i32>> = Arc::new(CollectingSink::new());
        sink.write(Record::new("a", 1)).await.unwrap();
        sink.close().await.unwrap();
    }
}
