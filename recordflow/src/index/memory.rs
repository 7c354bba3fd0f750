//! In-memory reference implementation of the index sink contract.
//!
//! Used to validate the contract itself and as the index in tests. The
//! committed-entry set is owned by an explicit [`MemoryIndex`] handle
//! passed into every sink at construction, never process-global.

use super::{Index, IndexSinkFactory, IndexValue};
use crate::errors::{IndexError, SinkError};
use crate::record::{Datum, Record};
use crate::sink::{RecordWriter, Sink};
use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// An in-memory backing index of committed entries.
#[derive(Debug)]
pub struct MemoryIndex<V>
where
    V: IndexValue,
{
    entries: DashSet<V>,
}

impl<V> MemoryIndex<V>
where
    V: IndexValue,
{
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashSet::new(),
        })
    }

    /// Creates a sink that commits its own writes when closed.
    #[must_use]
    pub fn sink<K>(self: &Arc<Self>) -> Arc<MemoryIndexSink<K, V>>
    where
        K: Datum,
    {
        Arc::new(MemoryIndexSink::new(self.clone(), true))
    }

    /// Creates a factory whose sinks share one batch commit boundary.
    #[must_use]
    pub fn batch<K>(self: &Arc<Self>) -> MemoryIndexSinkFactory<K, V>
    where
        K: Datum,
    {
        MemoryIndexSinkFactory {
            index: self.clone(),
            sinks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn commit(&self, values: Vec<V>) {
        let mut added = 0_usize;
        for value in values {
            if self.entries.insert(value) {
                added += 1;
            }
        }
        debug!(added = added, total = self.entries.len(), "committed entries");
    }
}

#[async_trait]
impl<V> Index<V> for MemoryIndex<V>
where
    V: IndexValue,
{
    async fn contains(&self, value: &V) -> Result<bool, IndexError> {
        Ok(self.entries.contains(value))
    }

    async fn size(&self) -> Result<usize, IndexError> {
        Ok(self.entries.len())
    }
}

/// A sink staging writes against a [`MemoryIndex`].
///
/// Writes stay invisible until the commit boundary: the sink's own close
/// for per-writer sinks, the owning factory's close for batch sinks.
#[derive(Debug)]
pub struct MemoryIndexSink<K, V>
where
    V: IndexValue,
{
    index: Arc<MemoryIndex<V>>,
    staged: Mutex<Vec<V>>,
    commit_on_close: bool,
    closed: AtomicBool,
    _key: PhantomData<fn() -> K>,
}

impl<K, V> MemoryIndexSink<K, V>
where
    K: Datum,
    V: IndexValue,
{
    fn new(index: Arc<MemoryIndex<V>>, commit_on_close: bool) -> Self {
        Self {
            index,
            staged: Mutex::new(Vec::new()),
            commit_on_close,
            closed: AtomicBool::new(false),
            _key: PhantomData,
        }
    }

    /// Number of writes staged and not yet committed or discarded.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    fn take_staged(&self) -> Vec<V> {
        std::mem::take(&mut *self.staged.lock())
    }
}

#[async_trait]
impl<K, V> RecordWriter<K, V> for MemoryIndexSink<K, V>
where
    K: Datum,
    V: IndexValue,
{
    async fn write(&self, record: Record<K, V>) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.staged.lock().push(record.value);
        Ok(())
    }
}

#[async_trait]
impl<K, V> Sink<K, V> for MemoryIndexSink<K, V>
where
    K: Datum,
    V: IndexValue,
{
    async fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            // Already closed: committing again changes nothing.
            return Ok(());
        }
        if self.commit_on_close {
            self.index.commit(self.take_staged());
        }
        Ok(())
    }
}

/// Factory producing batch-committed sinks against one [`MemoryIndex`].
///
/// Individual sink closes commit nothing; only `close(true)` on the
/// factory publishes the union of writes staged across every sink it
/// produced, and `close(false)` discards them.
#[derive(Debug)]
pub struct MemoryIndexSinkFactory<K, V>
where
    V: IndexValue,
{
    index: Arc<MemoryIndex<V>>,
    sinks: Mutex<Vec<Arc<MemoryIndexSink<K, V>>>>,
    closed: AtomicBool,
}

#[async_trait]
impl<K, V> IndexSinkFactory<K, V> for MemoryIndexSinkFactory<K, V>
where
    K: Datum,
    V: IndexValue,
{
    async fn create_sink(&self) -> Result<Arc<dyn Sink<K, V>>, IndexError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::backend("factory is closed"));
        }
        let sink = Arc::new(MemoryIndexSink::new(self.index.clone(), false));
        self.sinks.lock().push(sink.clone());
        Ok(sink)
    }

    async fn close(&self, success: bool) -> Result<(), IndexError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sinks = self.sinks.lock().clone();
        for sink in sinks {
            let staged = sink.take_staged();
            if success {
                self.index.commit(staged);
            }
        }
        Ok(())
    }
}
