//! Record sources.
//!
//! A source produces a finite, lazily-pulled sequence of records. Sources
//! are not restartable: a fresh instance is required per execution, and the
//! execution environment closes the source exactly once when the run ends,
//! on every exit path.

use crate::errors::SourceError;
use crate::record::{Datum, Record};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lazy producer of records.
#[async_trait]
pub trait Source<K, V>: Send
where
    K: Datum,
    V: Datum,
{
    /// Pulls the next record, or `None` once the source is exhausted.
    async fn next(&mut self) -> Result<Option<Record<K, V>>, SourceError>;

    /// Releases resources held by the source.
    async fn close(&mut self) -> Result<(), SourceError>;
}

/// A source backed by an in-memory sequence of records.
#[derive(Debug)]
pub struct IterSource<K, V> {
    records: std::vec::IntoIter<Record<K, V>>,
}

impl<K, V> IterSource<K, V>
where
    K: Datum,
    V: Datum,
{
    /// Creates a source over the given records.
    #[must_use]
    pub fn new(records: Vec<Record<K, V>>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }

    /// Creates a source over `(key, value)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(K, V)>) -> Self {
        Self::new(pairs.into_iter().map(Record::from).collect())
    }
}

#[async_trait]
impl<K, V> Source<K, V> for IterSource<K, V>
where
    K: Datum,
    V: Datum,
{
    async fn next(&mut self) -> Result<Option<Record<K, V>>, SourceError> {
        Ok(self.records.next())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// A source fed through a bounded channel.
///
/// `next` waits until a record is sent or every sender is dropped, which
/// makes this the natural source for producers running concurrently with
/// the pipeline.
#[derive(Debug)]
pub struct ChannelSource<K, V> {
    receiver: mpsc::Receiver<Record<K, V>>,
}

impl<K, V> ChannelSource<K, V>
where
    K: Datum,
    V: Datum,
{
    /// Creates a channel-fed source with the given buffer capacity,
    /// returning the sender half for producers.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<Record<K, V>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { receiver: rx })
    }

    /// Wraps an existing receiver.
    #[must_use]
    pub fn from_receiver(receiver: mpsc::Receiver<Record<K, V>>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl<K, V> Source<K, V> for ChannelSource<K, V>
where
    K: Datum,
    V: Datum,
{
    async fn next(&mut self) -> Result<Option<Record<K, V>>, SourceError> {
        Ok(self.receiver.recv().await)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.receiver.close();
        Ok(())
    }
}
