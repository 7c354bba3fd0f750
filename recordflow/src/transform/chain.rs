//! Composition of transforms into a single transform.
//!
//! A chain behaves as one transform: stage *i*'s writes invoke stage
//! *i+1*, terminating in the caller-supplied writer. A stage that writes
//! more than once fans out through every downstream stage, so output
//! cardinality compounds multiplicatively through the chain.

use super::Transform;
use crate::errors::{SinkError, TransformError};
use crate::record::{Datum, Record};
use crate::sink::RecordWriter;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

/// An ordered list of same-typed transforms behaving as one.
///
/// The empty chain is the identity transform. Chains hold no per-call
/// state and are safely reusable across repeated `map` invocations.
pub struct TransformChain<K, V>
where
    K: Datum,
    V: Datum,
{
    stages: Vec<Arc<dyn Transform<K, V, K, V>>>,
}

impl<K, V> TransformChain<K, V>
where
    K: Datum,
    V: Datum,
{
    /// Creates an empty chain (the identity transform).
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Transform<K, V, K, V>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a stage in place.
    pub fn push(&mut self, stage: Arc<dyn Transform<K, V, K, V>>) {
        self.stages.push(stage);
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn dispatch<'a>(
        &'a self,
        index: usize,
        record: Record<K, V>,
        out: &'a dyn RecordWriter<K, V>,
    ) -> BoxFuture<'a, Result<(), TransformError>> {
        Box::pin(async move {
            match self.stages.get(index) {
                None => {
                    out.write(record).await?;
                    Ok(())
                }
                Some(stage) => {
                    let cursor = ChainCursor {
                        chain: self,
                        next: index + 1,
                        out,
                    };
                    stage.map(record, &cursor).await
                }
            }
        })
    }
}

impl<K, V> Default for TransformChain<K, V>
where
    K: Datum,
    V: Datum,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for TransformChain<K, V>
where
    K: Datum,
    V: Datum,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[async_trait]
impl<K, V> Transform<K, V, K, V> for TransformChain<K, V>
where
    K: Datum,
    V: Datum,
{
    async fn map(
        &self,
        record: Record<K, V>,
        out: &dyn RecordWriter<K, V>,
    ) -> Result<(), TransformError> {
        self.dispatch(0, record, out).await
    }
}

/// Writer that feeds a stage's output into the rest of the chain.
struct ChainCursor<'a, K, V>
where
    K: Datum,
    V: Datum,
{
    chain: &'a TransformChain<K, V>,
    next: usize,
    out: &'a dyn RecordWriter<K, V>,
}

#[async_trait]
impl<'a, K, V> RecordWriter<K, V> for ChainCursor<'a, K, V>
where
    K: Datum,
    V: Datum,
{
    async fn write(&self, record: Record<K, V>) -> Result<(), SinkError> {
        self.chain
            .dispatch(self.next, record, self.out)
            .await
            .map_err(SinkError::downstream)
    }
}

/// Two transforms chained into one, built by [`TransformExt::then`].
///
/// The middle key/value types are fixed by the type parameters, so
/// composing stages whose types do not line up fails to compile.
///
/// [`TransformExt::then`]: super::TransformExt::then
pub struct Chained<A, B, MK, MV> {
    first: A,
    second: B,
    _mid: PhantomData<fn() -> (MK, MV)>,
}

impl<A, B, MK, MV> Chained<A, B, MK, MV> {
    /// Chains `second` after `first`.
    #[must_use]
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _mid: PhantomData,
        }
    }
}

impl<A, B, MK, MV> std::fmt::Debug for Chained<A, B, MK, MV> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chained").finish_non_exhaustive()
    }
}

#[async_trait]
impl<A, B, IK, IV, MK, MV, OK, OV> Transform<IK, IV, OK, OV> for Chained<A, B, MK, MV>
where
    A: Transform<IK, IV, MK, MV>,
    B: Transform<MK, MV, OK, OV>,
    IK: Datum,
    IV: Datum,
    MK: Datum,
    MV: Datum,
    OK: Datum,
    OV: Datum,
{
    async fn map(
        &self,
        record: Record<IK, IV>,
        out: &dyn RecordWriter<OK, OV>,
    ) -> Result<(), TransformError> {
        let bridge = ChainedWriter {
            next: &self.second,
            out,
        };
        self.first.map(record, &bridge).await
    }
}

/// Writer that runs the second half of a [`Chained`] transform.
struct ChainedWriter<'a, B, OK, OV>
where
    OK: Datum,
    OV: Datum,
{
    next: &'a B,
    out: &'a dyn RecordWriter<OK, OV>,
}

#[async_trait]
impl<'a, B, MK, MV, OK, OV> RecordWriter<MK, MV> for ChainedWriter<'a, B, OK, OV>
where
    B: Transform<MK, MV, OK, OV>,
    MK: Datum,
    MV: Datum,
    OK: Datum,
    OV: Datum,
{
    async fn write(&self, record: Record<MK, MV>) -> Result<(), SinkError> {
        self.next
            .map(record, self.out)
            .await
            .map_err(SinkError::downstream)
    }
}
