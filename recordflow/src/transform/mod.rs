//! Record transforms.
//!
//! A transform maps one input record into zero or more output records by
//! writing them to the supplied writer. Transforms must be free of
//! cross-invocation state: retries and concurrently-processed records both
//! require that repeated `map` calls are independent.

mod chain;

pub use chain::{Chained, TransformChain};

use crate::errors::TransformError;
use crate::record::{Datum, Record};
use crate::sink::RecordWriter;
use async_trait::async_trait;

/// Per-record function producing zero or more output records.
#[async_trait]
pub trait Transform<IK, IV, OK, OV>: Send + Sync
where
    IK: Datum,
    IV: Datum,
    OK: Datum,
    OV: Datum,
{
    /// Maps `record` into output records written to `out`.
    ///
    /// May signal failure instead of completing; a failed map must not be
    /// assumed to have written anything, and commit-oriented sinks erase
    /// duplicate writes on retry in any case.
    async fn map(
        &self,
        record: Record<IK, IV>,
        out: &dyn RecordWriter<OK, OV>,
    ) -> Result<(), TransformError>;
}

/// Chaining combinator, available on every transform.
pub trait TransformExt<IK, IV, OK, OV>: Transform<IK, IV, OK, OV>
where
    IK: Datum,
    IV: Datum,
    OK: Datum,
    OV: Datum,
{
    /// Runs `next` over every record this transform writes.
    ///
    /// Stage types are checked by the compiler: the output key/value types
    /// of `self` must equal the input types of `next`, so a mismatched
    /// chain is a construction-time error, never a runtime one.
    fn then<T, FK, FV>(self, next: T) -> Chained<Self, T, OK, OV>
    where
        Self: Sized,
        T: Transform<OK, OV, FK, FV>,
        FK: Datum,
        FV: Datum,
    {
        Chained::new(self, next)
    }
}

impl<X, IK, IV, OK, OV> TransformExt<IK, IV, OK, OV> for X
where
    X: Transform<IK, IV, OK, OV>,
    IK: Datum,
    IV: Datum,
    OK: Datum,
    OV: Datum,
{
}

/// Passes every record through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

#[async_trait]
impl<K, V> Transform<K, V, K, V> for IdentityTransform
where
    K: Datum,
    V: Datum,
{
    async fn map(
        &self,
        record: Record<K, V>,
        out: &dyn RecordWriter<K, V>,
    ) -> Result<(), TransformError> {
        out.write(record).await?;
        Ok(())
    }
}

/// A transform built from a plain function returning the output records.
pub struct FnTransform<F> {
    func: F,
}

impl<F> FnTransform<F> {
    /// Creates a function-based transform.
    #[must_use]
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> std::fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, IK, IV, OK, OV> Transform<IK, IV, OK, OV> for FnTransform<F>
where
    F: Fn(Record<IK, IV>) -> Result<Vec<Record<OK, OV>>, TransformError> + Send + Sync,
    IK: Datum,
    IV: Datum,
    OK: Datum,
    OV: Datum,
{
    async fn map(
        &self,
        record: Record<IK, IV>,
        out: &dyn RecordWriter<OK, OV>,
    ) -> Result<(), TransformError> {
        for output in (self.func)(record)? {
            out.write(output).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;

    #[tokio::test]
    async fn test_identity_passes_record_through() {
        let sink = CollectingSink::new();
        IdentityTransform
            .map(Record::new("k", "v"), &sink)
            .await
            .unwrap();

        assert_eq!(sink.records(), vec![Record::new("k", "v")]);
    }

    #[tokio::test]
    async fn test_fn_transform_fan_out() {
        let transform = FnTransform::new(|record: Record<String, u32>| {
            Ok(vec![
                Record::new(record.key.clone(), record.value),
                Record::new(record.key, record.value + 1),
            ])
        });

        let sink = CollectingSink::new();
        transform
            .map(Record::new("n".to_string(), 1), &sink)
            .await
            .unwrap();

        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_fn_transform_propagates_failure() {
        let transform = FnTransform::new(|_record: Record<String, String>| {
            Err::<Vec<Record<String, String>>, _>(TransformError::failed("nope"))
        });

        let sink = CollectingSink::new();
        let err = transform
            .map(Record::new("k".to_string(), "v".to_string()), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Failed(_)));
        assert!(sink.is_empty());
    }
}
