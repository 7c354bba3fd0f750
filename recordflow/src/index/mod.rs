//! Commit-oriented index sinks.
//!
//! A backing index stores entries identified by value equality. Writes go
//! through ordinary [`Sink`]s, but durability is deferred to a commit
//! boundary, which comes in two shapes:
//!
//! - **Per-writer commit**: one sink instance per logical writer; closing
//!   that sink commits exactly its own writes.
//! - **Batch commit**: an [`IndexSinkFactory`] produces multiple sinks;
//!   closing an individual sink commits nothing, and only the factory's
//!   `close(true)` commits the union of writes across every sink it
//!   produced.
//!
//! Independent of shape, a conforming backend guarantees:
//!
//! 1. writes are invisible in the index until the commit boundary;
//! 2. every write staged before the boundary is visible immediately after;
//! 3. committing one sink or factory never publishes writes staged in a
//!    different, uncommitted one;
//! 4. writing an equal value multiple times, through one sink or several
//!    sinks under one factory, yields exactly one entry after commit;
//! 5. concurrent writers never lose, duplicate, or miscount entries;
//! 6. committing an already-committed sink or factory changes nothing.
//!
//! These guarantees are what make the execution environment's retry
//! protocol safe: a replayed task may write the same values again, and the
//! index erases the difference.
//!
//! [`Sink`]: crate::sink::Sink

mod memory;

pub use memory::{MemoryIndex, MemoryIndexSink, MemoryIndexSinkFactory};

use crate::errors::IndexError;
use crate::record::Datum;
use crate::sink::Sink;
use async_trait::async_trait;
use std::hash::Hash;
use std::sync::Arc;

/// Values storable in an index; equality defines entry identity.
pub trait IndexValue: Datum + Eq + Hash {}

impl<T> IndexValue for T where T: Datum + Eq + Hash {}

/// Read view over a backing index.
#[async_trait]
pub trait Index<V>: Send + Sync
where
    V: IndexValue,
{
    /// True if a committed entry equal to `value` exists.
    async fn contains(&self, value: &V) -> Result<bool, IndexError>;

    /// Number of committed entries.
    async fn size(&self) -> Result<usize, IndexError>;
}

/// Factory producing sinks that share one batch commit boundary.
#[async_trait]
pub trait IndexSinkFactory<K, V>: Send + Sync
where
    K: Datum,
    V: IndexValue,
{
    /// Creates a new sink staging into this factory's batch.
    async fn create_sink(&self) -> Result<Arc<dyn Sink<K, V>>, IndexError>;

    /// Commits (`success`) or discards (`!success`) the union of writes
    /// staged by every sink this factory produced. Repeated calls are
    /// no-ops.
    async fn close(&self, success: bool) -> Result<(), IndexError>;
}
