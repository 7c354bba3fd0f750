//! The record type flowing through every pipeline.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Marker trait for key and value payloads.
///
/// Keys and values are opaque, caller-defined types; the framework assumes
/// nothing beyond cloning (for re-runnable tasks), thread mobility, and a
/// debug rendering for diagnostics.
pub trait Datum: Clone + Send + Sync + Debug + 'static {}

impl<T> Datum for T where T: Clone + Send + Sync + Debug + 'static {}

/// An ordered key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record<K, V> {
    /// The record key.
    pub key: K,
    /// The record value.
    pub value: V,
}

impl<K, V> Record<K, V> {
    /// Creates a new record.
    #[must_use]
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// Splits the record into its key and value.
    #[must_use]
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K, V> From<(K, V)> for Record<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}
