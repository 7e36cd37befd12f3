//! Key-value store abstraction backing conversations and summary tasks.

use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;

use crate::digest::core::errors::DigestResult;

/// Boxed future type for key-value store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Minimal key-value store used by the pipeline.
///
/// Implementations must make a single `put` atomic with respect to concurrent
/// `get`s on the same key.
pub trait KeyValueStore<K, V>: Send + Sync {
    /// Insert or replace the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn put(&self, key: K, value: V) -> StoreFuture<'_, DigestResult<()>>;
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, key: K) -> StoreFuture<'_, DigestResult<Option<V>>>;
}

/// Process-lifetime store on a sharded concurrent map.
///
/// Writers lock only the shard holding their key, so a slow caller never
/// blocks reads or writes of other keys.
pub struct InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    entries: Arc<DashMap<K, V>>,
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyValueStore<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn put(&self, key: K, value: V) -> StoreFuture<'_, DigestResult<()>> {
        Box::pin(async move {
            self.entries.insert(key, value);
            Ok(())
        })
    }

    fn get(&self, key: K) -> StoreFuture<'_, DigestResult<Option<V>>> {
        Box::pin(async move { Ok(self.entries.get(&key).map(|entry| entry.value().clone())) })
    }
}
