//! Partitioned key/value storage with per-entry time-to-live.
//!
//! Entries are addressed by `(partition, key)`. Backends are expected to refuse
//! lookups without the partition, so callers always carry it (sessions use the
//! user id). Expiry is the backend's job: an entry past its TTL is never returned,
//! whether or not it has been physically evicted yet.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use passage_core::{Clock, SystemClock};

use crate::error::StoreError;

#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Store `value` for `ttl_secs` seconds. Returns `false` (and writes nothing)
    /// when the TTL is not positive.
    async fn set(
        &self,
        key: &str,
        partition: &str,
        value: JsonValue,
        ttl_secs: i64,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str, partition: &str) -> Result<Option<JsonValue>, StoreError>;

    async fn has(&self, key: &str, partition: &str) -> Result<bool, StoreError> {
        Ok(self.get(key, partition).await?.is_some())
    }

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str, partition: &str) -> Result<bool, StoreError>;

    /// All live entries of a partition. Order is unspecified.
    async fn list(&self, partition: &str) -> Result<Vec<(String, JsonValue)>, StoreError>;

    /// Remove every entry of a partition. Returns whether anything was removed.
    async fn clear(&self, partition: &str) -> Result<bool, StoreError>;

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<S> TtlStore for Arc<S>
where
    S: TtlStore + ?Sized,
{
    async fn set(
        &self,
        key: &str,
        partition: &str,
        value: JsonValue,
        ttl_secs: i64,
    ) -> Result<bool, StoreError> {
        (**self).set(key, partition, value, ttl_secs).await
    }

    async fn get(&self, key: &str, partition: &str) -> Result<Option<JsonValue>, StoreError> {
        (**self).get(key, partition).await
    }

    async fn has(&self, key: &str, partition: &str) -> Result<bool, StoreError> {
        (**self).has(key, partition).await
    }

    async fn delete(&self, key: &str, partition: &str) -> Result<bool, StoreError> {
        (**self).delete(key, partition).await
    }

    async fn list(&self, partition: &str) -> Result<Vec<(String, JsonValue)>, StoreError> {
        (**self).list(partition).await
    }

    async fn clear(&self, partition: &str) -> Result<bool, StoreError> {
        (**self).clear(partition).await
    }

    async fn health(&self) -> Result<(), StoreError> {
        (**self).health().await
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: JsonValue,
    expires_at: i64,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// In-memory TTL store for tests/dev.
///
/// Expired entries are filtered on read; every write sweeps the whole map and
/// drops partitions left empty.
pub struct InMemoryTtlStore {
    inner: RwLock<HashMap<String, HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTtlStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn sweep(map: &mut HashMap<String, HashMap<String, Entry>>, now: i64) -> usize {
        let mut pruned = 0;
        map.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|_, e| e.is_live(now));
            pruned += before - bucket.len();
            !bucket.is_empty()
        });
        pruned
    }

    fn lock_error() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

impl Default for InMemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InMemoryTtlStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryTtlStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl TtlStore for InMemoryTtlStore {
    async fn set(
        &self,
        key: &str,
        partition: &str,
        value: JsonValue,
        ttl_secs: i64,
    ) -> Result<bool, StoreError> {
        if ttl_secs <= 0 {
            return Ok(false);
        }

        let now = self.clock.unix_now();
        let mut map = self.inner.write().map_err(|_| Self::lock_error())?;
        let pruned = Self::sweep(&mut map, now);
        if pruned > 0 {
            tracing::trace!(pruned, "expired entries pruned");
        }
        map.entry(partition.to_string()).or_default().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now.saturating_add(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str, partition: &str) -> Result<Option<JsonValue>, StoreError> {
        let now = self.clock.unix_now();
        let map = self.inner.read().map_err(|_| Self::lock_error())?;
        Ok(map
            .get(partition)
            .and_then(|bucket| bucket.get(key))
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str, partition: &str) -> Result<bool, StoreError> {
        let now = self.clock.unix_now();
        let mut map = self.inner.write().map_err(|_| Self::lock_error())?;
        let removed = map
            .get_mut(partition)
            .and_then(|bucket| bucket.remove(key))
            .is_some_and(|e| e.is_live(now));
        if map.get(partition).is_some_and(|b| b.is_empty()) {
            map.remove(partition);
        }
        Ok(removed)
    }

    async fn list(&self, partition: &str) -> Result<Vec<(String, JsonValue)>, StoreError> {
        let now = self.clock.unix_now();
        let map = self.inner.read().map_err(|_| Self::lock_error())?;
        Ok(map
            .get(partition)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|(_, e)| e.is_live(now))
                    .map(|(k, e)| (k.clone(), e.value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, partition: &str) -> Result<bool, StoreError> {
        let now = self.clock.unix_now();
        let mut map = self.inner.write().map_err(|_| Self::lock_error())?;
        Ok(map
            .remove(partition)
            .is_some_and(|bucket| bucket.values().any(|e| e.is_live(now))))
    }
}
