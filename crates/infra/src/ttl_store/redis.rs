//! Redis-backed TTL store.
//!
//! Each value lives under `{namespace}:{partition}:{key}` with a native Redis
//! expiry (`SET ... EX`), so Redis evicts sessions on its own and `GET` never
//! returns an expired value. Partition-wide operations (`list`, `clear`) walk
//! the keyspace with `SCAN`, never `KEYS`.
//!
//! The partition segment is percent-encoded (`%` and `:`), so it never contains
//! a separator and `{namespace}:{partition}:` is a prefix of exactly one
//! partition's keys.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::instrument;

use passage_store::{StoreError, TtlStore};

const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisTtlStore {
    conn: redis::aio::MultiplexedConnection,
    namespace: String,
}

impl core::fmt::Debug for RedisTtlStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisTtlStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisTtlStore {
    /// Connect to `redis_url` (e.g. `redis://localhost:6379`).
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("redis connection error: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Backend(format!("redis connection error: {e}")))?;

        Ok(Self {
            conn,
            namespace: namespace.into(),
        })
    }

    fn key(&self, partition: &str, key: &str) -> String {
        format!("{}{}", partition_prefix(&self.namespace, partition), key)
    }

    fn partition_prefix(&self, partition: &str) -> String {
        partition_prefix(&self.namespace, partition)
    }

    /// All keys of a partition, via cursor-based `SCAN`.
    async fn scan_partition(&self, partition: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}*", escape_glob(&self.partition_prefix(partition)));
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| command_error("SCAN", e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

#[async_trait]
impl TtlStore for RedisTtlStore {
    #[instrument(skip(self, value), fields(namespace = %self.namespace), err)]
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

        let payload = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(partition, key))
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| command_error("SET", e))?;

        Ok(true)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn get(&self, key: &str, partition: &str) -> Result<Option<JsonValue>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(partition, key))
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("GET", e))?;

        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(StoreError::from)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn has(&self, key: &str, partition: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("EXISTS")
            .arg(self.key(partition, key))
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("EXISTS", e))?;
        Ok(count > 0)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn delete(&self, key: &str, partition: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(self.key(partition, key))
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("DEL", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn list(&self, partition: &str) -> Result<Vec<(String, JsonValue)>, StoreError> {
        let keys = self.scan_partition(partition).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys[..])
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("MGET", e))?;

        let prefix = self.partition_prefix(partition);
        let mut entries = Vec::with_capacity(keys.len());
        // Keys that expired between SCAN and MGET come back as nil.
        for (full_key, raw) in keys.iter().zip(values) {
            let (Some(key), Some(raw)) = (full_key.strip_prefix(&prefix), raw) else {
                continue;
            };
            entries.push((key.to_string(), serde_json::from_str(&raw)?));
        }
        Ok(entries)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace), err)]
    async fn clear(&self, partition: &str) -> Result<bool, StoreError> {
        let keys = self.scan_partition(partition).await?;
        if keys.is_empty() {
            return Ok(false);
        }

        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(&keys[..])
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("DEL", e))?;
        Ok(removed > 0)
    }

    async fn health(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("PING", e))?;
        if pong != "PONG" {
            return Err(StoreError::Backend(format!("unexpected PING reply: {pong}")));
        }
        Ok(())
    }
}

fn command_error(command: &str, err: redis::RedisError) -> StoreError {
    StoreError::Backend(format!("redis {command} failed: {err}"))
}

fn partition_prefix(namespace: &str, partition: &str) -> String {
    format!("{}:{}:", namespace, encode_partition(partition))
}

fn encode_partition(partition: &str) -> String {
    let mut encoded = String::with_capacity(partition.len());
    for c in partition.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            ':' => encoded.push_str("%3A"),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Escape Redis glob metacharacters so a partition name matches literally.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("passage:u-1:"), "passage:u-1:");
        assert_eq!(escape_glob("ns:a*b?[c]\\:"), "ns:a\\*b\\?\\[c\\]\\\\:");
    }

    #[test]
    fn partition_separators_are_encoded() {
        assert_eq!(partition_prefix("ns", "u-1"), "ns:u-1:");
        assert_eq!(partition_prefix("ns", "a:b"), "ns:a%3Ab:");
        assert_eq!(partition_prefix("ns", "50%"), "ns:50%25:");
        assert_eq!(partition_prefix("ns", "a%3Ab"), "ns:a%253Ab:");
    }

    #[test]
    fn one_partition_prefix_never_covers_another() {
        let users = ["a", "a:b", "a%3Ab", "a:", ":a"];
        let entries: Vec<String> = users
            .iter()
            .map(|u| format!("{}s1", partition_prefix("passage:sessions", u)))
            .collect();

        for (i, user) in users.iter().enumerate() {
            let prefix = partition_prefix("passage:sessions", user);
            let matched: Vec<usize> = entries
                .iter()
                .enumerate()
                .filter(|(_, key)| key.starts_with(&prefix))
                .map(|(j, _)| j)
                .collect();
            assert_eq!(matched, vec![i], "prefix {prefix:?} of user {user:?}");
        }
    }
}
