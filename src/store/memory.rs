//! In-process hash store.
//!
//! Mirrors the Redis semantics the cache relies on: lazy per-key expiration,
//! a hash key disappears together with its last field, and mixing plain and
//! hash commands on one key is a `WRONGTYPE` error.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{HashStore, MAX_EXPIRE_SECS, StoreCommand, StoreError, StoreResult, Transaction};

#[derive(Debug, Clone)]
enum Value {
    Plain(Vec<u8>),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

type Keyspace = HashMap<Vec<u8>, Entry>;

/// Memory-backed [`HashStore`].
///
/// One lock guards the whole keyspace, so a committed [`Transaction`] is
/// observed all at once or not at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (expired keys are not counted).
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.keyspace
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Remaining time-to-live of a key, `None` if it is missing or persistent.
    pub fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let now = Instant::now();
        let keyspace = self.keyspace.read();
        let entry = keyspace.get(key).filter(|entry| !entry.is_expired(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    fn live<'a>(keyspace: &'a Keyspace, key: &[u8], now: Instant) -> Option<&'a Entry> {
        keyspace.get(key).filter(|entry| !entry.is_expired(now))
    }

    fn purge_expired(keyspace: &mut Keyspace, key: &[u8], now: Instant) {
        if keyspace.get(key).is_some_and(|entry| entry.is_expired(now)) {
            keyspace.remove(key);
        }
    }

    fn apply_hash_set(
        keyspace: &mut Keyspace,
        bucket: &[u8],
        field: &[u8],
        value: &[u8],
    ) -> StoreResult<()> {
        Self::purge_expired(keyspace, bucket, Instant::now());

        let entry = keyspace.entry(bucket.to_vec()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });

        match &mut entry.value {
            Value::Hash(fields) => {
                fields.insert(field.to_vec(), value.to_vec());
                Ok(())
            }
            Value::Plain(_) => Err(StoreError::WrongType),
        }
    }

    fn apply_expire(keyspace: &mut Keyspace, key: &[u8], seconds: u64) {
        let now = Instant::now();
        Self::purge_expired(keyspace, key, now);

        if let Some(entry) = keyspace.get_mut(key) {
            let ttl = Duration::from_secs(seconds.min(MAX_EXPIRE_SECS));
            // Past the clock's range the key simply never expires
            entry.expires_at = now.checked_add(ttl);
        }
    }
}

#[async_trait]
impl HashStore for MemoryStore {
    async fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        let keyspace = self.keyspace.read();
        Ok(Self::live(&keyspace, key, Instant::now()).is_some())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        // SET replaces any previous value and clears its time-to-live
        self.keyspace.write().insert(
            key.to_vec(),
            Entry {
                value: Value::Plain(value.to_vec()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.keyspace.write().remove(key);
        Ok(())
    }

    async fn hash_get(&self, bucket: &[u8], field: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let keyspace = self.keyspace.read();
        match Self::live(&keyspace, bucket, Instant::now()).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::Plain(_)) => Err(StoreError::WrongType),
        }
    }

    async fn hash_set(&self, bucket: &[u8], field: &[u8], value: &[u8]) -> StoreResult<()> {
        Self::apply_hash_set(&mut self.keyspace.write(), bucket, field, value)
    }

    async fn hash_delete(&self, bucket: &[u8], field: &[u8]) -> StoreResult<()> {
        let mut keyspace = self.keyspace.write();
        Self::purge_expired(&mut keyspace, bucket, Instant::now());

        let emptied = match keyspace.get_mut(bucket).map(|entry| &mut entry.value) {
            None => return Ok(()),
            Some(Value::Plain(_)) => return Err(StoreError::WrongType),
            Some(Value::Hash(fields)) => {
                fields.remove(field);
                fields.is_empty()
            }
        };

        if emptied {
            keyspace.remove(bucket);
        }
        Ok(())
    }

    async fn hash_fields(&self, bucket: &[u8]) -> StoreResult<Vec<Vec<u8>>> {
        let keyspace = self.keyspace.read();
        match Self::live(&keyspace, bucket, Instant::now()).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::Hash(fields)) => Ok(fields.keys().cloned().collect()),
            Some(Value::Plain(_)) => Err(StoreError::WrongType),
        }
    }

    async fn expire(&self, key: &[u8], seconds: u64) -> StoreResult<()> {
        Self::apply_expire(&mut self.keyspace.write(), key, seconds);
        Ok(())
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        let mut keyspace = self.keyspace.write();
        let now = Instant::now();

        // Queued commands can only fail on a type mismatch, so check those
        // up front and nothing is ever half-applied.
        let mismatch = tx.commands().iter().any(|command| match command {
            StoreCommand::HashSet { bucket, .. } => matches!(
                Self::live(&keyspace, bucket, now).map(|entry| &entry.value),
                Some(Value::Plain(_))
            ),
            StoreCommand::Expire { .. } => false,
        });
        if mismatch {
            return Err(StoreError::WrongType);
        }

        let count = tx.commands().len();
        for command in tx.into_commands() {
            match command {
                StoreCommand::HashSet { bucket, field, value } => {
                    Self::apply_hash_set(&mut keyspace, &bucket, &field, &value)?;
                }
                StoreCommand::Expire { bucket, seconds } => {
                    Self::apply_expire(&mut keyspace, &bucket, seconds);
                }
            }
        }

        debug!(commands = count, "Committed memory transaction");
        Ok(())
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_roundtrip_and_missing_field() {
        let store = MemoryStore::new();
        store.hash_set(b"users", b"1", b"alice").await.unwrap();

        assert_eq!(store.hash_get(b"users", b"1").await.unwrap(), Some(b"alice".to_vec()));
        assert_eq!(store.hash_get(b"users", b"2").await.unwrap(), None);
        assert_eq!(store.hash_get(b"nobody", b"1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_field_delete_removes_bucket() {
        let store = MemoryStore::new();
        store.hash_set(b"bucket", b"a", b"1").await.unwrap();
        store.hash_set(b"bucket", b"b", b"2").await.unwrap();

        store.hash_delete(b"bucket", b"a").await.unwrap();
        assert!(store.exists(b"bucket").await.unwrap());

        store.hash_delete(b"bucket", b"b").await.unwrap();
        assert!(!store.exists(b"bucket").await.unwrap());

        // Deleting again is a no-op
        store.hash_delete(b"bucket", b"b").await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set(b"marker", b"x").await.unwrap();

        assert!(matches!(
            store.hash_get(b"marker", b"f").await,
            Err(StoreError::WrongType)
        ));
        assert!(matches!(
            store.hash_set(b"marker", b"f", b"v").await,
            Err(StoreError::WrongType)
        ));
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        store.set(b"plain", b"x").await.unwrap();

        let mut tx = Transaction::new();
        tx.hash_set(b"bucket", b"f", b"v").hash_set(b"plain", b"f", b"v");

        assert!(store.commit(tx).await.is_err());
        assert!(!store.exists(b"bucket").await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_sets_ttl() {
        let store = MemoryStore::new();

        let mut tx = Transaction::new();
        tx.hash_set(b"bucket", b"f", b"v").expire(b"bucket", 600);
        store.commit(tx).await.unwrap();

        let ttl = store.ttl(b"bucket").expect("ttl set");
        assert!(ttl > Duration::from_secs(590));
        assert!(store.ttl(b"missing").is_none());
    }

    #[tokio::test]
    async fn test_huge_expire_is_capped() {
        let store = MemoryStore::new();
        store.hash_set(b"bucket", b"f", b"v").await.unwrap();
        store.expire(b"bucket", u64::MAX).await.unwrap();

        let mut tx = Transaction::new();
        tx.hash_set(b"bucket", b"g", b"w").expire(b"bucket", u64::MAX);
        store.commit(tx).await.unwrap();

        assert_eq!(store.hash_fields(b"bucket").await.unwrap().len(), 2);
        assert!(
            store
                .ttl(b"bucket")
                .is_none_or(|ttl| ttl <= Duration::from_secs(MAX_EXPIRE_SECS))
        );
    }

    #[tokio::test]
    async fn test_zero_second_expire_drops_key() {
        let store = MemoryStore::new();
        store.hash_set(b"bucket", b"f", b"v").await.unwrap();
        store.expire(b"bucket", 0).await.unwrap();

        assert!(!store.exists(b"bucket").await.unwrap());
        assert!(store.hash_fields(b"bucket").await.unwrap().is_empty());
        assert_eq!(store.key_count(), 0);
    }
}
