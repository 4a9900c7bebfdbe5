//! A named cache region stored as one hash bucket.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::DEFAULT_LOCK_POLL_INTERVAL;
use super::{CacheError, Result};
use crate::store::{HashStore, StoreResult, Transaction};

/// Suffix appended to the region name to form its lock marker key.
pub const LOCK_SUFFIX: &str = "~lock";

/// One logical cache living in its own hash bucket.
///
/// Entries are fields of the bucket, so the same application key used in
/// two regions lands in two different store keys.
///
/// A clear in progress is signalled by a lock marker key. `get` and `put`
/// wait while the marker exists; `evict` does not. The wait is an admission
/// check only: nothing stops a clear from starting right after it.
///
/// Regions hold no cache state of their own, so two instances built for the
/// same name behave identically.
pub struct Region {
    name: Arc<str>,
    bucket_key: Vec<u8>,
    lock_key: Vec<u8>,
    expiration: u64,
    read: Arc<dyn HashStore>,
    write: Arc<dyn HashStore>,
    lock_poll_interval: Duration,
    lock_wait_timeout: Option<Duration>,
}

impl Region {
    /// Create a region.
    ///
    /// `bucket_key` defaults to the name's bytes. `expiration` is the bucket
    /// time-to-live in seconds applied on every write, `0` for none.
    ///
    /// # Errors
    /// Returns `InvalidRegionName` if `name` is blank or ends in
    /// [`LOCK_SUFFIX`], which would make its bucket another region's marker.
    pub fn new(
        name: &str,
        bucket_key: Option<Vec<u8>>,
        read: Arc<dyn HashStore>,
        write: Arc<dyn HashStore>,
        expiration: u64,
    ) -> Result<Self> {
        if name.trim().is_empty() || name.ends_with(LOCK_SUFFIX) {
            return Err(CacheError::InvalidRegionName(name.to_string()));
        }

        Ok(Self {
            name: Arc::from(name),
            bucket_key: bucket_key.unwrap_or_else(|| name.as_bytes().to_vec()),
            lock_key: format!("{name}{LOCK_SUFFIX}").into_bytes(),
            expiration,
            read,
            write,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            lock_wait_timeout: None,
        })
    }

    /// Set the lock polling behaviour (builder pattern).
    #[must_use]
    pub fn with_lock_polling(mut self, interval: Duration, timeout: Option<Duration>) -> Self {
        self.lock_poll_interval = interval;
        self.lock_wait_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket_key(&self) -> &[u8] {
        &self.bucket_key
    }

    pub fn lock_key(&self) -> &[u8] {
        &self.lock_key
    }

    /// Bucket time-to-live in seconds, `0` if the bucket never expires.
    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    /// The store reads go to.
    pub fn store(&self) -> &Arc<dyn HashStore> {
        &self.read
    }

    /// Get a value from the region.
    ///
    /// Waits for any clear in progress, then reads the key's field.
    /// Returns `Ok(None)` if the field does not exist; store failures are
    /// returned as errors, never as a miss.
    pub async fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        let field = serde_json::to_vec(key)?;

        self.wait_for_lock(&*self.read).await?;

        match self.read.hash_get(&self.bucket_key, &field).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store a value in the region.
    ///
    /// Waits for any clear in progress, then writes the field and refreshes
    /// the bucket time-to-live in one transaction. The wait and the
    /// transaction are separate steps, so a clear starting in between may
    /// still remove the value.
    pub async fn put<K, V>(&self, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let field = serde_json::to_vec(key)?;
        let raw = serde_json::to_vec(value)?;

        self.wait_for_lock(&*self.write).await?;

        let mut tx = Transaction::new();
        tx.hash_set(&self.bucket_key, &field, &raw);
        if self.expiration > 0 {
            tx.expire(&self.bucket_key, self.expiration);
        }

        self.write.commit(tx).await?;
        Ok(())
    }

    /// Remove a single key. Does not wait for a clear in progress.
    pub async fn evict<K>(&self, key: &K) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let field = serde_json::to_vec(key)?;
        self.write.hash_delete(&self.bucket_key, &field).await?;
        Ok(())
    }

    /// Remove every key in the region.
    ///
    /// Returns immediately if another clear already holds the lock marker.
    /// Otherwise sets the marker, deletes the bucket's fields one by one and
    /// removes the marker again, whether or not the deletion succeeded.
    pub async fn clear(&self) -> Result<()> {
        if self.write.exists(&self.lock_key).await? {
            debug!(region = %self.name, "Clear already in progress, skipping");
            return Ok(());
        }

        // Armed before the SET is sent, so a cancelled or failed SET
        // still gets its marker removed
        let marker = LockMarker::new(Arc::clone(&self.write), self.lock_key.clone());
        self.write.set(&self.lock_key, &self.lock_key).await?;

        let outcome = self.delete_fields().await;
        let released = marker.release().await;

        let removed = outcome?;
        released?;

        debug!(region = %self.name, removed, "Cleared region");
        Ok(())
    }

    /// Get a value, or compute and store it on a miss.
    pub async fn get_or_insert_with<K, V, F, Fut>(&self, key: &K, loader: F) -> Result<V>
    where
        K: Serialize + ?Sized,
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_try_insert_with(key, move || async move {
            Ok::<_, CacheError>(loader().await)
        })
        .await
    }

    /// Get a value, or compute it with a fallible loader and store it on a miss.
    ///
    /// A loader error is returned as is and nothing is stored.
    pub async fn get_or_try_insert_with<K, V, E, F, Fut>(
        &self,
        key: &K,
        loader: F,
    ) -> std::result::Result<V, E>
    where
        K: Serialize + ?Sized,
        V: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = loader().await?;
        self.put(key, &value).await?;
        Ok(value)
    }

    async fn delete_fields(&self) -> Result<usize> {
        let fields = self.write.hash_fields(&self.bucket_key).await?;
        for field in &fields {
            self.write.hash_delete(&self.bucket_key, field).await?;
        }
        Ok(fields.len())
    }

    /// Poll the lock marker until it is gone.
    ///
    /// Returns whether a marker was seen at all.
    async fn wait_for_lock(&self, store: &dyn HashStore) -> Result<bool> {
        let started = Instant::now();
        let mut found_lock = false;

        while store.exists(&self.lock_key).await? {
            if !found_lock {
                debug!(region = %self.name, "Clear in progress, waiting for lock");
                found_lock = true;
            }

            if let Some(limit) = self.lock_wait_timeout
                && started.elapsed() >= limit
            {
                return Err(CacheError::LockWaitTimeout {
                    region: self.name.to_string(),
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep(self.lock_poll_interval).await;
        }

        Ok(found_lock)
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("bucket_key", &String::from_utf8_lossy(&self.bucket_key))
            .field("expiration", &self.expiration)
            .field("backend", &self.write.backend_type())
            .finish()
    }
}

/// Lock marker set by a running clear.
///
/// Released explicitly once the clear's work is done. If the clear future
/// is dropped first, the deletion is handed to the current runtime instead.
struct LockMarker {
    store: Arc<dyn HashStore>,
    key: Vec<u8>,
    armed: bool,
}

impl LockMarker {
    fn new(store: Arc<dyn HashStore>, key: Vec<u8>) -> Self {
        Self {
            store,
            key,
            armed: true,
        }
    }

    async fn release(mut self) -> StoreResult<()> {
        let result = self.store.delete(&self.key).await;
        self.armed = false;
        result
    }
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                key = %String::from_utf8_lossy(&self.key),
                "Lock marker dropped outside a runtime, left in store"
            );
            return;
        };

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            if let Err(e) = store.delete(&key).await {
                warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Failed to release abandoned lock marker"
                );
            }
        });
    }
}
