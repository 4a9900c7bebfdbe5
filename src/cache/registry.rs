//! Cache registry - Central management for all regions.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use super::{CacheConfig, DefaultRegionPrefix, Region, RegionPrefix, Result};
use crate::store::HashStore;

/// Central registry handing out [`Region`]s by name.
///
/// Regions are created on first lookup and reused afterwards. Configuration
/// setters are meant to be called before the first lookup; regions already
/// created keep the settings they were built with.
///
/// ## Example
///
/// ```rust,ignore
/// let registry = CacheRegistry::new(Arc::new(MemoryStore::new()));
///
/// let users = registry.region("users")?;
/// users.put(&user_id, &user).await?;
/// let user: Option<User> = users.get(&user_id).await?;
/// ```
pub struct CacheRegistry {
    regions: DashMap<String, Arc<Region>>,
    read: Arc<dyn HashStore>,
    write: Arc<dyn HashStore>,
    config: CacheConfig,
    prefix: Arc<dyn RegionPrefix>,
}

impl CacheRegistry {
    /// Create a registry that reads and writes through one store.
    pub fn new(store: Arc<dyn HashStore>) -> Self {
        Self::with_read_write(Arc::clone(&store), store)
    }

    /// Create a registry with separate read and write stores, e.g. a replica
    /// for reads and the primary for writes.
    pub fn with_read_write(read: Arc<dyn HashStore>, write: Arc<dyn HashStore>) -> Self {
        info!(
            read = read.backend_type(),
            write = write.backend_type(),
            "Cache registry initialized"
        );
        Self {
            regions: DashMap::new(),
            read,
            write,
            config: CacheConfig::default(),
            prefix: Arc::new(DefaultRegionPrefix::default()),
        }
    }

    /// Replace the whole configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the region for `name`, creating it on first use.
    ///
    /// Concurrent first lookups may each build a region; one of them is
    /// kept and returned to every caller.
    ///
    /// # Errors
    /// Returns `InvalidRegionName` if `name` is blank or ends in the lock
    /// marker suffix.
    pub fn region(&self, name: &str) -> Result<Arc<Region>> {
        if let Some(region) = self.regions.get(name) {
            return Ok(Arc::clone(region.value()));
        }

        let expiration = self.config.expiration_for(name);
        let bucket_key = self.config.use_prefix.then(|| self.prefix.prefix(name));

        let region = Region::new(
            name,
            bucket_key,
            Arc::clone(&self.read),
            Arc::clone(&self.write),
            expiration,
        )?
        .with_lock_polling(self.config.lock_poll_interval, self.config.lock_wait_timeout);

        debug!(region = name, expiration, "Creating cache region");

        let entry = self
            .regions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(region));
        Ok(Arc::clone(entry.value()))
    }

    /// Names of every region looked up so far.
    pub fn region_names(&self) -> BTreeSet<String> {
        self.regions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Check if a region has been created.
    pub fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    /// Get the number of created regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn set_use_prefix(&mut self, use_prefix: bool) {
        self.config.use_prefix = use_prefix;
    }

    /// Set the function turning region names into bucket keys.
    /// Only used when prefixing is enabled.
    pub fn set_prefix(&mut self, prefix: impl RegionPrefix + 'static) {
        self.prefix = Arc::new(prefix);
    }

    /// Set the default bucket time-to-live in seconds (`0` = never expire).
    pub fn set_default_expiration(&mut self, seconds: u64) {
        self.config.default_expiration = seconds;
    }

    /// Replace all per-region expiration overrides.
    pub fn set_expirations(&mut self, expirations: HashMap<String, u64>) {
        self.config.expirations = expirations;
    }

    pub fn set_lock_poll_interval(&mut self, interval: Duration) {
        self.config.lock_poll_interval = interval;
    }

    pub fn set_lock_wait_timeout(&mut self, timeout: Option<Duration>) {
        self.config.lock_wait_timeout = timeout;
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("region_count", &self.regions.len())
            .field("region_names", &self.region_names())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::store::MemoryStore;

    fn registry() -> (Arc<MemoryStore>, CacheRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = CacheRegistry::new(store.clone());
        (store, registry)
    }

    #[test]
    fn test_region_is_created_once() {
        let (_, registry) = registry();
        assert!(registry.is_empty());

        let first = registry.region("users").unwrap();
        let second = registry.region("users").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("users"));
    }

    #[test]
    fn test_region_names_reflect_lookups() {
        let (_, registry) = registry();
        registry.region("b").unwrap();
        registry.region("a").unwrap();
        registry.region("a").unwrap();

        let names: Vec<_> = registry.region_names().into_iter().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let (_, registry) = registry();
        assert!(matches!(registry.region(""), Err(CacheError::InvalidRegionName(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lock_suffixed_name_rejected() {
        let (_, registry) = registry();
        registry.region("users").unwrap();

        assert!(matches!(
            registry.region("users~lock"),
            Err(CacheError::InvalidRegionName(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_default_expiration() {
        let store = Arc::new(MemoryStore::new());
        let registry = CacheRegistry::new(store.clone())
            .with_config(CacheConfig::default().default_expiration(u64::MAX));
        let region = registry.region("forever").unwrap();

        region.put("k", "v").await.unwrap();

        assert_eq!(region.get::<_, String>("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.ttl(b"forever").is_some());
    }

    #[test]
    fn test_expiration_overrides() {
        let (_, mut registry) = registry();
        registry.set_default_expiration(30);
        registry.set_expirations(HashMap::from([("sessions".to_string(), 0)]));

        assert_eq!(registry.region("sessions").unwrap().expiration(), 0);
        assert_eq!(registry.region("users").unwrap().expiration(), 30);
    }

    #[test]
    fn test_default_expiration_is_ten_minutes() {
        let (_, registry) = registry();
        assert_eq!(registry.region("users").unwrap().expiration(), 600);
    }

    #[test]
    fn test_prefixing() {
        let (_, mut registry) = registry();
        registry.set_use_prefix(true);
        assert_eq!(registry.region("users").unwrap().bucket_key(), b"users:");

        registry.set_prefix(|name: &str| format!("app/{name}").into_bytes());
        let groups = registry.region("groups").unwrap();
        assert_eq!(groups.bucket_key(), b"app/groups");
        assert_eq!(groups.lock_key(), b"groups~lock");
    }

    #[test]
    fn test_prefix_function_ignored_when_disabled() {
        let (_, mut registry) = registry();
        registry.set_prefix(|name: &str| format!("app/{name}").into_bytes());
        assert_eq!(registry.region("users").unwrap().bucket_key(), b"users");
    }

    #[tokio::test]
    async fn test_read_write_split() {
        let primary = Arc::new(MemoryStore::new());
        let replica = Arc::new(MemoryStore::new());
        let registry = CacheRegistry::with_read_write(replica.clone(), primary.clone());
        let users = registry.region("users").unwrap();

        users.put("k", "v").await.unwrap();

        assert!(primary.exists(b"users").await.unwrap());
        assert!(!replica.exists(b"users").await.unwrap());
        // Reads go to the replica, which has not seen the write
        assert_eq!(users.get::<_, String>("k").await.unwrap(), None);
    }

    #[test]
    fn test_concurrent_first_lookups_agree() {
        let (_, registry) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.region("shared").unwrap())
            })
            .collect();
        let regions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        let kept = registry.region("shared").unwrap();
        assert!(regions.iter().all(|region| Arc::ptr_eq(region, &kept)));
    }
}
