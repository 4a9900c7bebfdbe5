//! Hashcache - Region-partitioned cache over a remote hash store
//!
//! Flat-keyspace caches let two named caches collide on the same key.
//! Here every named cache (region) owns one hash bucket in the store and
//! application keys are fields of that bucket.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `store` - Hash store abstraction with Redis and in-memory backends
//! - `cache` - Regions and the registry handing them out
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let registry = hashcache::connect(&config).await?;
//!
//! let users = registry.region("users")?;
//! let user: User = users
//!     .get_or_insert_with(&user_id, || load_user(user_id))
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod store;

use std::sync::Arc;

use tracing::info;

pub use cache::{CacheConfig, CacheError, CacheRegistry, Region, Result};
pub use config::Config;
pub use store::{HashStore, MemoryStore, RedisStore};

/// Connect to Redis and build a registry from `config`.
///
/// # Errors
/// Returns error if either Redis connection fails.
pub async fn connect(config: &Config) -> Result<CacheRegistry> {
    info!("Connecting to Redis...");
    let write: Arc<dyn HashStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    let read: Arc<dyn HashStore> = match &config.redis_read_url {
        Some(url) => {
            info!("Using separate Redis read connection");
            Arc::new(RedisStore::connect(url).await?)
        }
        None => Arc::clone(&write),
    };

    Ok(CacheRegistry::with_read_write(read, write).with_config(config.cache.clone()))
}
