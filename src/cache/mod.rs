//! Cache module - Region-partitioned caching over a hash store.
//!
//! Every region owns one hash bucket in the store, so equal keys in
//! different regions never collide.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - Central registry creating and holding regions by name
//! - `Region` - One named cache: get/put/evict/clear against its bucket
//! - `CacheConfig` - Expirations, key prefixing and lock polling
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = CacheRegistry::new(store).with_config(CacheConfig::default());
//!
//! let users = registry.region("users")?;
//! users.put(&user_id, &user).await?;
//! let user: Option<User> = users.get(&user_id).await?;
//! ```

mod config;
mod error;
mod prefix;
mod region;
mod registry;

pub use config::{CacheConfig, DEFAULT_EXPIRATION_SECS, DEFAULT_LOCK_POLL_INTERVAL};
pub use error::{CacheError, Result};
pub use prefix::{DefaultRegionPrefix, RegionPrefix};
pub use region::{LOCK_SUFFIX, Region};
pub use registry::CacheRegistry;
