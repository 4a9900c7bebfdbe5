//! Configuration module.
//!
//! Loads store and cache configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheError, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Redis
    pub redis_url: String,

    /// Optional replica used for reads. Reads go to `redis_url` when unset.
    pub redis_read_url: Option<String>,

    // Regions
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `REDIS_URL` | primary store, required |
    /// | `REDIS_READ_URL` | read replica |
    /// | `CACHE_DEFAULT_EXPIRATION` | bucket TTL in seconds, `0` = never |
    /// | `CACHE_EXPIRES` | per-region TTLs, `users=3600,sessions=0` |
    /// | `CACHE_USE_PREFIX` | `true`/`false` |
    /// | `CACHE_LOCK_POLL_MS` | lock poll interval |
    /// | `CACHE_LOCK_WAIT_TIMEOUT_MS` | bound on lock waits |
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let redis_url = var("REDIS_URL")
            .ok_or_else(|| CacheError::InvalidConfig("REDIS_URL must be set".to_string()))?;

        let mut cache = CacheConfig::default();

        if let Some(raw) = var("CACHE_DEFAULT_EXPIRATION") {
            cache.default_expiration = parse("CACHE_DEFAULT_EXPIRATION", &raw)?;
        }

        if let Some(raw) = var("CACHE_EXPIRES") {
            cache.expirations = parse_expirations(&raw)?;
        }

        if let Some(raw) = var("CACHE_USE_PREFIX") {
            cache.use_prefix = parse("CACHE_USE_PREFIX", &raw.to_lowercase())?;
        }

        if let Some(raw) = var("CACHE_LOCK_POLL_MS") {
            cache.lock_poll_interval = Duration::from_millis(parse("CACHE_LOCK_POLL_MS", &raw)?);
        }

        if let Some(raw) = var("CACHE_LOCK_WAIT_TIMEOUT_MS") {
            cache.lock_wait_timeout = Some(Duration::from_millis(parse(
                "CACHE_LOCK_WAIT_TIMEOUT_MS",
                &raw,
            )?));
        }

        Ok(Self {
            redis_url,
            redis_read_url: var("REDIS_READ_URL"),
            cache,
        })
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| CacheError::InvalidConfig(format!("{name}: cannot parse {raw:?}")))
}

/// Parse `name=seconds` pairs separated by commas.
fn parse_expirations(raw: &str) -> Result<HashMap<String, u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, seconds) = pair.split_once('=').ok_or_else(|| {
                CacheError::InvalidConfig(format!(
                    "CACHE_EXPIRES: expected name=seconds, got {pair:?}"
                ))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CacheError::InvalidConfig(format!(
                    "CACHE_EXPIRES: empty region name in {pair:?}"
                )));
            }
            Ok((name.to_string(), parse("CACHE_EXPIRES", seconds.trim())?))
        })
        .collect()
}
