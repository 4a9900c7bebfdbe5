//! Store connection layer.
//!
//! Regions never talk to a backend directly; they go through [`HashStore`],
//! an abstract key-value service with native hash buckets and an atomic
//! transaction envelope.
//!
//! ## Backends
//!
//! - [`RedisStore`] - Redis over an auto-reconnecting connection manager
//! - [`MemoryStore`] - in-process store with the same semantics

mod memory;
mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors raised by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The connection to the store could not be established or was lost.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed to execute a command.
    #[error("store command error: {0}")]
    Command(String),

    /// A hash command was issued against a non-hash key, or vice versa.
    #[error("WRONGTYPE operation against a key holding the wrong kind of value")]
    WrongType,
}

/// Longest time-to-live a backend applies, 100 years. Longer expirations
/// are capped to this.
pub const MAX_EXPIRE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A command queued inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    HashSet {
        bucket: Vec<u8>,
        field: Vec<u8>,
        value: Vec<u8>,
    },
    Expire {
        bucket: Vec<u8>,
        seconds: u64,
    },
}

/// Ordered queue of commands applied as one atomic unit by [`HashStore::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    commands: Vec<StoreCommand>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a hash field write.
    pub fn hash_set(&mut self, bucket: &[u8], field: &[u8], value: &[u8]) -> &mut Self {
        self.commands.push(StoreCommand::HashSet {
            bucket: bucket.to_vec(),
            field: field.to_vec(),
            value: value.to_vec(),
        });
        self
    }

    /// Queue a time-to-live update for a whole key.
    pub fn expire(&mut self, bucket: &[u8], seconds: u64) -> &mut Self {
        self.commands.push(StoreCommand::Expire {
            bucket: bucket.to_vec(),
            seconds,
        });
        self
    }

    pub fn commands(&self) -> &[StoreCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_commands(self) -> Vec<StoreCommand> {
        self.commands
    }
}

/// Remote hash-capable key-value service.
///
/// Every method is a single store round-trip. Implementations must be safe
/// to share between tasks; coordination between callers happens only
/// through the data these commands touch.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Check whether a key exists.
    async fn exists(&self, key: &[u8]) -> StoreResult<bool>;

    /// Set a plain key to a value.
    async fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Delete a key of any kind. Deleting a missing key is not an error.
    async fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Read one field of a hash bucket.
    async fn hash_get(&self, bucket: &[u8], field: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Write one field of a hash bucket.
    async fn hash_set(&self, bucket: &[u8], field: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove one field of a hash bucket. Removing a missing field is not an error.
    async fn hash_delete(&self, bucket: &[u8], field: &[u8]) -> StoreResult<()>;

    /// List every field name currently in a hash bucket.
    async fn hash_fields(&self, bucket: &[u8]) -> StoreResult<Vec<Vec<u8>>>;

    /// Set a key's time-to-live in seconds.
    async fn expire(&self, key: &[u8], seconds: u64) -> StoreResult<()>;

    /// Apply every queued command atomically.
    async fn commit(&self, tx: Transaction) -> StoreResult<()>;

    /// Backend identifier for logging.
    fn backend_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_keeps_queue_order() {
        let mut tx = Transaction::new();
        tx.hash_set(b"bucket", b"field", b"value").expire(b"bucket", 60);

        assert_eq!(
            tx.commands(),
            &[
                StoreCommand::HashSet {
                    bucket: b"bucket".to_vec(),
                    field: b"field".to_vec(),
                    value: b"value".to_vec(),
                },
                StoreCommand::Expire {
                    bucket: b"bucket".to_vec(),
                    seconds: 60,
                },
            ]
        );
    }

    #[test]
    fn test_empty_transaction() {
        assert!(Transaction::new().is_empty());
    }
}
