//! Redis store wrapper.

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisError};
use async_trait::async_trait;
use tracing::info;

use super::{HashStore, MAX_EXPIRE_SECS, StoreCommand, StoreError, StoreResult, Transaction};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.code() == Some("WRONGTYPE") {
            StoreError::WrongType
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// EXPIRE argument for `seconds`. Redis rejects a whole MULTI/EXEC reply
/// on an out-of-range expire after earlier commands already ran, so the value
/// is capped here.
fn expire_seconds(seconds: u64) -> i64 {
    // MAX_EXPIRE_SECS fits in i64
    seconds.min(MAX_EXPIRE_SECS) as i64
}

/// [`HashStore`] backed by Redis.
///
/// Cloning is cheap; every clone shares the same multiplexed connection,
/// which reconnects on its own after a dropped socket.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis with the given URL.
    ///
    /// # Arguments
    /// * `url` - Redis connection string, e.g. `redis://localhost:6379/0`
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the server does not answer PING.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let mut conn = ConnectionManager::new(client.clone()).await?;

        // Ping the server to verify connection
        ::redis::cmd("PING").query_async::<String>(&mut conn).await?;

        info!("Successfully connected to Redis");

        Ok(Self { client, conn })
    }

    /// Get a reference to the underlying Redis client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .finish()
    }
}

#[async_trait]
impl HashStore for RedisStore {
    async fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.conn().exists::<_, bool>(key).await?)
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        Ok(self.conn().set::<_, _, ()>(key, value).await?)
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        Ok(self.conn().del::<_, ()>(key).await?)
    }

    async fn hash_get(&self, bucket: &[u8], field: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .conn()
            .hget::<_, _, Option<Vec<u8>>>(bucket, field)
            .await?)
    }

    async fn hash_set(&self, bucket: &[u8], field: &[u8], value: &[u8]) -> StoreResult<()> {
        Ok(self.conn().hset::<_, _, _, ()>(bucket, field, value).await?)
    }

    async fn hash_delete(&self, bucket: &[u8], field: &[u8]) -> StoreResult<()> {
        Ok(self.conn().hdel::<_, _, ()>(bucket, field).await?)
    }

    async fn hash_fields(&self, bucket: &[u8]) -> StoreResult<Vec<Vec<u8>>> {
        Ok(self.conn().hkeys::<_, Vec<Vec<u8>>>(bucket).await?)
    }

    async fn expire(&self, key: &[u8], seconds: u64) -> StoreResult<()> {
        Ok(self.conn().expire::<_, ()>(key, expire_seconds(seconds)).await?)
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        // MULTI ... EXEC
        let mut pipe = ::redis::pipe();
        pipe.atomic();

        for command in tx.commands() {
            match command {
                StoreCommand::HashSet { bucket, field, value } => {
                    pipe.hset(bucket.as_slice(), field.as_slice(), value.as_slice())
                        .ignore();
                }
                StoreCommand::Expire { bucket, seconds } => {
                    pipe.expire(bucket.as_slice(), expire_seconds(*seconds))
                        .ignore();
                }
            }
        }

        pipe.query_async::<()>(&mut self.conn()).await?;
        Ok(())
    }

    fn backend_type(&self) -> &str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_seconds_capped() {
        assert_eq!(expire_seconds(600), 600);
        assert_eq!(expire_seconds(MAX_EXPIRE_SECS), MAX_EXPIRE_SECS as i64);
        assert_eq!(expire_seconds(u64::MAX), MAX_EXPIRE_SECS as i64);
    }
}
