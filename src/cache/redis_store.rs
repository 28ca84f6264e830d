//! Redis backend over a multiplexed connection manager.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use tracing::info;

use super::store::{KeyValueStore, StoreError};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Open a connection; `rediss://` URLs negotiate TLS.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|err| command_error("CONNECT", err))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|err| command_error("CONNECT", err))?;

        info!(target = "cachegate::cache::redis", "connected to redis");

        Ok(Self { conn })
    }
}

fn command_error(command: &'static str, err: RedisError) -> StoreError {
    StoreError::command(command, err.to_string())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|err| command_error("GET", err))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, seconds)
            .await
            .map_err(|err| command_error("SET", err))?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys.to_vec())
            .await
            .map_err(|err| command_error("DEL", err))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.keys(pattern)
            .await
            .map_err(|err| command_error("KEYS", err))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let seconds: i64 = conn
            .ttl(key)
            .await
            .map_err(|err| command_error("TTL", err))?;
        // -2: missing key, -1: no expiry.
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    async fn info(&self) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO")
            .query_async(&mut conn)
            .await
            .map_err(|err| command_error("INFO", err))?;
        Ok(info)
    }
}
