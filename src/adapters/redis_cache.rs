//! Redis implementation of CacheStore. Lock ownership checks run as Lua
//! scripts so the compare and the write happen atomically on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::ports::CacheStore;

const REFRESH_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const DELETE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisCache {
    redis_client: redis::Client,
    prefix: String,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            prefix: String::new(),
        })
    }

    /// Namespaces every key, e.g. `pix-saga:` when the instance is shared.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.redis_client.get_multiplexed_async_connection().await?)
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        // SET NX replies nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(self.key(key)).await?;
        Ok(())
    }

    async fn refresh_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let refreshed: i64 = redis::Script::new(REFRESH_IF_OWNER)
            .key(self.key(key))
            .arg(owner)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(refreshed == 1)
    }

    async fn delete_if_owner(&self, key: &str, owner: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = redis::Script::new(DELETE_IF_OWNER)
            .key(self.key(key))
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}
