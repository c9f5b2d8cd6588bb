use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Key/value store with TTLs, also used for named locks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns `true` when the key was absent and has been written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Extends the TTL only while `owner` still holds the key.
    async fn refresh_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Deletes the key only while `owner` still holds it.
    async fn delete_if_owner(&self, key: &str, owner: &str) -> Result<bool, CacheError>;
}
