/// Key-value cache used by the session store
///
/// Only the handful of commands the session store needs: string values with a
/// TTL, sets with a TTL, and deletes. Expiry is enforced by the cache itself.

mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use self::memory::InMemoryCache;
pub use self::redis_cache::RedisCache;

#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete keys; absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Add `member` to the set at `key` and reset the set's TTL.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
