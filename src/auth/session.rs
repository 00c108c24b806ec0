/// Session Store
///
/// Binds a live access token to its owning user in the cache:
/// - `session:<accessToken>` holds a JSON [`SessionRecord`] with the token's TTL
/// - `user-sessions:<userID>` holds the set of that user's access tokens and
///   outlives its members by a fixed margin
///
/// The per-user index is advisory. Deletes are two sequential cache calls, so
/// an index may briefly name a token whose record is already gone; bulk
/// revocation tolerates such entries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::SessionCache;
use crate::clock::Clock;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub fn session_key(access_token: &str) -> String {
    format!("session:{}", access_token)
}

pub fn user_sessions_key(user_id: Uuid) -> String {
    format!("user-sessions:{}", user_id)
}

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    clock: Arc<dyn Clock>,
    index_margin: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>, clock: Arc<dyn Clock>, index_margin: Duration) -> Self {
        Self {
            cache,
            clock,
            index_margin,
        }
    }

    pub async fn create(&self, user_id: Uuid, access_token: &str, ttl: Duration) -> Result<(), StoreError> {
        let record = SessionRecord {
            user_id,
            created_at: self.clock.now(),
        };
        let blob = serde_json::to_string(&record)?;

        self.cache
            .set_with_ttl(&session_key(access_token), &blob, ttl)
            .await?;
        self.cache
            .set_add(&user_sessions_key(user_id), access_token, ttl + self.index_margin)
            .await?;

        tracing::debug!(user_id = %user_id, "Session created");
        Ok(())
    }

    pub async fn get(&self, access_token: &str) -> Result<Option<SessionRecord>, StoreError> {
        match self.cache.get(&session_key(access_token)).await? {
            Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }

    /// Remove one session. Deleting an unknown token is not an error.
    pub async fn delete(&self, access_token: &str) -> Result<(), StoreError> {
        if let Some(record) = self.get(access_token).await? {
            self.cache
                .set_remove(&user_sessions_key(record.user_id), access_token)
                .await?;
        }
        self.cache.delete(&[session_key(access_token)]).await
    }

    /// Remove every session indexed for `user_id`, then the index itself.
    ///
    /// Returns the number of index entries processed, dangling ones included.
    pub async fn delete_all(&self, user_id: Uuid) -> Result<usize, StoreError> {
        let index_key = user_sessions_key(user_id);
        let tokens = self.cache.set_members(&index_key).await?;

        let mut keys: Vec<String> = tokens.iter().map(|t| session_key(t)).collect();
        keys.push(index_key);
        self.cache.delete(&keys).await?;

        tracing::info!(user_id = %user_id, sessions = tokens.len(), "All sessions revoked for user");
        Ok(tokens.len())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.cache.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::clock::ManualClock;

    const TTL: Duration = Duration::from_secs(900);
    const MARGIN: Duration = Duration::from_secs(3600);

    struct Fixture {
        store: SessionStore,
        cache: Arc<InMemoryCache>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(InMemoryCache::new(clock.clone()));
        let store = SessionStore::new(cache.clone(), clock.clone(), MARGIN);
        Fixture { store, cache, clock }
    }

    #[tokio::test]
    async fn create_then_get_returns_record() {
        let f = fixture();
        let user_id = Uuid::new_v4();

        f.store.create(user_id, "token-a", TTL).await.unwrap();
        let record = f.store.get("token-a").await.unwrap().expect("session stored");

        assert_eq!(record.user_id, user_id);
        assert_eq!(record.created_at, f.clock.now());
    }

    #[tokio::test]
    async fn record_is_json_under_session_key() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        f.store.create(user_id, "token-a", TTL).await.unwrap();

        let blob = f.cache.get("session:token-a").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();

        assert_eq!(value["user_id"], user_id.to_string());
        assert!(value.get("created_at").is_some());
    }

    #[tokio::test]
    async fn index_outlives_its_members() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        f.store.create(user_id, "token-a", TTL).await.unwrap();

        let session_ttl = f.cache.ttl("session:token-a").await.unwrap();
        let index_ttl = f.cache.ttl(&user_sessions_key(user_id)).await.unwrap();
        assert!(index_ttl > session_ttl);

        f.clock.advance(chrono::Duration::seconds(900));
        assert!(f.store.get("token-a").await.unwrap().is_none());
        assert!(f.cache.ttl(&user_sessions_key(user_id)).await.is_some());
    }

    #[tokio::test]
    async fn delete_removes_record_and_index_entry() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        f.store.create(user_id, "token-a", TTL).await.unwrap();
        f.store.create(user_id, "token-b", TTL).await.unwrap();

        f.store.delete("token-a").await.unwrap();

        assert!(f.store.get("token-a").await.unwrap().is_none());
        assert!(f.store.get("token-b").await.unwrap().is_some());
        let members = f.cache.set_members(&user_sessions_key(user_id)).await.unwrap();
        assert_eq!(members, vec!["token-b".to_string()]);
    }

    #[tokio::test]
    async fn delete_unknown_token_is_ok() {
        let f = fixture();
        assert!(f.store.delete("never-created").await.is_ok());
    }

    #[tokio::test]
    async fn delete_all_clears_every_session_of_user() {
        let f = fixture();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        f.store.create(alice, "a1", TTL).await.unwrap();
        f.store.create(alice, "a2", TTL).await.unwrap();
        f.store.create(bob, "b1", TTL).await.unwrap();

        assert_eq!(f.store.delete_all(alice).await.unwrap(), 2);

        assert!(f.store.get("a1").await.unwrap().is_none());
        assert!(f.store.get("a2").await.unwrap().is_none());
        assert!(f.store.get("b1").await.unwrap().is_some());
        assert!(f.cache.ttl(&user_sessions_key(alice)).await.is_none());
    }

    #[tokio::test]
    async fn delete_all_tolerates_dangling_index_entries() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        f.store.create(user_id, "live", TTL).await.unwrap();
        f.store.create(user_id, "dangling", TTL).await.unwrap();
        // Interrupted delete: blob gone, index entry left behind
        f.cache.delete(&[session_key("dangling")]).await.unwrap();

        assert_eq!(f.store.delete_all(user_id).await.unwrap(), 2);
        assert!(f.store.get("live").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_all_for_user_without_sessions() {
        let f = fixture();
        assert_eq!(f.store.delete_all(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let f = fixture();
        f.cache
            .set_with_ttl("session:broken", "not json", TTL)
            .await
            .unwrap();

        assert!(matches!(
            f.store.get("broken").await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
