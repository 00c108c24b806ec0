use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::SessionCache;
use crate::clock::Clock;
use crate::error::StoreError;

enum Value {
    Text(String),
    Set(HashSet<String>),
}

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Process-local cache with TTL expiry driven by a [`Clock`].
///
/// Reads drop the lapsed key they touch; writes sweep every lapsed key.
///
/// Mirrors the subset of Redis semantics the session store relies on. For
/// local development and tests.
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Remaining lifetime of `key`, if it exists
    pub async fn ttl(&self, key: &str) -> Option<chrono::Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        self.clock.now() + ttl
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
    if entries.get(key).map_or(false, |e| e.expires_at <= now) {
        entries.remove(key);
    }
}

/// Drop every lapsed entry, not just the one being touched.
fn sweep_expired(entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) {
    entries.retain(|_, e| e.expires_at > now);
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Corrupt(format!("{} holds the wrong kind of value", key))
}

#[async_trait]
impl SessionCache for InMemoryCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.lock().await;
        sweep_expired(&mut entries, self.clock.now());
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, self.clock.now());
        match entries.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Text(text), .. }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.lock().await;
        sweep_expired(&mut entries, self.clock.now());

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
                entry.expires_at = expires_at;
                Ok(())
            }
            Value::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, self.clock.now());

        let now_empty = match entries.get_mut(key) {
            None => return Ok(()),
            Some(Entry { value: Value::Set(members), .. }) => {
                members.remove(member);
                members.is_empty()
            }
            Some(_) => return Err(wrong_type(key)),
        };
        // Redis drops a set once its last member is removed
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, self.clock.now());
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::Set(members), .. }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
