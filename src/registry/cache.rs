use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local map of revoked credential id -> expiry.
///
/// Only a hit is meaningful. A miss says nothing about revocation status and
/// must be resolved against the durable store.
///
/// Cloning is cheap and yields a handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct RevocationCache {
    entries: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl RevocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(id).copied()
    }

    /// Inserts or overwrites an entry (last write wins)
    pub async fn put(&self, id: impl Into<String>, expires_at: DateTime<Utc>) {
        self.entries.write().await.insert(id.into(), expires_at);
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.entries.write().await.remove(id).is_some()
    }

    /// Removes `id` only if its stored expiry is still at or before `now`.
    ///
    /// The expiry is re-read under the write lock so a concurrent `put` with a
    /// fresh expiry is never discarded.
    pub async fn remove_if_expired(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            Some(expires_at) if *expires_at <= now => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Bulk insert under a single write lock. Returns the number of entries written.
    pub async fn extend<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (String, DateTime<Utc>)>,
    {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let mut written = 0;
        for (id, expires_at) in items {
            entries.insert(id, expires_at);
            written += 1;
        }
        tracing::trace!(before, after = entries.len(), "Cache extended");
        written
    }

    /// Drops every entry whose expiry is at or before `now`
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
