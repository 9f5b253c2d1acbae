use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::store::{ExpiredRecordPurger, RevocationStore, StoreError};
use crate::models::RevocationRecord;

/// In-memory [`RevocationStore`] for tests and local runs.
///
/// Counts calls per operation and can be switched into a failing or slow mode
/// to exercise the registry's degraded paths.
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    records: Mutex<HashMap<String, RevocationRecord>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    inserts: AtomicUsize,
    lookups: AtomicUsize,
    listings: AtomicUsize,
    subject_lookups: AtomicUsize,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a record directly, bypassing any registry cache
    pub async fn seed(&self, record: RevocationRecord) {
        self.records.lock().await.insert(record.id.clone(), record);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every operation sleep before answering
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn subject_lookup_calls(&self) -> usize {
        self.subject_lookups.load(Ordering::SeqCst)
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store switched to failing".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn insert(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        self.enter(&self.inserts).await?;
        self.records
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_non_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        self.enter(&self.lookups).await?;
        Ok(self
            .records
            .lock()
            .await
            .get(id)
            .filter(|record| record.is_live(now))
            .cloned())
    }

    async fn list_non_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RevocationRecord>, StoreError> {
        self.enter(&self.listings).await?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|record| record.is_live(now))
            .cloned()
            .collect())
    }

    async fn latest_for_subject(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        self.enter(&self.subject_lookups).await?;
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|record| {
                record.subject == subject && record.is_subject_revocation() && record.is_live(now)
            })
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store switched to failing".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ExpiredRecordPurger for MemoryRevocationStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store switched to failing".to_string(),
            ));
        }
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| record.is_live(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_expired_records_are_hidden() {
        let store = MemoryRevocationStore::new();
        let now = Utc::now();

        store
            .seed(RevocationRecord::new("live", "a@example.com", now + ChronoDuration::hours(1), now))
            .await;
        store
            .seed(RevocationRecord::new("dead", "a@example.com", now - ChronoDuration::hours(1), now))
            .await;

        assert!(store.find_non_expired("live", now).await.unwrap().is_some());
        assert!(store.find_non_expired("dead", now).await.unwrap().is_none());
        assert_eq!(store.list_non_expired(now).await.unwrap().len(), 1);
        assert_eq!(store.lookup_calls(), 2);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_latest_for_subject_picks_newest_bulk_record() {
        let store = MemoryRevocationStore::new();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::days(7);

        let older = RevocationRecord::for_subject("a@example.com", expires_at, now - ChronoDuration::hours(2));
        let newer = RevocationRecord::for_subject("a@example.com", expires_at, now - ChronoDuration::hours(1));
        store.seed(older).await;
        store.seed(newer.clone()).await;
        store
            .seed(RevocationRecord::new("jti-1", "a@example.com", expires_at, now))
            .await;

        let latest = store.latest_for_subject("a@example.com", now).await.unwrap();

        assert_eq!(latest, Some(newer));
        assert!(store.latest_for_subject("b@example.com", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let store = MemoryRevocationStore::new();
        store.set_failing(true);

        let record = RevocationRecord::new("jti-1", "a@example.com", Utc::now(), Utc::now());

        assert!(matches!(
            store.insert(&record).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.health_check().await.is_err());
        assert!(store.is_empty().await);
        assert_eq!(store.insert_calls(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryRevocationStore::new();
        let now = Utc::now();

        store
            .seed(RevocationRecord::new("live", "a@example.com", now + ChronoDuration::hours(1), now))
            .await;
        store
            .seed(RevocationRecord::new("dead", "a@example.com", now - ChronoDuration::hours(1), now))
            .await;

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.purge_expired(now).await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }
}
