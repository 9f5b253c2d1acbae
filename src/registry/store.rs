use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::RevocationRecord;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable side of the registry.
///
/// Every method is a single atomic operation against the backing store.
/// Expired records must never be returned; removing them is the store's own
/// business (see [`ExpiredRecordPurger`]).
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Writes a record. A repeated id overwrites the previous one.
    async fn insert(&self, record: &RevocationRecord) -> Result<(), StoreError>;

    async fn find_non_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError>;

    async fn list_non_expired(&self, now: DateTime<Utc>)
        -> Result<Vec<RevocationRecord>, StoreError>;

    /// Newest live bulk revocation written for `subject`
    async fn latest_for_subject(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Stores without native TTL expose their purge here so it can be scheduled
#[async_trait]
pub trait ExpiredRecordPurger: Send + Sync {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Postgres-backed store over the `revoked_tokens` table
#[derive(Debug, Clone)]
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn insert(&self, record: &RevocationRecord) -> Result<(), StoreError> {
        RevocationRecord::insert(&self.pool, record).await?;
        Ok(())
    }

    async fn find_non_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        Ok(RevocationRecord::find_non_expired(&self.pool, id, now).await?)
    }

    async fn list_non_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RevocationRecord>, StoreError> {
        Ok(RevocationRecord::list_non_expired(&self.pool, now).await?)
    }

    async fn latest_for_subject(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RevocationRecord>, StoreError> {
        Ok(RevocationRecord::latest_for_subject(&self.pool, subject, now).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ExpiredRecordPurger for PgRevocationStore {
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(RevocationRecord::purge_expired(&self.pool, now).await?)
    }
}
