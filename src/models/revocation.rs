use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Prefix of synthetic ids written by bulk (per-subject) revocations
pub const SUBJECT_REVOCATION_PREFIX: &str = "subject:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RevocationRecord {
    pub id: String,
    pub subject: String, // user email or id, for audit and bulk revocation
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RevocationRecord {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            expires_at,
            created_at,
        }
    }

    /// Builds the synthetic record for "revoke everything issued to `subject` before `now`".
    ///
    /// `created_at` is the cutoff and is truncated to whole seconds to line up
    /// with second-precision `iat` claims.
    pub fn for_subject(subject: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let id = format!("{}{}:{}", SUBJECT_REVOCATION_PREFIX, subject, Uuid::new_v4());
        Self::new(id, subject, expires_at, now.trunc_subsecs(0))
    }

    /// True if `id` uses the prefix reserved for synthetic subject records
    pub fn is_reserved_id(id: &str) -> bool {
        id.starts_with(SUBJECT_REVOCATION_PREFIX)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_subject_revocation(&self) -> bool {
        Self::is_reserved_id(&self.id)
    }

    /// Inserts the record. A repeated id overwrites the previous row.
    pub async fn insert(pool: &PgPool, record: &Self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (id, subject, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET subject = EXCLUDED.subject,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.subject)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Finds a record by id that has not expired yet
    pub async fn find_non_expired(
        pool: &PgPool,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, subject, expires_at, created_at
            FROM revoked_tokens
            WHERE id = $1 AND expires_at > $2
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Lists every record that has not expired yet
    pub async fn list_non_expired(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let records = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, subject, expires_at, created_at
            FROM revoked_tokens
            WHERE expires_at > $1
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Finds the newest live bulk revocation for a subject
    pub async fn latest_for_subject(
        pool: &PgPool,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, subject, expires_at, created_at
            FROM revoked_tokens
            WHERE subject = $1 AND id LIKE $2 AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(subject)
        .bind(format!("{}%", SUBJECT_REVOCATION_PREFIX))
        .bind(now)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Deletes expired rows, returning how many were removed
    pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM revoked_tokens WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
