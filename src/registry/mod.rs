//! Token revocation registry.
//!
//! Answers "has this credential been revoked before its natural expiry" from a
//! process-local cache, falling back to the durable store on a miss. Revocations
//! are written to the durable store first and only then cached.

pub mod cache;
pub mod clock;
pub mod memory;
pub mod store;
pub mod subject;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub use cache::RevocationCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryRevocationStore;
pub use store::{ExpiredRecordPurger, PgRevocationStore, RevocationStore, StoreError};
pub use subject::SubjectCutoffs;
pub use worker::{CleanupWorker, SweepStats};

use crate::models::RevocationRecord;

/// What `is_revoked` answers when the durable fallback fails or times out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Treat the credential as not revoked. Keeps users signed in during a store outage.
    #[default]
    FailOpen,
    /// Treat the credential as revoked. Rejects every uncached check during a store outage.
    FailClosed,
}

impl FallbackPolicy {
    fn on_failure(self) -> bool {
        matches!(self, FallbackPolicy::FailClosed)
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPolicy::FailOpen => f.write_str("fail_open"),
            FallbackPolicy::FailClosed => f.write_str("fail_closed"),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_open" | "open" => Ok(FallbackPolicy::FailOpen),
            "fail_closed" | "closed" => Ok(FallbackPolicy::FailClosed),
            other => Err(format!("unknown fallback policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub warm_start_timeout: Duration,
    pub fallback_timeout: Duration,
    pub write_timeout: Duration,
    pub cleanup_interval: Duration,
    pub fallback_policy: FallbackPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warm_start_timeout: Duration::from_secs(30),
            fallback_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(60 * 60),
            fallback_policy: FallbackPolicy::FailOpen,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Revocation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Revocation store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Invalid credential id")]
    InvalidId,

    #[error("Invalid subject")]
    InvalidSubject,
}

/// A credential whose signature and claims were already verified upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCredential {
    pub jti: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
}

/// Two-tier revocation registry: local cache in front of a durable store.
///
/// Construct once at bootstrap and share through an `Arc`.
pub struct RevocationRegistry {
    cache: RevocationCache,
    cutoffs: SubjectCutoffs,
    store: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    worker: Mutex<Option<CleanupWorker>>,
}

impl RevocationRegistry {
    /// Builds the registry and warms its cache from the store
    pub async fn new(store: Arc<dyn RevocationStore>, config: RegistryConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        store: Arc<dyn RevocationStore>,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Self {
            cache: RevocationCache::new(),
            cutoffs: SubjectCutoffs::new(),
            store,
            clock,
            config,
            worker: Mutex::new(None),
        };

        // Not fatal: lookups fall back to the store until the cache fills up
        if let Err(e) = registry.warm_start().await {
            tracing::warn!(
                error = %e,
                "Failed to warm revocation cache, continuing with an empty cache"
            );
        }

        registry
    }

    /// Loads every live record from the store into the local maps.
    ///
    /// Returns the number of records loaded.
    pub async fn warm_start(&self) -> Result<usize, RegistryError> {
        let now = self.clock.now();
        let timeout = self.config.warm_start_timeout;

        let records = tokio::time::timeout(timeout, self.store.list_non_expired(now))
            .await
            .map_err(|_| RegistryError::Timeout(timeout))??;

        let total = records.len();
        let mut tokens = Vec::with_capacity(total);
        let mut subjects = 0;
        for record in records {
            if record.is_subject_revocation() {
                self.cutoffs
                    .record(record.subject, record.created_at, record.expires_at)
                    .await;
                subjects += 1;
            } else {
                tokens.push((record.id, record.expires_at));
            }
        }
        let tokens = self.cache.extend(tokens).await;

        tracing::info!(
            count = total,
            tokens,
            subjects,
            "Loaded revoked tokens into cache"
        );

        Ok(total)
    }

    /// Revokes a single credential until `expires_at`.
    ///
    /// The durable write must succeed before the revocation is acknowledged or
    /// cached. An `expires_at` already in the past is accepted and ignored.
    /// Ids using the subject-revocation prefix are rejected.
    pub async fn revoke(
        &self,
        id: &str,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        if id.trim().is_empty() || RevocationRecord::is_reserved_id(id) {
            return Err(RegistryError::InvalidId);
        }

        let now = self.clock.now();
        if expires_at <= now {
            tracing::debug!(jti = %id, %expires_at, "Skipping revocation of already expired token");
            return Ok(());
        }

        let record = RevocationRecord::new(id, subject, expires_at, now);
        self.write_durably(&record).await.map_err(|e| {
            tracing::error!(
                jti = %id,
                subject = %subject,
                error = %e,
                "Failed to revoke token in store"
            );
            e
        })?;

        self.cache.put(record.id, expires_at).await;

        tracing::info!(jti = %id, subject = %subject, "Token revoked");

        Ok(())
    }

    /// Returns true if `id` is revoked and not yet expired.
    ///
    /// A cache hit answers without I/O. A miss queries the store and caches a
    /// positive answer. Store failures resolve through the fallback policy.
    pub async fn is_revoked(&self, id: &str) -> bool {
        let now = self.clock.now();

        if let Some(expires_at) = self.cache.get(id).await {
            if expires_at > now {
                return true;
            }
            self.cache.remove_if_expired(id, now).await;
        }

        let timeout = self.config.fallback_timeout;
        match tokio::time::timeout(timeout, self.store.find_non_expired(id, now)).await {
            Ok(Ok(Some(record))) => {
                tracing::debug!(jti = %id, "Revoked token loaded into cache from store");
                self.cache.put(record.id, record.expires_at).await;
                true
            }
            Ok(Ok(None)) => false,
            Ok(Err(e)) => self.fallback_failed(id, RegistryError::Store(e)),
            Err(_) => self.fallback_failed(id, RegistryError::Timeout(timeout)),
        }
    }

    /// Revokes every credential issued to `subject` up to now.
    ///
    /// Writes a synthetic record keyed by a fresh id and returns that id.
    /// Credentials are matched by issue time in [`Self::is_credential_revoked`].
    pub async fn revoke_all_for_subject(
        &self,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        if subject.trim().is_empty() {
            return Err(RegistryError::InvalidSubject);
        }

        let now = self.clock.now();
        let record = RevocationRecord::for_subject(subject, expires_at, now);
        if expires_at <= now {
            tracing::debug!(subject = %subject, %expires_at, "Skipping already expired subject revocation");
            return Ok(record.id);
        }

        self.write_durably(&record).await.map_err(|e| {
            tracing::error!(subject = %subject, error = %e, "Failed to revoke subject tokens");
            e
        })?;

        self.cutoffs
            .record(subject, record.created_at, expires_at)
            .await;

        tracing::warn!(subject = %subject, "All tokens revoked for subject");

        Ok(record.id)
    }

    /// Full check for a verified credential: its own id, then its subject's
    /// bulk revocation cutoff.
    pub async fn is_credential_revoked(&self, credential: &VerifiedCredential) -> bool {
        if self.is_revoked(&credential.jti).await {
            return true;
        }
        self.is_subject_revoked_since(&credential.subject, credential.issued_at)
            .await
    }

    /// True if `subject` had a bulk revocation after `issued_at`
    pub async fn is_subject_revoked_since(&self, subject: &str, issued_at: DateTime<Utc>) -> bool {
        let now = self.clock.now();

        if let Some(cutoff) = self.cutoffs.get(subject, now).await {
            if issued_at < cutoff {
                return true;
            }
        }

        let timeout = self.config.fallback_timeout;
        match tokio::time::timeout(timeout, self.store.latest_for_subject(subject, now)).await {
            Ok(Ok(Some(record))) => {
                let revoked = issued_at < record.created_at;
                self.cutoffs
                    .record(record.subject, record.created_at, record.expires_at)
                    .await;
                revoked
            }
            Ok(Ok(None)) => false,
            Ok(Err(e)) => self.fallback_failed(subject, RegistryError::Store(e)),
            Err(_) => self.fallback_failed(subject, RegistryError::Timeout(timeout)),
        }
    }

    /// Runs one cleanup pass over the local maps
    pub async fn sweep(&self) -> SweepStats {
        worker::sweep(&self.cache, &self.cutoffs, self.clock.as_ref()).await
    }

    /// Starts the periodic cleanup worker. Calling it again while running is a no-op.
    pub fn start_cleanup_worker(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            tracing::debug!("Cleanup worker already running");
            return;
        }

        *worker = Some(CleanupWorker::spawn(
            self.cache.clone(),
            self.cutoffs.clone(),
            self.clock.clone(),
            self.config.cleanup_interval,
        ));
    }

    /// Stops the cleanup worker if it is running
    pub async fn stop_cleanup_worker(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop().await;
        }
    }

    pub fn is_cleanup_worker_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    pub async fn cached_tokens(&self) -> usize {
        self.cache.len().await
    }

    pub async fn cached_subjects(&self) -> usize {
        self.cutoffs.len().await
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.config.fallback_policy
    }

    pub async fn store_health(&self) -> Result<(), RegistryError> {
        let timeout = self.config.fallback_timeout;
        tokio::time::timeout(timeout, self.store.health_check())
            .await
            .map_err(|_| RegistryError::Timeout(timeout))??;
        Ok(())
    }

    async fn write_durably(&self, record: &RevocationRecord) -> Result<(), RegistryError> {
        let timeout = self.config.write_timeout;
        tokio::time::timeout(timeout, self.store.insert(record))
            .await
            .map_err(|_| RegistryError::Timeout(timeout))??;
        Ok(())
    }

    fn fallback_failed(&self, key: &str, error: RegistryError) -> bool {
        let policy = self.config.fallback_policy;
        let answer = policy.on_failure();
        tracing::warn!(
            key = %key,
            error = %error,
            fallback_policy = %policy,
            revoked = answer,
            "Revocation store fallback failed, answering by policy"
        );
        answer
    }
}
