use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cutoff {
    revoked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Process-local map of subject -> most recent bulk revocation.
///
/// A credential for the subject issued before the cutoff is revoked. Like
/// [`RevocationCache`](super::RevocationCache) a miss is not a negative answer.
#[derive(Debug, Clone, Default)]
pub struct SubjectCutoffs {
    entries: Arc<RwLock<HashMap<String, Cutoff>>>,
}

impl SubjectCutoffs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a bulk revocation. An older cutoff never replaces a newer one.
    pub async fn record(
        &self,
        subject: impl Into<String>,
        revoked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) {
        let mut entries = self.entries.write().await;
        let incoming = Cutoff {
            revoked_at,
            expires_at,
        };
        entries
            .entry(subject.into())
            .and_modify(|current| {
                if incoming.revoked_at >= current.revoked_at {
                    *current = incoming;
                }
            })
            .or_insert(incoming);
    }

    /// Returns the live cutoff for `subject`, if any
    pub async fn get(&self, subject: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .await
            .get(subject)
            .filter(|cutoff| cutoff.expires_at > now)
            .map(|cutoff| cutoff.revoked_at)
    }

    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cutoff| cutoff.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
