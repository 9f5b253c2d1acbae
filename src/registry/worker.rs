use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::cache::RevocationCache;
use super::clock::Clock;
use super::subject::SubjectCutoffs;

/// Shortest sweep period. `interval_at` panics on zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub evicted_tokens: usize,
    pub evicted_subjects: usize,
    pub remaining_tokens: usize,
}

/// Removes expired entries from both local maps.
///
/// Only bounds memory: lookups already ignore expired entries.
pub async fn sweep(cache: &RevocationCache, cutoffs: &SubjectCutoffs, clock: &dyn Clock) -> SweepStats {
    let now = clock.now();
    let evicted_tokens = cache.evict_expired(now).await;
    let evicted_subjects = cutoffs.evict_expired(now).await;

    SweepStats {
        evicted_tokens,
        evicted_subjects,
        remaining_tokens: cache.len().await,
    }
}

/// Handle to the periodic cache sweep task.
///
/// The task only touches the local maps, never the durable store.
pub struct CleanupWorker {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl CleanupWorker {
    /// Spawns the sweep loop. The first sweep runs one `period` after spawning.
    ///
    /// Periods shorter than one second are raised to one second.
    pub fn spawn(
        cache: RevocationCache,
        cutoffs: SubjectCutoffs,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        let period = period.max(MIN_PERIOD);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = period.as_secs(), "Cleanup worker started");

            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                    _ = timer.tick() => {
                        let stats = sweep(&cache, &cutoffs, clock.as_ref()).await;
                        tracing::debug!(?stats, "Revocation cache sweep completed");
                    }
                }
            }

            tracing::info!("Cleanup worker stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signals the loop to exit and waits for it
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Cleanup worker task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn test_sweep_removes_expired_and_is_idempotent() {
        let clock = ManualClock::new(Utc::now());
        let cache = RevocationCache::new();
        let cutoffs = SubjectCutoffs::new();
        let now = clock.now();

        cache.put("valid", now + ChronoDuration::hours(1)).await;
        cache.put("expired", now - ChronoDuration::hours(1)).await;
        cutoffs
            .record("a@example.com", now - ChronoDuration::days(2), now - ChronoDuration::days(1))
            .await;

        let first = sweep(&cache, &cutoffs, &clock).await;
        let second = sweep(&cache, &cutoffs, &clock).await;

        assert_eq!(
            first,
            SweepStats {
                evicted_tokens: 1,
                evicted_subjects: 1,
                remaining_tokens: 1,
            }
        );
        assert_eq!(second.evicted_tokens, 0);
        assert_eq!(second.evicted_subjects, 0);
        assert!(cache.get("expired").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_sweeps_on_interval_and_stops() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = RevocationCache::new();
        let cutoffs = SubjectCutoffs::new();
        let now = clock.now();

        cache.put("valid", now + ChronoDuration::hours(2)).await;
        cache.put("short-lived", now + ChronoDuration::minutes(30)).await;

        let worker = CleanupWorker::spawn(
            cache.clone(),
            cutoffs,
            clock.clone(),
            Duration::from_secs(3600),
        );

        // Entry expires but no tick has fired yet
        clock.advance(ChronoDuration::minutes(45));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cache.len().await, 2);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("valid").await.is_some());

        assert!(!worker.is_finished());
        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_raised_to_minimum() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = RevocationCache::new();
        let now = clock.now();

        cache.put("stale", now - ChronoDuration::seconds(1)).await;

        let worker = CleanupWorker::spawn(
            cache.clone(),
            SubjectCutoffs::new(),
            clock,
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!worker.is_finished());
        assert!(cache.is_empty().await);
        worker.stop().await;
    }
}
