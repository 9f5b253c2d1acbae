use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::registry::{ExpiredRecordPurger, StoreError};

/// Deletes expired revocation records from the durable store.
///
/// Expired records are already invisible to lookups, so a failed run only
/// delays reclaiming space.
pub async fn purge_expired_records(
    store: &dyn ExpiredRecordPurger,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let purged = store.purge_expired(now).await?;

    tracing::info!(purged, "Expired revocation records purged");

    Ok(purged)
}

/// Schedules [`purge_expired_records`] on a cron expression (six fields, seconds first).
///
/// The returned scheduler is already started; call `shutdown` on it when the
/// process exits.
pub async fn start_purge_scheduler(
    store: Arc<dyn ExpiredRecordPurger>,
    schedule: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let store = store.clone();
        Box::pin(async move {
            if let Err(e) = purge_expired_records(store.as_ref(), Utc::now()).await {
                tracing::error!(error = %e, "Failed to purge expired revocation records");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "Revocation purge job scheduled");

    Ok(scheduler)
}
