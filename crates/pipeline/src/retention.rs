//! Periodic eviction of finalized batches.
//!
//! Runs on the registry's [`RetentionPolicy::sweep_interval`] and drops
//! batches that finalized more than [`RetentionPolicy::grace`] ago.
//!
//! [`RetentionPolicy::sweep_interval`]: crate::registry::RetentionPolicy::sweep_interval
//! [`RetentionPolicy::grace`]: crate::registry::RetentionPolicy::grace

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

/// Run the retention sweep loop until `cancel` is triggered.
pub async fn run(registry: Arc<Registry>, cancel: CancellationToken) {
    let policy = registry.retention().clone();
    if policy.sweep_interval.is_zero() {
        tracing::error!("Batch retention disabled: sweep interval is zero");
        return;
    }

    tracing::info!(
        grace_secs = policy.grace.as_secs(),
        interval_secs = policy.sweep_interval.as_secs(),
        "Batch retention job started"
    );

    let mut interval = tokio::time::interval(policy.sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Batch retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = registry.evict_expired(Utc::now()).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Batch retention: evicted finalized batches");
                } else {
                    tracing::debug!("Batch retention: nothing to evict");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{Batch, Job, Outcome};
    use crate::reconciler::Reconciler;
    use crate::registry::RetentionPolicy;
    use crate::testing::RecordingArchive;

    #[tokio::test]
    async fn sweep_evicts_finalized_batches() {
        let registry = Arc::new(Registry::new(RetentionPolicy {
            grace: Duration::ZERO,
            sweep_interval: Duration::from_millis(5),
        }));
        let batch = Batch::new(
            uuid::Uuid::new_v4(),
            "rec-1".into(),
            "p".into(),
            "512x512".into(),
            1,
            Utc::now(),
        );
        let batch_id = batch.id;
        registry.create_batch(batch).await.unwrap();
        registry
            .create_job(Job::new("a".into(), batch_id, 0, Utc::now()))
            .await
            .unwrap();
        let reconciler = Reconciler::new(registry.clone(), Arc::new(RecordingArchive::default()));
        reconciler
            .report_outcome("a", Outcome::Completed { outputs: vec!["u".into()] })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(registry.clone(), cancel.clone()));

        for _ in 0..100 {
            if registry.batch_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(registry.batch_count().await, 0);
        assert_eq!(registry.job_count().await, 0);
    }

    #[tokio::test]
    async fn zero_interval_returns_instead_of_panicking() {
        let registry = Arc::new(Registry::new(RetentionPolicy {
            grace: Duration::ZERO,
            sweep_interval: Duration::ZERO,
        }));
        let task = tokio::spawn(run(registry, CancellationToken::new()));
        assert!(task.await.is_ok());
    }
}
