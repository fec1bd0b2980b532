//! Background expiry sweep and query index compaction for the semantic cache

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::infrastructure::semantic_cache::SemanticCache;

/// Handle of a running sweep task
#[derive(Debug)]
pub struct MaintenanceTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MaintenanceTask {
    /// Spawn a sweep removing expired entries every `interval`
    ///
    /// Each sweep also compacts the query index, keeping `keep_versions`
    /// persisted versions. The first sweep runs one full interval after
    /// spawning.
    pub fn spawn(cache: Arc<SemanticCache>, interval: Duration, keep_versions: usize) -> Self {
        let token = CancellationToken::new();
        let child = token.child_token();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = interval.as_secs(), "Cache maintenance started");

            loop {
                tokio::select! {
                    _ = child.cancelled() => {
                        info!("Cache maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match cache.cleanup_expired().await {
                            Ok(removed) => debug!(removed = removed, "Cache sweep completed"),
                            Err(e) => error!(error = %e, "Cache sweep failed"),
                        }

                        match cache.compact(keep_versions).await {
                            Ok(report) => debug!(
                                orphans_removed = report.orphans_removed,
                                versions_removed = report.versions_removed,
                                "Query index compacted"
                            ),
                            Err(e) => error!(error = %e, "Query index compaction failed"),
                        }
                    }
                }
            }
        });

        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the sweep and wait for it to finish
    pub async fn stop(self) {
        self.token.cancel();

        if let Err(e) = self.handle.await {
            error!(error = %e, "Cache maintenance task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::semantic_cache::{CacheSettings, ManualClock};
    use crate::infrastructure::embedding::HashingEmbeddingProvider;
    use crate::infrastructure::vector_index::FlatVectorIndex;

    fn cache(clock: Arc<ManualClock>) -> Arc<SemanticCache> {
        Arc::new(
            SemanticCache::new(
                Arc::new(HashingEmbeddingProvider::new(64).unwrap()),
                Arc::new(FlatVectorIndex::in_memory(64).unwrap()),
                CacheSettings::default(),
            )
            .unwrap()
            .with_clock(clock),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone());
        cache.set("short lived", vec![], Some(1)).await.unwrap();
        cache.set("long lived", vec![], Some(48)).await.unwrap();
        clock.advance(chrono::Duration::hours(2));

        let task = MaintenanceTask::spawn(cache.clone(), Duration::from_secs(3600), 3);
        tokio::time::sleep(Duration::from_secs(3601)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.query_index().get_stats().await.unwrap().total_vectors,
            1
        );
        assert!(task.is_running());

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache(clock.clone());
        cache.set("short lived", vec![], Some(1)).await.unwrap();
        clock.advance(chrono::Duration::hours(2));

        let task = MaintenanceTask::spawn(cache.clone(), Duration::from_secs(3600), 3);
        task.stop().await;

        assert_eq!(cache.len().await, 1);
    }
}
