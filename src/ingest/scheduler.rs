// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::poller::Poller;

/// Spawn an in-process trigger that runs one cycle every `interval_secs`.
/// External cron triggers keep working alongside it; the poller's
/// single-flight guard turns overlaps into skipped cycles.
pub fn spawn_scheduler(poller: Arc<Poller>, interval_secs: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let p = poller.clone();
            match tokio::spawn(async move { p.run_cycle().await }).await {
                Ok(summary) => tracing::debug!(
                    target: "ingest",
                    skipped = summary.skipped,
                    processed = summary.processed,
                    "scheduled cycle tick"
                ),
                // The loop outlives a failed cycle; the next tick tries again.
                Err(e) => tracing::error!(target: "ingest", error = %e, "scheduled cycle aborted"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::LexiconClassifier;
    use crate::cursor::{Cursor, SourceKey};
    use crate::ingest::types::{Item, SourceAdapter};
    use crate::notify::WebhookNotifier;
    use crate::poller::SourceBinding;
    use crate::store::memory::MemoryCursorStore;

    struct Exploding;

    #[async_trait::async_trait]
    impl SourceAdapter for Exploding {
        async fn fetch(&self, _key: &SourceKey, _hint: Option<&Cursor>) -> anyhow::Result<Vec<Item>> {
            panic!("adapter bug");
        }

        fn platform(&self) -> &'static str {
            "twitter"
        }
    }

    #[tokio::test]
    async fn first_tick_runs_a_cycle_immediately() {
        let poller = Arc::new(Poller::new(
            Vec::new(),
            Arc::new(MemoryCursorStore::new()),
            Arc::new(LexiconClassifier::new()),
            Arc::new(WebhookNotifier::new(Vec::<String>::new())),
        ));
        let handle = spawn_scheduler(poller.clone(), 3600);
        for _ in 0..50 {
            if !poller.history().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(poller.history().len(), 1);
    }

    #[tokio::test]
    async fn panicking_adapter_does_not_stop_the_loop() {
        let poller = Arc::new(Poller::new(
            vec![SourceBinding::new(SourceKey::new("twitter", "a"), Arc::new(Exploding))],
            Arc::new(MemoryCursorStore::new()),
            Arc::new(LexiconClassifier::new()),
            Arc::new(WebhookNotifier::new(Vec::<String>::new())),
        ));
        let handle = spawn_scheduler(poller.clone(), 1);
        for _ in 0..300 {
            if poller.history().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!handle.is_finished());
        handle.abort();
        assert!(poller.history().len() >= 2, "second tick never ran");
        let last = &poller.history().snapshot_last_n(1)[0];
        assert!(last.sources[0].error.as_deref().unwrap_or("").contains("panic"));
    }
}
