// tests/poll_cycle.rs
//
// End-to-end cycles against in-process mocks: no network, no sockets.
//
// Covered:
// - global chronological merge across sources
// - stale / already-seen items are filtered, cursor untouched
// - equal timestamps: both fresh, cursor lands on the last processed
// - a tied batch is delivered once no matter how many cycles re-serve it
// - one failing source does not stop the others, even if its adapter panics
// - re-running with no new items processes nothing
// - cursor never moves backwards over many randomized cycles
// - delivery failures, store failures and classifier failures are non-fatal
// - overlapping triggers: one cycle runs, the other is skipped

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;

use market_post_alerts::analyze::{Classification, Classifier, LexiconClassifier, SentimentLabel};
use market_post_alerts::cursor::{Cursor, SourceKey};
use market_post_alerts::ingest::types::{Item, ItemPayload, SourceAdapter};
use market_post_alerts::notify::{AlertPayload, Notifier};
use market_post_alerts::poller::{Poller, SourceBinding};
use market_post_alerts::store::memory::MemoryCursorStore;
use market_post_alerts::store::CursorStore;

// ---------- mocks ----------

/// Serves canned batches per source key; records the hint it was given.
#[derive(Default)]
struct MockAdapter {
    batches: Mutex<HashMap<SourceKey, Result<Vec<Item>, String>>>,
    hints: Mutex<Vec<(SourceKey, Option<Cursor>)>>,
    delay: Option<Duration>,
}

impl MockAdapter {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn serve(&self, key: &SourceKey, items: Vec<Item>) {
        self.batches.lock().insert(key.clone(), Ok(items));
    }

    fn fail(&self, key: &SourceKey, msg: &str) {
        self.batches.lock().insert(key.clone(), Err(msg.to_string()));
    }
}

#[async_trait::async_trait]
impl SourceAdapter for MockAdapter {
    async fn fetch(&self, key: &SourceKey, hint: Option<&Cursor>) -> Result<Vec<Item>> {
        self.hints.lock().push((key.clone(), hint.cloned()));
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match self.batches.lock().get(key) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(msg)) => Err(anyhow!("{msg}")),
            None => Ok(Vec::new()),
        }
    }

    fn platform(&self) -> &'static str {
        "mock"
    }
}

/// Records every payload; reports a fixed accepted count.
struct RecordingNotifier {
    seen: Mutex<Vec<AlertPayload>>,
    accepted: usize,
}

impl RecordingNotifier {
    fn accepting(accepted: usize) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            accepted,
        })
    }

    fn ids(&self) -> Vec<String> {
        self.seen.lock().iter().map(|p| p.item_id.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, payload: &AlertPayload) -> usize {
        self.seen.lock().push(payload.clone());
        self.accepted
    }

    fn endpoint_count(&self) -> usize {
        self.accepted
    }
}

/// Memory store with switchable read/write failures.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCursorStore,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
}

#[async_trait::async_trait]
impl CursorStore for FlakyStore {
    async fn get(&self, key: &SourceKey) -> Result<Option<Cursor>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(anyhow!("kv unreachable"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &SourceKey, cursor: &Cursor) -> Result<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(anyhow!("kv unreachable"));
        }
        self.inner.set(key, cursor).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Adapter with a bug: panics instead of returning an error.
struct PanickingAdapter;

#[async_trait::async_trait]
impl SourceAdapter for PanickingAdapter {
    async fn fetch(&self, _key: &SourceKey, _hint: Option<&Cursor>) -> Result<Vec<Item>> {
        panic!("unexpected upstream shape");
    }

    fn platform(&self) -> &'static str {
        "mock"
    }
}

struct BrokenClassifier;

impl Classifier for BrokenClassifier {
    fn classify<'a>(
        &'a self,
        _text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Classification>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("model offline")) })
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

// ---------- helpers ----------

fn key(account: &str) -> SourceKey {
    SourceKey::new("twitter", account)
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 9, h, m, 0).unwrap()
}

fn item(key: &SourceKey, id: &str, created_at: DateTime<Utc>) -> Item {
    Item {
        source_key: key.clone(),
        id: id.to_string(),
        created_at,
        payload: ItemPayload {
            text: format!("post {id} about tariffs and stocks"),
            ..Default::default()
        },
    }
}

fn poller_with(
    keys: &[SourceKey],
    adapter: Arc<MockAdapter>,
    store: Arc<dyn CursorStore>,
    notifier: Arc<RecordingNotifier>,
) -> Poller {
    let bindings = keys
        .iter()
        .map(|k| SourceBinding::new(k.clone(), adapter.clone()))
        .collect();
    Poller::new(bindings, store, Arc::new(LexiconClassifier::new()), notifier)
}

// ---------- properties ----------

#[tokio::test]
async fn merged_order_is_chronological_across_sources() {
    let (a, b, c) = (key("a"), key("b"), key("c"));
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "a1", at(10, 0))]);
    adapter.serve(&b, vec![item(&b, "b1", at(9, 58))]);
    adapter.serve(&c, vec![item(&c, "c1", at(10, 2))]);

    // Binding order must not matter.
    let mut keys = vec![a, b, c];
    keys.shuffle(&mut rand::rng());

    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&keys, adapter, Arc::new(MemoryCursorStore::new()), notifier.clone());

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 3);
    assert_eq!(notifier.ids(), vec!["b1", "a1", "c1"]);
    let summary_ids: Vec<&str> = summary.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(summary_ids, vec!["b1", "a1", "c1"]);
}

#[tokio::test]
async fn already_seen_and_older_items_are_dropped() {
    let a = key("a");
    let stored = Cursor::new("100", at(10, 0));
    let store = Arc::new(MemoryCursorStore::new().with_cursor(a.clone(), stored.clone()));

    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "100", at(10, 0)), item(&a, "99", at(9, 30))]);

    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone()], adapter.clone(), store.clone(), notifier.clone());

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 0);
    assert!(notifier.ids().is_empty());

    let report = summary.source(&a).unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.fresh, 0);
    assert!(!report.advanced);
    assert_eq!(report.cursor.as_ref(), Some(&stored));
    assert_eq!(store.get(&a).await.unwrap(), Some(stored.clone()));

    // The adapter saw the stored cursor as its hint.
    assert_eq!(adapter.hints.lock()[0], (a, Some(stored)));
}

#[tokio::test]
async fn equal_timestamps_are_both_fresh_and_last_processed_wins() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "x", at(10, 0)), item(&a, "y", at(10, 0))]);

    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone()], adapter, store.clone(), notifier.clone());

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 2);
    assert_eq!(notifier.ids(), vec!["x", "y"]);
    let cursor = store.get(&a).await.unwrap().unwrap();
    assert_eq!((cursor.id.as_str(), cursor.created_at), ("y", at(10, 0)));
    assert_eq!(cursor.tied_ids, vec!["x".to_string()]);
}

#[tokio::test]
async fn tied_batch_is_delivered_once_across_cycles() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "x", at(10, 0)), item(&a, "y", at(10, 0))]);

    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone()], adapter.clone(), store.clone(), notifier.clone());

    assert_eq!(poller.run_cycle().await.processed, 2);
    let committed = store.get(&a).await.unwrap();
    for _ in 0..3 {
        let summary = poller.run_cycle().await;
        assert_eq!(summary.processed, 0);
        assert!(!summary.source(&a).unwrap().advanced);
        assert_eq!(store.get(&a).await.unwrap(), committed);
    }
    assert_eq!(notifier.ids(), vec!["x", "y"]);

    // A late arrival at the same instant is still new, whatever its id sorts as.
    adapter.serve(
        &a,
        vec![item(&a, "x", at(10, 0)), item(&a, "y", at(10, 0)), item(&a, "a", at(10, 0))],
    );
    assert_eq!(poller.run_cycle().await.processed, 1);
    assert_eq!(poller.run_cycle().await.processed, 0);
    assert_eq!(notifier.ids(), vec!["x", "y", "a"]);

    let cursor = store.get(&a).await.unwrap().unwrap();
    assert_eq!(cursor.id, "a");
    assert!(cursor.covers_id("x") && cursor.covers_id("y"));
}

#[tokio::test]
async fn failing_source_does_not_block_others() {
    let (a, b) = (key("a"), key("b"));
    let adapter = Arc::new(MockAdapter::default());
    adapter.fail(&a, "429 too many requests");
    adapter.serve(&b, vec![item(&b, "b1", at(11, 0))]);

    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone(), b.clone()], adapter, store.clone(), notifier.clone());

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 1);

    let ra = summary.source(&a).unwrap();
    assert!(ra.error.as_deref().unwrap().contains("429"));
    assert!(!ra.advanced);
    assert!(summary.notes.iter().any(|n| n.starts_with("twitter:a")));

    let rb = summary.source(&b).unwrap();
    assert!(rb.advanced);
    assert_eq!(store.get(&b).await.unwrap(), Some(Cursor::new("b1", at(11, 0))));
    assert_eq!(store.get(&a).await.unwrap(), None);
}

#[tokio::test]
async fn panicking_adapter_is_confined_to_its_source() {
    let (a, b) = (key("a"), key("b"));
    let healthy = Arc::new(MockAdapter::default());
    healthy.serve(&b, vec![item(&b, "b1", at(11, 0))]);

    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(1);
    let poller = Poller::new(
        vec![
            SourceBinding::new(a.clone(), Arc::new(PanickingAdapter)),
            SourceBinding::new(b.clone(), healthy),
        ],
        store.clone(),
        Arc::new(LexiconClassifier::new()),
        notifier.clone(),
    );

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 1);
    assert_eq!(notifier.ids(), vec!["b1"]);
    let ra = summary.source(&a).unwrap();
    assert!(ra.error.as_deref().unwrap().contains("panicked"));
    assert!(!ra.advanced);
    assert!(summary.source(&b).unwrap().advanced);

    // The guard was released; the next cycle runs normally.
    assert!(!poller.run_cycle().await.skipped);
}

#[tokio::test]
async fn rerun_without_new_items_processes_nothing() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "1", at(9, 0)), item(&a, "2", at(9, 5))]);

    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone()], adapter, store.clone(), notifier.clone());

    let first = poller.run_cycle().await;
    assert_eq!(first.processed, 2);
    let after_first = store.get(&a).await.unwrap();

    let second = poller.run_cycle().await;
    assert_eq!(second.processed, 0);
    assert_eq!(store.get(&a).await.unwrap(), after_first);
    assert_eq!(notifier.ids().len(), 2);
    assert_eq!(poller.history().len(), 2);
}

#[tokio::test]
async fn cursor_is_monotonic_over_randomized_cycles() {
    let a = key("a");
    let mut rng = rand::rng();

    // Unique timestamps so every item is delivered at most once.
    let pool: Vec<Item> = (0..60)
        .map(|i| item(&a, &format!("p{i}"), at(8, 0) + chrono::Duration::seconds(i * 7)))
        .collect();

    let adapter = Arc::new(MockAdapter::default());
    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone()], adapter.clone(), store.clone(), notifier.clone());

    let mut prev: Option<Cursor> = None;
    for round in 0..20usize {
        // Random window over the pool (old items included), shuffled.
        let hi = (round * 3 + rng.random_range(0..4)).min(pool.len());
        let lo = hi.saturating_sub(rng.random_range(0..10));
        let mut batch = pool[lo..hi].to_vec();
        batch.shuffle(&mut rng);
        adapter.serve(&a, batch);

        poller.run_cycle().await;
        let now = store.get(&a).await.unwrap();
        if let (Some(p), Some(n)) = (&prev, &now) {
            assert!(p.can_advance_to(n), "cursor regressed in round {round}");
        }
        if prev.is_some() {
            assert!(now.is_some(), "cursor disappeared in round {round}");
        }
        prev = now;
    }

    let ids = notifier.ids();
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "an item was delivered twice");
}

#[tokio::test]
async fn cursor_advances_even_when_every_delivery_fails() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "1", at(12, 0))]);

    let store = Arc::new(MemoryCursorStore::new());
    let notifier = RecordingNotifier::accepting(0);
    let poller = poller_with(&[a.clone()], adapter, store.clone(), notifier);

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.delivered, 0);
    assert_eq!(store.get(&a).await.unwrap(), Some(Cursor::new("1", at(12, 0))));
}

#[tokio::test]
async fn store_failures_degrade_without_aborting() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "1", at(12, 0))]);

    let store = Arc::new(FlakyStore::default());
    store.fail_get.store(true, Ordering::SeqCst);
    store.fail_set.store(true, Ordering::SeqCst);
    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a.clone()], adapter.clone(), store.clone(), notifier.clone());

    // Read failure: treated as absent, so the item is processed.
    // Write failure: noted, cursor not advanced.
    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 1);
    let report = summary.source(&a).unwrap();
    assert!(!report.advanced);
    assert!(report.error.is_none());
    assert!(summary.notes.iter().any(|n| n.contains("cursor read failed")));
    assert!(summary.notes.iter().any(|n| n.contains("cursor write failed")));

    // Store recovers: the same item is re-delivered once (at-least-once), then committed.
    store.fail_get.store(false, Ordering::SeqCst);
    store.fail_set.store(false, Ordering::SeqCst);
    let again = poller.run_cycle().await;
    assert_eq!(again.processed, 1);
    assert!(again.source(&a).unwrap().advanced);
    assert_eq!(poller.run_cycle().await.processed, 0);
    assert_eq!(notifier.ids(), vec!["1", "1"]);
}

#[tokio::test]
async fn classifier_failure_falls_back_to_neutral() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::default());
    adapter.serve(&a, vec![item(&a, "1", at(12, 0))]);

    let notifier = RecordingNotifier::accepting(1);
    let poller = Poller::new(
        vec![SourceBinding::new(a.clone(), adapter)],
        Arc::new(MemoryCursorStore::new()),
        Arc::new(BrokenClassifier),
        notifier.clone(),
    );

    let summary = poller.run_cycle().await;
    assert_eq!(summary.processed, 1);
    let seen = notifier.seen.lock();
    assert_eq!(seen[0].label, SentimentLabel::Neutral);
    assert_eq!(seen[0].classifier, "fallback");
    assert!(summary.source(&a).unwrap().advanced);
}

#[tokio::test]
async fn overlapping_triggers_run_a_single_cycle() {
    let a = key("a");
    let adapter = Arc::new(MockAdapter::slow(Duration::from_millis(200)));
    adapter.serve(&a, vec![item(&a, "1", at(12, 0))]);

    let notifier = RecordingNotifier::accepting(1);
    let poller = poller_with(&[a], adapter, Arc::new(MemoryCursorStore::new()), notifier.clone());

    let (x, y) = tokio::join!(poller.run_cycle(), poller.run_cycle());
    let skipped = [x.skipped, y.skipped].iter().filter(|s| **s).count();
    assert_eq!(skipped, 1);
    assert_eq!(x.processed + y.processed, 1);
    assert_eq!(notifier.ids(), vec!["1"]);
    // Skipped cycles are not recorded.
    assert_eq!(poller.history().len(), 1);
}
