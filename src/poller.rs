// src/poller.rs
//! One polling cycle: fetch every source, drop what its cursor already covers,
//! merge everything into one chronological stream, classify and deliver item
//! by item, then commit one cursor per source that produced something.
//!
//! Nothing in here fails the cycle. Adapter, store, classifier and delivery
//! errors all end up as per-source or per-item notes in the [`CycleSummary`].
//! Adapter fetches run on their own tasks, so a panic there is reported as
//! that source's fetch error.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, gauge};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::analyze::{Classification, DynClassifier, SentimentLabel};
use crate::cursor::{is_fresh, AdvanceCandidate, Cursor, SourceKey};
use crate::history::CycleHistory;
use crate::ingest::types::{Item, SourceAdapter};
use crate::notify::{AlertPayload, DynNotifier};
use crate::store::DynCursorStore;

/// A configured source key and the adapter that serves it.
#[derive(Clone)]
pub struct SourceBinding {
    pub key: SourceKey,
    pub adapter: Arc<dyn SourceAdapter>,
}

impl SourceBinding {
    pub fn new(key: SourceKey, adapter: Arc<dyn SourceAdapter>) -> Self {
        Self { key, adapter }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source_key: SourceKey,
    pub fetched: usize,
    pub fresh: usize,
    pub processed: usize,
    /// Cursor in effect after the cycle (stored or newly committed).
    pub cursor: Option<Cursor>,
    pub advanced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source_key: SourceKey) -> Self {
        Self {
            source_key,
            fetched: 0,
            fresh: 0,
            processed: 0,
            cursor: None,
            advanced: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedItem {
    pub source_key: SourceKey,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub label: SentimentLabel,
    pub classifier: String,
    pub delivered: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when another cycle held the guard; nothing was fetched or committed.
    pub skipped: bool,
    pub processed: usize,
    pub delivered: usize,
    pub sources: Vec<SourceReport>,
    /// Processed items in delivery order.
    pub items: Vec<ProcessedItem>,
    pub notes: Vec<String>,
}

impl CycleSummary {
    fn skipped(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            finished_at: now,
            skipped: true,
            processed: 0,
            delivered: 0,
            sources: Vec::new(),
            items: Vec::new(),
            notes: vec!["another cycle is already running".to_string()],
        }
    }

    pub fn source(&self, key: &SourceKey) -> Option<&SourceReport> {
        self.sources.iter().find(|r| &r.source_key == key)
    }
}

pub struct Poller {
    sources: Vec<SourceBinding>,
    store: DynCursorStore,
    classifier: DynClassifier,
    notifier: DynNotifier,
    history: Arc<CycleHistory>,
    // Single-flight: overlapping triggers must not race cursor writes.
    cycle_guard: Mutex<()>,
}

impl Poller {
    pub fn new(
        sources: Vec<SourceBinding>,
        store: DynCursorStore,
        classifier: DynClassifier,
        notifier: DynNotifier,
    ) -> Self {
        Self {
            sources,
            store,
            classifier,
            notifier,
            history: Arc::new(CycleHistory::default()),
            cycle_guard: Mutex::new(()),
        }
    }

    pub fn history(&self) -> &Arc<CycleHistory> {
        &self.history
    }

    pub fn store(&self) -> &DynCursorStore {
        &self.store
    }

    pub fn source_keys(&self) -> impl Iterator<Item = &SourceKey> {
        self.sources.iter().map(|b| &b.key)
    }

    /// Run one cycle, or return a skipped summary if one is already running.
    pub async fn run_cycle(&self) -> CycleSummary {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            tracing::info!(target: "poller", "cycle already in progress; skipping trigger");
            return CycleSummary::skipped(Utc::now());
        };

        let summary = self.run_cycle_locked().await;
        self.history.push(summary.clone());
        summary
    }

    async fn run_cycle_locked(&self) -> CycleSummary {
        let started_at = Utc::now();
        counter!("poll_cycles_total").increment(1);

        let mut notes: Vec<String> = Vec::new();
        let mut reports: Vec<SourceReport> = self
            .sources
            .iter()
            .map(|b| SourceReport::new(b.key.clone()))
            .collect();

        // Fetching: every source concurrently, each with its own cursor hint.
        let fetched = join_all(self.sources.iter().map(|b| self.fetch_source(b))).await;

        // Filtering, per source against its own cursor.
        let mut stored_cursors: Vec<Option<Cursor>> = Vec::with_capacity(fetched.len());
        let mut merged: Vec<(usize, Item)> = Vec::new();
        for (idx, outcome) in fetched.into_iter().enumerate() {
            let report = &mut reports[idx];
            if let Some(note) = outcome.store_note {
                notes.push(note);
            }
            match outcome.items {
                Ok(items) => {
                    report.fetched = items.len();
                    counter!("poll_items_fetched_total").increment(items.len() as u64);
                    let fresh = filter_fresh(outcome.stored.as_ref(), items);
                    report.fresh = fresh.len();
                    merged.extend(fresh.into_iter().map(|item| (idx, item)));
                }
                Err(e) => {
                    counter!("poll_source_errors_total").increment(1);
                    tracing::warn!(
                        target: "poller",
                        source_key = %report.source_key,
                        error = ?e,
                        "source fetch failed; treating as empty"
                    );
                    let msg = format!("{e:#}");
                    notes.push(format!("{}: fetch failed: {msg}", report.source_key));
                    report.error = Some(msg);
                }
            }
            report.cursor = outcome.stored.clone();
            stored_cursors.push(outcome.stored);
        }

        // Merged: one chronological stream; stable, so ties keep adapter order.
        merged.sort_by_key(|(_, item)| item.created_at);

        // Processing, strictly one item at a time.
        let mut candidates: Vec<AdvanceCandidate> = stored_cursors
            .iter()
            .cloned()
            .map(AdvanceCandidate::from_stored)
            .collect();
        let mut items_out: Vec<ProcessedItem> = Vec::with_capacity(merged.len());
        let mut delivered_total = 0usize;
        for (idx, item) in merged {
            let classification = self.classify(&item).await;
            let payload = AlertPayload::new(&item, &classification);
            let delivered = self.notifier.deliver(&payload).await;
            delivered_total += delivered;

            tracing::info!(
                target: "poller",
                source_key = %item.source_key,
                item_id = %item.id,
                text_digest = %text_digest(&item.payload.text),
                label = %classification.label.as_str(),
                classifier = %classification.source,
                delivered,
                "item processed"
            );

            // Advance regardless of delivery outcome.
            candidates[idx].observe(item.created_at, &item.id);
            reports[idx].processed += 1;
            counter!("poll_items_processed_total").increment(1);

            items_out.push(ProcessedItem {
                source_key: item.source_key.clone(),
                id: item.id.clone(),
                created_at: item.created_at,
                label: classification.label,
                classifier: classification.source,
                delivered,
            });
        }

        // CursorsPending -> CursorsCommitted: independent, concurrent writes.
        let mut pending: Vec<(usize, SourceKey, Cursor)> = Vec::new();
        for (idx, candidate) in candidates.into_iter().enumerate() {
            let Some(next) = candidate.into_inner() else {
                continue;
            };
            let key = reports[idx].source_key.clone();
            let regresses = stored_cursors[idx]
                .as_ref()
                .is_some_and(|stored| !stored.can_advance_to(&next));
            if regresses {
                tracing::warn!(
                    target: "poller",
                    source_key = %key,
                    "candidate cursor is behind the stored one; not committing"
                );
                continue;
            }
            pending.push((idx, key, next));
        }

        let commits = join_all(pending.into_iter().map(|(idx, key, cursor)| async move {
            let res = self.store.set(&key, &cursor).await;
            (idx, cursor, res)
        }))
        .await;

        for (idx, cursor, res) in commits {
            let report = &mut reports[idx];
            match res {
                Ok(()) => {
                    tracing::debug!(
                        target: "poller",
                        source_key = %report.source_key,
                        cursor_id = %cursor.id,
                        "cursor committed"
                    );
                    report.cursor = Some(cursor);
                    report.advanced = true;
                }
                Err(e) => {
                    counter!("poll_store_errors_total").increment(1);
                    tracing::warn!(
                        target: "poller",
                        source_key = %report.source_key,
                        error = ?e,
                        "cursor commit failed; next cycle may re-deliver"
                    );
                    notes.push(format!("{}: cursor write failed: {e:#}", report.source_key));
                }
            }
        }

        let finished_at = Utc::now();
        gauge!("poll_last_cycle_ts").set(finished_at.timestamp() as f64);

        let summary = CycleSummary {
            started_at,
            finished_at,
            skipped: false,
            processed: items_out.len(),
            delivered: delivered_total,
            sources: reports,
            items: items_out,
            notes,
        };
        tracing::info!(
            target: "poller",
            processed = summary.processed,
            delivered = summary.delivered,
            sources = summary.sources.len(),
            notes = summary.notes.len(),
            "cycle finished"
        );
        summary
    }

    async fn fetch_source(&self, binding: &SourceBinding) -> FetchOutcome {
        let (stored, store_note) = match self.store.get(&binding.key).await {
            Ok(c) => (c, None),
            Err(e) => {
                counter!("poll_store_errors_total").increment(1);
                tracing::warn!(
                    target: "poller",
                    source_key = %binding.key,
                    backend = self.store.backend_name(),
                    error = ?e,
                    "cursor read failed; treating as absent"
                );
                (
                    None,
                    Some(format!("{}: cursor read failed: {e:#}", binding.key)),
                )
            }
        };
        // Own task per fetch: a panicking adapter fails only its own key.
        let adapter = binding.adapter.clone();
        let key = binding.key.clone();
        let hint = stored.clone();
        let task = tokio::spawn(async move { adapter.fetch(&key, hint.as_ref()).await });
        let items = match task.await {
            Ok(res) => res,
            Err(e) => Err(anyhow::anyhow!("source adapter task failed: {e}")),
        };
        FetchOutcome {
            stored,
            store_note,
            items,
        }
    }

    async fn classify(&self, item: &Item) -> Classification {
        match self.classifier.classify(&item.payload.text).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    target: "poller",
                    source_key = %item.source_key,
                    item_id = %item.id,
                    classifier = self.classifier.name(),
                    error = ?e,
                    "classification failed; using neutral fallback"
                );
                Classification::fallback(e)
            }
        }
    }
}

struct FetchOutcome {
    stored: Option<Cursor>,
    store_note: Option<String>,
    items: anyhow::Result<Vec<Item>>,
}

/// Keep items the stored cursor does not cover, first occurrence of each id only.
fn filter_fresh(stored: Option<&Cursor>, items: Vec<Item>) -> Vec<Item> {
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|it| is_fresh(stored, it.created_at, &it.id))
        .filter(|it| seen.insert(it.id.clone()))
        .collect()
}

/// Short stable fingerprint for logs; raw post text is never logged.
fn text_digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hash.iter().take(6).map(|b| format!("{b:02x}")).collect()
}
