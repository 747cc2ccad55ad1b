// src/cursor.rs
//! Progress markers and the ordering rules that decide what is "new".
//!
//! A cursor is the `(created_at, id)` of the last item a source was advanced
//! past, plus the other ids already advanced past at that same instant.
//! Freshness and advance selection share one notion of "covered" so the
//! filter and the committed marker can never disagree.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for one feed instance, rendered as `platform:account`
/// (e.g. `twitter:realDonaldTrump`, `finnhub-news:general`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SourceKey {
    platform: String,
    account: String,
}

impl SourceKey {
    pub fn new(platform: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            account: account.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.account)
    }
}

impl FromStr for SourceKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, account) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("source key `{s}` is missing ':'"))?;
        let (platform, account) = (platform.trim(), account.trim());
        if platform.is_empty() || account.is_empty() {
            anyhow::bail!("source key `{s}` has an empty platform or account");
        }
        Ok(Self::new(platform, account))
    }
}

impl From<SourceKey> for String {
    fn from(k: SourceKey) -> Self {
        k.to_string()
    }
}

impl TryFrom<String> for SourceKey {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Durable progress marker for one source key.
///
/// Persisted as `{"id": "...", "createdAt": "<RFC 3339>"}`. When several
/// items share `createdAt`, the ones advanced past before `id` are kept in
/// `tiedIds`; the field is omitted when empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tied_ids: Vec<String>,
}

impl Cursor {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            tied_ids: Vec::new(),
        }
    }

    /// True if `id` at this cursor's own `created_at` was already advanced past.
    pub fn covers_id(&self, id: &str) -> bool {
        self.id == id || self.tied_ids.iter().any(|t| t == id)
    }

    /// True if an item at `(created_at, id)` has not been advanced past yet.
    /// Equal timestamps only exclude ids already seen at that instant.
    pub fn admits(&self, created_at: DateTime<Utc>, id: &str) -> bool {
        match created_at.cmp(&self.created_at) {
            Ordering::Greater => true,
            Ordering::Equal => !self.covers_id(id),
            Ordering::Less => false,
        }
    }

    /// True if `next` covers everything `self` covers: a later instant, or
    /// the same instant with a superset of its ids.
    pub fn can_advance_to(&self, next: &Cursor) -> bool {
        match next.created_at.cmp(&self.created_at) {
            Ordering::Greater => true,
            Ordering::Equal => {
                next.covers_id(&self.id) && self.tied_ids.iter().all(|t| next.covers_id(t))
            }
            Ordering::Less => false,
        }
    }

    /// Cursor for `id` at the same instant, keeping every id already covered.
    fn tie_with(&self, id: &str) -> Cursor {
        let mut tied_ids: Vec<String> = self
            .tied_ids
            .iter()
            .chain(std::iter::once(&self.id))
            .filter(|t| t.as_str() != id)
            .cloned()
            .collect();
        tied_ids.dedup();
        Cursor {
            id: id.to_string(),
            created_at: self.created_at,
            tied_ids,
        }
    }
}

/// Freshness filter: an absent cursor admits everything.
pub fn is_fresh(stored: Option<&Cursor>, created_at: DateTime<Utc>, id: &str) -> bool {
    stored.is_none_or(|c| c.admits(created_at, id))
}

/// Tracks the best advance candidate for one source key while items are
/// processed in merged order. Later items win ties on `created_at`; the ids
/// they tie with, including those under the stored cursor, stay covered.
#[derive(Debug, Clone, Default)]
pub struct AdvanceCandidate {
    stored: Option<Cursor>,
    best: Option<Cursor>,
}

impl AdvanceCandidate {
    /// Start from the cursor already in the store, if any. Nothing is
    /// returned by [`into_inner`](Self::into_inner) until an item is observed.
    pub fn from_stored(stored: Option<Cursor>) -> Self {
        Self { stored, best: None }
    }

    pub fn observe(&mut self, created_at: DateTime<Utc>, id: &str) {
        let current = self.best.as_ref().or(self.stored.as_ref());
        let next = match current {
            None => Cursor::new(id, created_at),
            Some(c) => match created_at.cmp(&c.created_at) {
                Ordering::Greater => Cursor::new(id, created_at),
                Ordering::Equal => c.tie_with(id),
                Ordering::Less => return,
            },
        };
        self.best = Some(next);
    }

    pub fn get(&self) -> Option<&Cursor> {
        self.best.as_ref()
    }

    pub fn into_inner(self) -> Option<Cursor> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn absent_cursor_admits_everything() {
        assert!(is_fresh(None, at(0, 0), "1"));
    }

    #[test]
    fn newer_timestamp_is_fresh_older_is_stale() {
        let c = Cursor::new("100", at(10, 0));
        assert!(is_fresh(Some(&c), at(10, 1), "99"));
        assert!(!is_fresh(Some(&c), at(9, 59), "101"));
    }

    #[test]
    fn equal_timestamp_only_excludes_same_id() {
        let c = Cursor::new("100", at(10, 0));
        assert!(!is_fresh(Some(&c), at(10, 0), "100"));
        assert!(is_fresh(Some(&c), at(10, 0), "101"));
        assert!(is_fresh(Some(&c), at(10, 0), "099"));
    }

    #[test]
    fn candidate_prefers_latest_and_last_on_tie() {
        let mut cand = AdvanceCandidate::default();
        cand.observe(at(9, 0), "a");
        cand.observe(at(10, 0), "b");
        cand.observe(at(10, 0), "c");
        assert_eq!(cand.get().map(|c| c.id.as_str()), Some("c"));

        // an older item seen afterwards never pulls the candidate back
        cand.observe(at(8, 0), "z");
        let c = cand.into_inner().unwrap();
        assert_eq!((c.id.as_str(), c.created_at), ("c", at(10, 0)));
        assert_eq!(c.tied_ids, vec!["b".to_string()]);
    }

    #[test]
    fn tied_ids_stay_covered_after_the_cursor_moves_within_an_instant() {
        let mut cand = AdvanceCandidate::default();
        cand.observe(at(10, 0), "x");
        cand.observe(at(10, 0), "y");
        let c = cand.into_inner().unwrap();
        assert_eq!(c.id, "y");
        assert_eq!(c.tied_ids, vec!["x".to_string()]);
        assert!(!c.admits(at(10, 0), "x"));
        assert!(!c.admits(at(10, 0), "y"));
        assert!(c.admits(at(10, 0), "w"));

        // a later tie builds on the stored cursor instead of forgetting it
        let mut next = AdvanceCandidate::from_stored(Some(c.clone()));
        next.observe(at(10, 0), "w");
        let n = next.into_inner().unwrap();
        assert_eq!(n.id, "w");
        assert!(n.covers_id("x") && n.covers_id("y"));
        assert!(c.can_advance_to(&n));
        assert!(!n.can_advance_to(&c));
    }

    #[test]
    fn advance_guard_rejects_older_or_narrower_cursors() {
        let stored = Cursor::new("y", at(10, 0));
        assert!(stored.can_advance_to(&Cursor::new("a", at(10, 1))));
        assert!(!stored.can_advance_to(&Cursor::new("z", at(9, 59))));
        assert!(!stored.can_advance_to(&Cursor::new("x", at(10, 0))));
        assert!(stored.can_advance_to(&stored));
    }

    #[test]
    fn from_stored_yields_nothing_until_observed() {
        let cand = AdvanceCandidate::from_stored(Some(Cursor::new("1", at(9, 0))));
        assert!(cand.get().is_none());
    }

    #[test]
    fn cursor_without_tied_ids_keeps_the_two_field_shape() {
        let v = serde_json::to_value(Cursor::new("1", at(9, 0))).unwrap();
        assert!(v.get("tiedIds").is_none());
        let legacy: Cursor =
            serde_json::from_str(r#"{"id":"1","createdAt":"2025-03-04T09:00:00Z"}"#).unwrap();
        assert!(legacy.tied_ids.is_empty());
    }

    #[test]
    fn source_key_round_trips_through_string() {
        let k: SourceKey = "finnhub-news:general".parse().unwrap();
        assert_eq!(k.platform(), "finnhub-news");
        assert_eq!(k.account(), "general");
        assert_eq!(k.to_string(), "finnhub-news:general");
        assert!("nocolon".parse::<SourceKey>().is_err());
        assert!("twitter:".parse::<SourceKey>().is_err());
    }

    #[test]
    fn cursor_serializes_with_camel_case_created_at() {
        let c = Cursor::new("42", at(12, 30));
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["id"], "42");
        assert_eq!(v["createdAt"], "2025-03-04T12:30:00Z");
        let back: Cursor = serde_json::from_value(v).unwrap();
        assert_eq!(back, c);
    }
}
