// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, SourceKey};

/// One polled unit (post, article). Immutable once an adapter produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub source_key: SourceKey,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub payload: ItemPayload,
}

/// What the poller carries through to classification and delivery without
/// interpreting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemPayload {
    pub text: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
}

/// Why a raw upstream record was refused at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("record has no id")]
    MissingId,
    #[error("record {id} has no timestamp")]
    MissingTimestamp { id: String },
    #[error("record {id} has unparseable timestamp `{raw}`")]
    InvalidTimestamp { id: String, raw: String },
    #[error("record {id} has no text")]
    EmptyText { id: String },
}

/// One implementation per upstream feed type.
///
/// `fetch` returns the batch for a single source key, in any order. The hint
/// is the stored cursor (if any); adapters may use it to narrow the request
/// but the poller re-filters regardless.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, key: &SourceKey, hint: Option<&Cursor>) -> Result<Vec<Item>>;
    /// Platform prefix this adapter serves, e.g. `twitter`.
    fn platform(&self) -> &'static str;
}
