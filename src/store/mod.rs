// src/store/mod.rs
//! Cursor persistence: one progress marker per source key.
//!
//! Two interchangeable backends satisfy [`CursorStore`]:
//! - [`kv::KvCursorStore`] — durable, remote key-value store over REST.
//! - [`memory::MemoryCursorStore`] — process-local map. It is NOT durable:
//!   cursors live only as long as the process, so a restart re-delivers the
//!   latest page of every source. Intended for local/dev runs and tests.
//!
//! Backends report failures honestly; degrading a failed `get` to "absent"
//! and a failed `set` to "log and continue" is the poller's job.

pub mod kv;
pub mod memory;

use std::sync::Arc;

use anyhow::Result;

use crate::config::StoreConfig;
use crate::cursor::{Cursor, SourceKey};

#[async_trait::async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, key: &SourceKey) -> Result<Option<Cursor>>;
    async fn set(&self, key: &SourceKey, cursor: &Cursor) -> Result<()>;
    fn backend_name(&self) -> &'static str;
}

pub type DynCursorStore = Arc<dyn CursorStore>;

/// Pick the backend once at startup: KV when configured, memory otherwise.
pub fn from_config(cfg: &StoreConfig) -> Result<DynCursorStore> {
    match cfg {
        StoreConfig::Kv {
            url,
            token,
            key_prefix,
        } => {
            let store = kv::KvCursorStore::new(url, token.clone(), key_prefix.clone())?;
            tracing::info!(target: "store", backend = "kv", "cursor store ready");
            Ok(Arc::new(store))
        }
        StoreConfig::Memory => {
            tracing::warn!(
                target: "store",
                backend = "memory",
                "KV_REST_API_URL/KV_REST_API_TOKEN not set; cursors are kept in memory and lost on restart"
            );
            Ok(Arc::new(memory::MemoryCursorStore::new()))
        }
    }
}

/// Storage key for a source's cursor record.
pub(crate) fn record_key(prefix: &str, key: &SourceKey) -> String {
    format!("{prefix}cursor:{key}")
}
