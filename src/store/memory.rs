// src/store/memory.rs
use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use super::CursorStore;
use crate::cursor::{Cursor, SourceKey};

/// Process-local cursor map. Constructed once and handed to the poller;
/// contents vanish with the process (no cross-process durability).
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    inner: RwLock<HashMap<SourceKey, Cursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cursor directly (tests, admin tooling).
    pub fn with_cursor(self, key: SourceKey, cursor: Cursor) -> Self {
        if let Ok(mut g) = self.inner.write() {
            g.insert(key, cursor);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, key: &SourceKey) -> Result<Option<Cursor>> {
        let g = self
            .inner
            .read()
            .map_err(|_| anyhow!("memory cursor store lock poisoned"))?;
        Ok(g.get(key).cloned())
    }

    async fn set(&self, key: &SourceKey, cursor: &Cursor) -> Result<()> {
        let mut g = self
            .inner
            .write()
            .map_err(|_| anyhow!("memory cursor store lock poisoned"))?;
        g.insert(key.clone(), cursor.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
