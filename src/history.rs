//! history.rs: bounded in-memory record of recent cycle summaries, for `/debug/cycles`.
//! Lives as long as the process.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::poller::CycleSummary;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct CycleHistory {
    inner: Mutex<VecDeque<CycleSummary>>,
    cap: usize,
}

impl Default for CycleHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl CycleHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 1_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, summary: CycleSummary) {
        let mut v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.push_back(summary);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Most recent first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<CycleSummary> {
        let v = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        v.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
