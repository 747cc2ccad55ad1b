// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod cursor;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod poller;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::cursor::{Cursor, SourceKey};
pub use crate::poller::{CycleSummary, Poller, SourceBinding};
