// src/ingest/providers/mod.rs
pub mod finnhub;
pub mod truth_social;
pub mod x;
