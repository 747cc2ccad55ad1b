// src/config/sources.rs
//! Which feeds to poll. Read from a TOML or JSON file:
//!
//! ```toml
//! [[sources]]
//! platform = "truthsocial"
//! account = "realDonaldTrump"
//! ```
//!
//! or `[{"platform": "twitter", "account": "realDonaldTrump"}]`.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cursor::SourceKey;
use crate::ingest::providers::{finnhub, truth_social, x};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSpec {
    pub platform: String,
    pub account: String,
}

impl SourceSpec {
    /// Canonical key; platform aliases (`x`, `truth`, `finnhub`) are resolved.
    pub fn key(&self) -> Result<SourceKey> {
        let platform = canonical_platform(&self.platform)
            .ok_or_else(|| anyhow!("unknown platform `{}`", self.platform))?;
        let account = self.account.trim().trim_start_matches('@');
        if account.is_empty() {
            return Err(anyhow!("empty account for platform `{platform}`"));
        }
        Ok(SourceKey::new(platform, account))
    }
}

pub fn canonical_platform(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "twitter" | "x" => Some(x::PLATFORM),
        "truthsocial" | "truth_social" | "truth-social" | "truth" => Some(truth_social::PLATFORM),
        "finnhub-news" | "finnhub_news" | "finnhub" => Some(finnhub::PLATFORM),
        _ => None,
    }
}

/// Load source specs from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Resolve the sources file:
/// 1) `explicit` (from $SOURCES_PATH) — must exist
/// 2) config/sources.toml
/// 3) config/sources.json
///
/// Returns `None` when no file is configured or present.
pub fn load_sources_default(explicit: Option<&str>) -> Result<Option<Vec<SourceSpec>>> {
    if let Some(p) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("SOURCES_PATH points to non-existent path `{p}`"));
        }
        return load_sources_from(&pb).map(Some);
    }
    for candidate in ["config/sources.toml", "config/sources.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_sources_from(&pb).map(Some);
        }
    }
    Ok(None)
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSpec>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported sources file format"))
}

fn parse_toml(s: &str) -> Result<Vec<SourceSpec>> {
    #[derive(Deserialize)]
    struct TomlSources {
        #[serde(default)]
        sources: Vec<SourceSpec>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceSpec>> {
    let v: Vec<SourceSpec> = serde_json::from_str(s)?;
    Ok(v)
}

/// Split a comma/whitespace separated list, trimmed, `@` stripped, empties dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().trim_start_matches('@'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
