// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::cursor::SourceKey;
use crate::ingest::types::{Item, ParseError};

/// Upper bound on carried text, in chars.
pub const MAX_TEXT_CHARS: usize = 4000;

/// Normalize upstream text: decode entities, strip tags, ASCII quotes,
/// collapse whitespace, cap length. Sentence punctuation is kept.
pub fn normalize_text(s: &str) -> String {
    // 1) Block-level tags become spaces so paragraphs don't glue together
    static RE_BREAKS: OnceCell<Regex> = OnceCell::new();
    let re_breaks =
        RE_BREAKS.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|</p>").expect("breaks regex"));
    let mut out = re_breaks.replace_all(s, " ").to_string();

    // 2) Strip remaining tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tags regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) HTML entity decode (after tag strip so `&lt;b&gt;` survives as text)
    out = html_escape::decode_html_entities(&out).to_string();

    // 4) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 5) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Parse an RFC 3339 / ISO-8601 timestamp as returned by X and Mastodon APIs.
pub fn parse_rfc3339(id: &str, raw: Option<&str>) -> Result<DateTime<Utc>, ParseError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError::MissingTimestamp { id: id.to_string() })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp {
            id: id.to_string(),
            raw: raw.to_string(),
        })
}

/// Parse unix seconds; zero and negative values are treated as missing.
pub fn parse_unix_secs(id: &str, raw: Option<i64>) -> Result<DateTime<Utc>, ParseError> {
    let secs = raw
        .filter(|s| *s > 0)
        .ok_or_else(|| ParseError::MissingTimestamp { id: id.to_string() })?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ParseError::InvalidTimestamp {
            id: id.to_string(),
            raw: secs.to_string(),
        })
}

/// Non-empty trimmed id, or `MissingId`.
pub fn require_id(raw: Option<&str>) -> Result<String, ParseError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ParseError::MissingId)
}

/// Adapter boundary: keep the records that parsed, log and count the rest.
pub fn accept_records<I>(key: &SourceKey, parsed: I) -> Vec<Item>
where
    I: IntoIterator<Item = Result<Item, ParseError>>,
{
    let mut out = Vec::new();
    for r in parsed {
        match r {
            Ok(item) => out.push(item),
            Err(e) => {
                tracing::debug!(target: "ingest", source_key = %key, error = %e, "dropping invalid record");
                counter!("poll_parse_rejects_total").increment(1);
            }
        }
    }
    out
}
