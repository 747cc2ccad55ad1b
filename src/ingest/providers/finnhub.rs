// src/ingest/providers/finnhub.rs
//! Finnhub market news. Source keys look like `finnhub-news:<category>`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::cursor::{Cursor, SourceKey};
use crate::ingest::types::{Item, ItemPayload, ParseError, SourceAdapter};
use crate::ingest::{accept_records, normalize_text, parse_unix_secs};

pub const PLATFORM: &str = "finnhub-news";
const DEFAULT_BASE_URL: &str = "https://finnhub.io";

#[derive(Debug, Deserialize)]
struct RawArticle {
    id: Option<i64>,
    datetime: Option<i64>,
    headline: Option<String>,
    summary: Option<String>,
    source: Option<String>,
    url: Option<String>,
}

pub struct FinnhubNewsProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FinnhubNewsProvider {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn parse_items_from_str(key: &SourceKey, body: &str) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let raw: Vec<RawArticle> = serde_json::from_str(body).context("parsing finnhub news json")?;
        let items = accept_records(key, raw.into_iter().map(|a| parse_article(key, a)));

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms", "platform" => PLATFORM).record(ms);
        counter!("ingest_records_accepted_total", "platform" => PLATFORM).increment(items.len() as u64);
        Ok(items)
    }
}

fn parse_article(key: &SourceKey, raw: RawArticle) -> Result<Item, ParseError> {
    let id = raw
        .id
        .filter(|id| *id > 0)
        .map(|id| id.to_string())
        .ok_or(ParseError::MissingId)?;
    let created_at = parse_unix_secs(&id, raw.datetime)?;

    let headline = normalize_text(raw.headline.as_deref().unwrap_or_default());
    let summary = normalize_text(raw.summary.as_deref().unwrap_or_default());
    let text = match (headline.is_empty(), summary.is_empty()) {
        (true, true) => return Err(ParseError::EmptyText { id }),
        (false, true) => headline.clone(),
        (true, false) => summary,
        (false, false) => format!("{headline}. {summary}"),
    };

    Ok(Item {
        source_key: key.clone(),
        id,
        created_at,
        payload: ItemPayload {
            text,
            url: raw.url.filter(|u| !u.trim().is_empty()),
            author: raw.source.filter(|s| !s.trim().is_empty()),
            title: (!headline.is_empty()).then_some(headline),
        },
    })
}

#[async_trait]
impl SourceAdapter for FinnhubNewsProvider {
    async fn fetch(&self, key: &SourceKey, hint: Option<&Cursor>) -> Result<Vec<Item>> {
        let url = format!("{}/api/v1/news", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("category", key.account().to_string()),
            ("token", self.api_key.clone()),
        ];
        if let Some(c) = hint.filter(|c| c.id.parse::<u64>().is_ok()) {
            query.push(("minId", c.id.clone()));
        }

        let resp = match self.client.get(&url).query(&query).send().await {
            Ok(r) => r,
            Err(e) => {
                // reqwest errors embed the URL, which carries the token
                return Err(anyhow::Error::new(e.without_url()).context("finnhub news request"));
            }
        };
        let status = resp.status();
        if !status.is_success() {
            bail!("finnhub news `{}` returned {status}", key.account());
        }
        let body = resp.text().await.context("finnhub news body")?;
        Self::parse_items_from_str(key, &body)
    }

    fn platform(&self) -> &'static str {
        PLATFORM
    }
}
