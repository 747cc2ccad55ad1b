// src/ingest/providers/x.rs
//! X (Twitter) API v2 user timelines. Source keys look like `twitter:<handle>`.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::cursor::{Cursor, SourceKey};
use crate::ingest::types::{Item, ItemPayload, ParseError, SourceAdapter};
use crate::ingest::{accept_records, normalize_text, parse_rfc3339, require_id};

pub const PLATFORM: &str = "twitter";
const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

#[derive(Debug, Deserialize)]
struct UserLookup {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    data: Vec<RawTweet>,
}

#[derive(Debug, Deserialize)]
struct RawTweet {
    id: Option<String>,
    text: Option<String>,
    created_at: Option<String>,
}

pub struct XProvider {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    max_results: u8,
    // handle -> numeric user id; owned by this adapter for the process lifetime
    user_ids: RwLock<HashMap<String, String>>,
}

impl XProvider {
    pub fn new(bearer_token: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            bearer_token,
            max_results: 20,
            user_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Clamped to the API's accepted 5..=100.
    pub fn with_max_results(mut self, n: u8) -> Self {
        self.max_results = n.clamp(5, 100);
        self
    }

    async fn user_id(&self, handle: &str) -> Result<String> {
        let cache_key = handle.to_ascii_lowercase();
        if let Some(id) = self.user_ids.read().await.get(&cache_key) {
            return Ok(id.clone());
        }

        let url = format!("{}/2/users/by/username/{}", self.base_url, handle);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .context("x user lookup request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("x user lookup for `{handle}` returned {status}");
        }
        let body: UserLookup = resp.json().await.context("x user lookup json")?;
        let Some(user) = body.data else {
            bail!("x user `{handle}` not found");
        };

        self.user_ids
            .write()
            .await
            .insert(cache_key, user.id.clone());
        Ok(user.id)
    }

    fn parse_timeline(key: &SourceKey, body: &str) -> Result<Vec<Item>> {
        let tl: Timeline = serde_json::from_str(body).context("parsing x timeline json")?;
        let items = accept_records(key, tl.data.into_iter().map(|t| parse_tweet(key, t)));
        counter!("ingest_records_accepted_total", "platform" => PLATFORM).increment(items.len() as u64);
        Ok(items)
    }
}

fn parse_tweet(key: &SourceKey, raw: RawTweet) -> Result<Item, ParseError> {
    let id = require_id(raw.id.as_deref())?;
    let created_at = parse_rfc3339(&id, raw.created_at.as_deref())?;
    let text = normalize_text(raw.text.as_deref().unwrap_or_default());
    if text.is_empty() {
        return Err(ParseError::EmptyText { id });
    }
    let url = format!("https://x.com/{}/status/{}", key.account(), id);
    Ok(Item {
        source_key: key.clone(),
        id,
        created_at,
        payload: ItemPayload {
            text,
            url: Some(url),
            author: Some(format!("@{}", key.account())),
            title: None,
        },
    })
}

#[async_trait]
impl SourceAdapter for XProvider {
    async fn fetch(&self, key: &SourceKey, hint: Option<&Cursor>) -> Result<Vec<Item>> {
        let user_id = self.user_id(key.account()).await?;
        let url = format!("{}/2/users/{}/tweets", self.base_url, user_id);

        let mut query: Vec<(&str, String)> = vec![
            ("max_results", self.max_results.to_string()),
            ("tweet.fields", "created_at".to_string()),
            ("exclude", "retweets,replies".to_string()),
        ];
        // since_id must be a tweet id; anything else would be rejected upstream
        if let Some(c) = hint.filter(|c| c.id.chars().all(|ch| ch.is_ascii_digit())) {
            query.push(("since_id", c.id.clone()));
        }

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(&query)
            .send()
            .await
            .context("x timeline request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("x timeline for `{}` returned {status}", key.account());
        }
        let body = resp.text().await.context("x timeline body")?;
        Self::parse_timeline(key, &body)
    }

    fn platform(&self) -> &'static str {
        PLATFORM
    }
}
