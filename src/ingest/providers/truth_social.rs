// src/ingest/providers/truth_social.rs
//! Truth Social statuses via its Mastodon-compatible API.
//! Source keys look like `truthsocial:<handle>`. Needs a pre-minted bearer token.

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

pub const PLATFORM: &str = "truthsocial";
pub const DEFAULT_BASE_URL: &str = "https://truthsocial.com";

// Cloudflare in front of the API rejects default client UAs.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct AccountLookup {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    id: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    content: Option<String>,
    url: Option<String>,
    uri: Option<String>,
    account: Option<RawAccount>,
    reblog: Option<Box<RawStatus>>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    username: Option<String>,
    display_name: Option<String>,
}

pub struct TruthSocialProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
    limit: u8,
    // handle -> account id; owned by this adapter for the process lifetime
    account_ids: RwLock<HashMap<String, String>>,
}

impl TruthSocialProvider {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(12))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
            limit: 20,
            account_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_limit(mut self, n: u8) -> Self {
        self.limit = n.clamp(1, 40);
        self
    }

    async fn account_id(&self, handle: &str) -> Result<String> {
        let cache_key = handle.to_ascii_lowercase();
        if let Some(id) = self.account_ids.read().await.get(&cache_key) {
            return Ok(id.clone());
        }

        let url = format!("{}/api/v1/accounts/lookup", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("acct", handle)])
            .send()
            .await
            .context("truthsocial account lookup request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("truthsocial lookup for `{handle}` returned {status}");
        }
        let acct: AccountLookup = resp.json().await.context("truthsocial lookup json")?;

        self.account_ids
            .write()
            .await
            .insert(cache_key, acct.id.clone());
        Ok(acct.id)
    }

    fn parse_statuses(key: &SourceKey, body: &str) -> Result<Vec<Item>> {
        let raw: Vec<RawStatus> =
            serde_json::from_str(body).context("parsing truthsocial statuses json")?;
        let items = accept_records(key, raw.into_iter().map(|s| parse_status(key, s)));
        counter!("ingest_records_accepted_total", "platform" => PLATFORM).increment(items.len() as u64);
        Ok(items)
    }
}

fn parse_status(key: &SourceKey, raw: RawStatus) -> Result<Item, ParseError> {
    let id = require_id(raw.id.as_deref())?;
    let created_at = parse_rfc3339(&id, raw.created_at.as_deref())?;

    let own = normalize_text(raw.content.as_deref().unwrap_or_default());
    let text = if !own.is_empty() {
        own
    } else if let Some(rb) = raw.reblog.as_deref() {
        // Plain re-truths carry no content of their own
        let inner = normalize_text(rb.content.as_deref().unwrap_or_default());
        let by = rb
            .account
            .as_ref()
            .and_then(|a| a.username.as_deref())
            .unwrap_or("unknown");
        if inner.is_empty() {
            String::new()
        } else {
            format!("RT @{by}: {inner}")
        }
    } else {
        String::new()
    };
    if text.is_empty() {
        return Err(ParseError::EmptyText { id });
    }

    let author = raw
        .account
        .as_ref()
        .and_then(|a| {
            a.display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .or_else(|| a.username.clone())
        })
        .or_else(|| Some(format!("@{}", key.account())));

    Ok(Item {
        source_key: key.clone(),
        id,
        created_at,
        payload: ItemPayload {
            text,
            url: raw.url.or(raw.uri),
            author,
            title: None,
        },
    })
}

#[async_trait]
impl SourceAdapter for TruthSocialProvider {
    async fn fetch(&self, key: &SourceKey, hint: Option<&Cursor>) -> Result<Vec<Item>> {
        let account_id = self.account_id(key.account()).await?;
        let url = format!("{}/api/v1/accounts/{}/statuses", self.base_url, account_id);

        let mut query: Vec<(&str, String)> = vec![
            ("exclude_replies", "true".to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(c) = hint {
            query.push(("since_id", c.id.clone()));
        }

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await
            .context("truthsocial statuses request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("truthsocial statuses for `{}` returned {status}", key.account());
        }
        let body = resp.text().await.context("truthsocial statuses body")?;
        Self::parse_statuses(key, &body)
    }

    fn platform(&self) -> &'static str {
        PLATFORM
    }
}
