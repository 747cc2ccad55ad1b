// src/notify/mod.rs
//! Fan-out delivery of classified items to webhook consumers.
//!
//! Each configured endpoint is attempted independently and concurrently; one
//! endpoint failing never suppresses the others. The caller only learns how
//! many endpoints accepted the payload.

pub mod discord;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;

use crate::analyze::{Classification, SentimentLabel};
use crate::ingest::types::Item;

/// Structured payload handed to every endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertPayload {
    pub source_key: String,
    pub platform: String,
    pub account: String,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub label: SentimentLabel,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub classifier: String,
}

impl AlertPayload {
    pub fn new(item: &Item, c: &Classification) -> Self {
        Self {
            source_key: item.source_key.to_string(),
            platform: item.source_key.platform().to_string(),
            account: item.source_key.account().to_string(),
            item_id: item.id.clone(),
            created_at: item.created_at,
            text: item.payload.text.clone(),
            url: item.payload.url.clone(),
            author: item.payload.author.clone(),
            title: item.payload.title.clone(),
            label: c.label,
            rationale: c.rationale.clone(),
            confidence: c.confidence,
            classifier: c.source.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver to every endpoint; returns how many accepted it.
    async fn deliver(&self, payload: &AlertPayload) -> usize;
    fn endpoint_count(&self) -> usize;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Body shape an endpoint expects, chosen from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Discord,
    Json,
}

impl EndpointKind {
    pub fn detect(url: &str) -> Self {
        let u = url.to_ascii_lowercase();
        if u.contains("discord.com/api/webhooks") || u.contains("discordapp.com/api/webhooks") {
            EndpointKind::Discord
        } else {
            EndpointKind::Json
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    pub url: String,
    pub kind: EndpointKind,
}

impl WebhookEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = EndpointKind::detect(&url);
        Self { url, kind }
    }

    /// Scheme + host only; webhook paths usually embed secrets.
    pub fn redacted(&self) -> String {
        match reqwest::Url::parse(&self.url) {
            Ok(u) => format!("{}://{}", u.scheme(), u.host_str().unwrap_or("?")),
            Err(_) => "<invalid url>".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct WebhookNotifier {
    endpoints: Vec<WebhookEndpoint>,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: urls.into_iter().map(WebhookEndpoint::new).collect(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Attempts per endpoint, clamped to `1..=webhook::MAX_ATTEMPTS`.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, webhook::MAX_ATTEMPTS);
        self
    }

    pub fn endpoints(&self) -> &[WebhookEndpoint] {
        &self.endpoints
    }

    async fn send_one(&self, ep: &WebhookEndpoint, payload: &AlertPayload) -> anyhow::Result<()> {
        let body = match ep.kind {
            EndpointKind::Discord => {
                serde_json::to_value(discord::DiscordWebhookPayload::from_alert(payload))?
            }
            EndpointKind::Json => serde_json::to_value(payload)?,
        };
        webhook::post_json_with_retries(
            &self.client,
            &ep.url,
            &body,
            self.timeout,
            self.max_retries,
        )
        .await
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, payload: &AlertPayload) -> usize {
        if self.endpoints.is_empty() {
            tracing::debug!(target: "notify", "no webhook endpoints configured");
            return 0;
        }

        let results = join_all(self.endpoints.iter().map(|ep| async move {
            let r = self.send_one(ep, payload).await;
            (ep, r)
        }))
        .await;

        let mut accepted = 0usize;
        for (ep, r) in results {
            match r {
                Ok(()) => {
                    accepted += 1;
                    counter!("poll_deliveries_total").increment(1);
                }
                Err(e) => {
                    counter!("poll_delivery_failures_total").increment(1);
                    tracing::warn!(
                        target: "notify",
                        endpoint = %ep.redacted(),
                        item_id = %payload.item_id,
                        error = %e,
                        "webhook delivery failed"
                    );
                }
            }
        }
        accepted
    }

    fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}
