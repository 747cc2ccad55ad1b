// src/store/kv.rs
//! Durable cursor backend speaking the Upstash / Vercel KV REST dialect:
//! `GET {base}/get/{key}` and `POST {base}/set/{key}` with a bearer token,
//! both answering `{"result": ...}` or `{"error": "..."}`.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use super::{record_key, CursorStore};
use crate::cursor::{Cursor, SourceKey};

#[derive(Debug, Deserialize)]
struct KvResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct KvCursorStore {
    base: Url,
    token: String,
    key_prefix: String,
    client: Client,
}

impl KvCursorStore {
    pub fn new(base_url: &str, token: String, key_prefix: String) -> Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid KV_REST_API_URL `{base_url}`"))?;
        if base.cannot_be_a_base() {
            bail!("KV_REST_API_URL `{base_url}` cannot be used as a base URL");
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()
            .context("building KV http client")?;
        Ok(Self {
            base,
            token,
            key_prefix,
            client,
        })
    }

    fn command_url(&self, command: &str, key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty().push(command).push(key);
        }
        url
    }

    async fn read_response(resp: reqwest::Response, op: &str) -> Result<Option<Value>> {
        let status = resp.status();
        let body: KvResponse = resp
            .json()
            .await
            .with_context(|| format!("decoding KV {op} response (status {status})"))?;
        if let Some(err) = body.error {
            bail!("KV {op} failed (status {status}): {err}");
        }
        if !status.is_success() {
            bail!("KV {op} failed with status {status}");
        }
        Ok(body.result)
    }
}

/// Stored values are JSON text, but some clients write the object directly.
fn decode_cursor(result: Value) -> Result<Option<Cursor>> {
    match result {
        Value::Null => Ok(None),
        Value::String(s) => serde_json::from_str(&s)
            .map(Some)
            .context("decoding cursor JSON string"),
        obj @ Value::Object(_) => serde_json::from_value(obj)
            .map(Some)
            .context("decoding cursor object"),
        other => Err(anyhow!("unexpected KV cursor value: {other}")),
    }
}

#[async_trait::async_trait]
impl CursorStore for KvCursorStore {
    async fn get(&self, key: &SourceKey) -> Result<Option<Cursor>> {
        let rk = record_key(&self.key_prefix, key);
        let resp = self
            .client
            .get(self.command_url("get", &rk))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("KV get `{rk}`"))?;
        match Self::read_response(resp, "get").await? {
            Some(v) => decode_cursor(v),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &SourceKey, cursor: &Cursor) -> Result<()> {
        let rk = record_key(&self.key_prefix, key);
        let body = serde_json::to_string(cursor).context("encoding cursor")?;
        let resp = self
            .client
            .post(self.command_url("set", &rk))
            .bearer_auth(&self.token)
            .body(body)
            .send()
            .await
            .with_context(|| format!("KV set `{rk}`"))?;
        Self::read_response(resp, "set").await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "kv"
    }
}
