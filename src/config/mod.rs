// src/config/mod.rs
//! Process configuration, assembled once at startup from the environment
//! (after `.env` is loaded) and an optional sources file.

pub mod ai;
pub mod sources;

use anyhow::Result;

pub use ai::ClassifierConfig;
pub use sources::SourceSpec;

use crate::cursor::SourceKey;
use crate::ingest::providers::{finnhub, truth_social, x};

pub const DEFAULT_ACCOUNT: &str = "realDonaldTrump";
pub const DEFAULT_NEWS_CATEGORY: &str = "general";

/// Cursor backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Kv {
        url: String,
        token: String,
        key_prefix: String,
    },
    /// Process-local and non-durable.
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub x_bearer_token: Option<String>,
    pub truthsocial_token: Option<String>,
    pub truthsocial_base_url: Option<String>,
    pub finnhub_api_key: Option<String>,
}

/// Per-request page sizes; `None` keeps the adapter default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchLimits {
    pub x_max_results: Option<u8>,
    pub truthsocial_limit: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// All configured source keys, de-duplicated, in configuration order.
    pub sources: Vec<SourceKey>,
    pub credentials: Credentials,
    pub limits: FetchLimits,
    pub store: StoreConfig,
    pub webhook_urls: Vec<String>,
    /// Bearer token guarding the trigger endpoint; `None` leaves it open.
    pub cron_secret: Option<String>,
    pub classifier: ClassifierConfig,
    /// In-process schedule; 0 means "external trigger only".
    pub poll_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = Credentials {
            x_bearer_token: get("X_BEARER_TOKEN"),
            truthsocial_token: get("TRUTHSOCIAL_TOKEN"),
            truthsocial_base_url: get("TRUTHSOCIAL_BASE_URL"),
            finnhub_api_key: get("FINNHUB_API_KEY"),
        };

        let store = match (get("KV_REST_API_URL"), get("KV_REST_API_TOKEN")) {
            (Some(url), Some(token)) => StoreConfig::Kv {
                url,
                token,
                key_prefix: get("CURSOR_KEY_PREFIX").unwrap_or_default(),
            },
            _ => StoreConfig::Memory,
        };

        let mut specs: Vec<SourceSpec> = Vec::new();
        let from_file = sources::load_sources_default(get("SOURCES_PATH").as_deref())?;
        let have_file = from_file.is_some();
        specs.extend(from_file.unwrap_or_default());

        let env_lists = [
            (x::PLATFORM, "X_ACCOUNTS", credentials.x_bearer_token.is_some(), DEFAULT_ACCOUNT),
            (
                truth_social::PLATFORM,
                "TRUTHSOCIAL_ACCOUNTS",
                credentials.truthsocial_token.is_some(),
                DEFAULT_ACCOUNT,
            ),
            (
                finnhub::PLATFORM,
                "FINNHUB_CATEGORIES",
                credentials.finnhub_api_key.is_some(),
                DEFAULT_NEWS_CATEGORY,
            ),
        ];
        for (platform, var, has_credential, default_account) in env_lists {
            let accounts = match get(var) {
                Some(raw) => sources::split_list(&raw),
                // Credential without an explicit list: poll the default feed,
                // unless a sources file already decides what to poll.
                None if has_credential && !have_file => vec![default_account.to_string()],
                None => Vec::new(),
            };
            specs.extend(accounts.into_iter().map(|account| SourceSpec {
                platform: platform.to_string(),
                account,
            }));
        }

        let mut sources_out: Vec<SourceKey> = Vec::new();
        for spec in &specs {
            let key = spec.key()?;
            if !sources_out.contains(&key) {
                sources_out.push(key);
            }
        }

        let webhook_urls = get("WEBHOOK_URLS")
            .map(|raw| sources::split_list(&raw))
            .unwrap_or_default();

        let limits = FetchLimits {
            x_max_results: get("X_MAX_RESULTS").and_then(|v| v.parse::<u8>().ok()),
            truthsocial_limit: get("TRUTHSOCIAL_LIMIT").and_then(|v| v.parse::<u8>().ok()),
        };

        let poll_interval_secs = get("POLL_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(Self {
            sources: sources_out,
            credentials,
            limits,
            store,
            webhook_urls,
            cron_secret: get("CRON_SECRET"),
            classifier: ClassifierConfig::from_lookup(&lookup),
            poll_interval_secs,
        })
    }
}
