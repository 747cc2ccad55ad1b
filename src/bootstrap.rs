// src/bootstrap.rs
//! Wire the runtime from [`AppConfig`]: one adapter per platform with a
//! credential, one binding per configured source key, plus store, classifier
//! and notifier. Everything is constructed once and owned by the [`Poller`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::analyze::build_classifier;
use crate::config::{AppConfig, Credentials, FetchLimits};
use crate::ingest::providers::{finnhub, truth_social, x};
use crate::ingest::types::SourceAdapter;
use crate::notify::WebhookNotifier;
use crate::poller::{Poller, SourceBinding};
use crate::store;

pub struct Runtime {
    pub poller: Arc<Poller>,
    pub cron_secret: Option<String>,
    pub poll_interval_secs: u64,
}

impl Runtime {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let adapters = build_adapters(&cfg.credentials, cfg.limits);

        let mut bindings = Vec::with_capacity(cfg.sources.len());
        for key in &cfg.sources {
            match adapters.get(key.platform()) {
                Some(adapter) => bindings.push(SourceBinding::new(key.clone(), adapter.clone())),
                None => warn!(
                    target: "bootstrap",
                    source_key = %key,
                    "no credential for platform; source disabled"
                ),
            }
        }

        let store = store::from_config(&cfg.store)?;
        let classifier = build_classifier(&cfg.classifier);
        let notifier = WebhookNotifier::new(cfg.webhook_urls.iter().cloned());

        // Safe diagnostics only: counts and names, never secrets.
        info!(
            target: "bootstrap",
            sources = bindings.len(),
            store = store.backend_name(),
            classifier = classifier.name(),
            webhooks = notifier.endpoints().len(),
            trigger_auth = cfg.cron_secret.is_some(),
            "runtime ready"
        );
        if bindings.is_empty() {
            warn!(target: "bootstrap", "no sources enabled; cycles will be empty");
        }
        if cfg.cron_secret.is_none() {
            warn!(target: "bootstrap", "CRON_SECRET not set; trigger endpoint is unauthenticated");
        }

        let poller = Poller::new(bindings, store, classifier, Arc::new(notifier));
        Ok(Self {
            poller: Arc::new(poller),
            cron_secret: cfg.cron_secret.clone(),
            poll_interval_secs: cfg.poll_interval_secs,
        })
    }
}

fn build_adapters(
    creds: &Credentials,
    limits: FetchLimits,
) -> HashMap<&'static str, Arc<dyn SourceAdapter>> {
    let mut out: HashMap<&'static str, Arc<dyn SourceAdapter>> = HashMap::new();
    if let Some(token) = &creds.x_bearer_token {
        let mut p = x::XProvider::new(token.clone());
        if let Some(n) = limits.x_max_results {
            p = p.with_max_results(n);
        }
        out.insert(x::PLATFORM, Arc::new(p));
    }
    if let Some(token) = &creds.truthsocial_token {
        let mut p = truth_social::TruthSocialProvider::new(token.clone());
        if let Some(base) = &creds.truthsocial_base_url {
            p = p.with_base_url(base.clone());
        }
        if let Some(n) = limits.truthsocial_limit {
            p = p.with_limit(n);
        }
        out.insert(truth_social::PLATFORM, Arc::new(p));
    }
    if let Some(key) = &creds.finnhub_api_key {
        out.insert(finnhub::PLATFORM, Arc::new(finnhub::FinnhubNewsProvider::new(key.clone())));
    }
    out
}
