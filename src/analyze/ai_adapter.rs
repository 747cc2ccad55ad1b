//! OpenAI-backed classifier with a lexicon fallback.
//!
//! The model is asked for a strict JSON object `{label, rationale, confidence}`.
//! Any transport error, non-2xx, timeout, or malformed answer falls back to
//! [`LexiconClassifier`], tagged so consumers can tell the two apart.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::{clamp01, Classification, Classifier, DynClassifier, LexiconClassifier, SentimentLabel};
use crate::config::ClassifierConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_RATIONALE_CHARS: usize = 280;

const SYSTEM_PROMPT: &str = "You assess how a social media post or news item is likely to move US equity index futures (Dow, S&P 500) in the next trading session. \
Answer with ONE JSON object: {\"label\": one of [\"strongly_bearish\",\"bearish\",\"slightly_bearish\",\"neutral\",\"slightly_bullish\",\"bullish\",\"strongly_bullish\"], \
\"rationale\": one sentence (<=200 chars, plain ASCII), \"confidence\": number between 0 and 1}. \
Use neutral for posts with no plausible market impact.";

/// Factory: remote classifier when enabled and keyed, lexicon otherwise.
pub fn build_classifier(cfg: &ClassifierConfig) -> DynClassifier {
    match (&cfg.api_key, cfg.enabled) {
        (Some(key), true) => {
            tracing::info!(target: "analyze", model = %cfg.model, "using OpenAI classifier");
            Arc::new(OpenAiClassifier::new(key.clone(), cfg.model.clone()))
        }
        _ => {
            tracing::info!(target: "analyze", "using lexicon classifier");
            Arc::new(LexiconClassifier::new())
        }
    }
}

pub struct OpenAiClassifier {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    fallback: LexiconClassifier,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Verdict {
    label: String,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    confidence: Option<f32>,
}

impl OpenAiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: OPENAI_URL.to_string(),
            api_key,
            model,
            fallback: LexiconClassifier::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn remote(&self, text: &str) -> Result<Classification> {
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.0,
            max_tokens: 160,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("openai returned {status}");
        }
        let body: Resp = resp.json().await.context("openai response json")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai returned no content"))?;
        parse_verdict(&content)
    }

    async fn classify_impl(&self, text: &str) -> Result<Classification> {
        match self.remote(text).await {
            Ok(c) => Ok(c),
            Err(e) => {
                tracing::warn!(target: "analyze", error = %e, "openai classification failed; using lexicon");
                let mut c = self.fallback.classify_text(text);
                c.source = "lexicon-fallback".to_string();
                Ok(c)
            }
        }
    }
}

impl Classifier for OpenAiClassifier {
    fn classify<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Classification>> + Send + 'a>> {
        Box::pin(self.classify_impl(text))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn parse_verdict(content: &str) -> Result<Classification> {
    // Some models wrap JSON in a fenced block despite response_format.
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let v: Verdict = serde_json::from_str(trimmed).context("model answer is not JSON")?;
    let label = SentimentLabel::parse_loose(&v.label)
        .ok_or_else(|| anyhow!("model answered unknown label `{}`", v.label))?;
    let rationale = sanitize_rationale(&v.rationale);
    Ok(Classification {
        label,
        rationale: if rationale.is_empty() {
            "No rationale given.".to_string()
        } else {
            rationale
        },
        confidence: v.confidence.map(clamp01),
        source: "openai".to_string(),
    })
}

/// Single line, ASCII only, collapsed whitespace, capped length.
pub fn sanitize_rationale(input: &str) -> String {
    let mut out = String::with_capacity(MAX_RATIONALE_CHARS);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_ascii() => c,
            _ => ' ',
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= MAX_RATIONALE_CHARS {
            break;
        }
    }
    out.trim().to_string()
}
