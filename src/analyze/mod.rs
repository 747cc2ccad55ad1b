// src/analyze/mod.rs
//! Directional classification of post text.
//!
//! Every classifier answers with one of seven ordered [`SentimentLabel`]s plus a
//! short rationale. When the remote model is unavailable the lexicon rules in
//! [`rules`] answer instead, so a post is never left unclassified.

pub mod ai_adapter;
pub mod rules;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use crate::analyze::ai_adapter::{build_classifier, OpenAiClassifier};
pub use crate::analyze::rules::LexiconClassifier;

/// Expected market direction, most bearish first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    StronglyBearish,
    Bearish,
    SlightlyBearish,
    Neutral,
    SlightlyBullish,
    Bullish,
    StronglyBullish,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 7] = [
        SentimentLabel::StronglyBearish,
        SentimentLabel::Bearish,
        SentimentLabel::SlightlyBearish,
        SentimentLabel::Neutral,
        SentimentLabel::SlightlyBullish,
        SentimentLabel::Bullish,
        SentimentLabel::StronglyBullish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::StronglyBearish => "strongly_bearish",
            SentimentLabel::Bearish => "bearish",
            SentimentLabel::SlightlyBearish => "slightly_bearish",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::SlightlyBullish => "slightly_bullish",
            SentimentLabel::Bullish => "bullish",
            SentimentLabel::StronglyBullish => "strongly_bullish",
        }
    }

    /// Lenient parse for model output: case, spaces and hyphens are ignored.
    pub fn parse_loose(s: &str) -> Option<Self> {
        let norm: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Self::ALL.into_iter().find(|l| l.as_str() == norm)
    }

    /// Signed position on the scale, -3 ..= 3.
    pub fn score(self) -> i8 {
        self as i8 - 3
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SentimentLabel::StronglyBearish => "Strongly bearish",
            SentimentLabel::Bearish => "Bearish",
            SentimentLabel::SlightlyBearish => "Slightly bearish",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::SlightlyBullish => "Slightly bullish",
            SentimentLabel::Bullish => "Bullish",
            SentimentLabel::StronglyBullish => "Strongly bullish",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SentimentLabel,
    pub rationale: String,
    /// In `[0, 1]` when the classifier reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Which classifier produced this, e.g. `openai`, `lexicon`, `fallback`.
    pub source: String,
}

impl Classification {
    /// Deterministic default used when classification itself failed.
    pub fn fallback(reason: impl fmt::Display) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            rationale: format!("Classifier unavailable ({reason}); defaulting to neutral."),
            confidence: None,
            source: "fallback".to_string(),
        }
    }
}

/// Classifier interface. Must not block indefinitely; errors are turned into
/// [`Classification::fallback`] by the caller.
pub trait Classifier: Send + Sync {
    fn classify<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Classification>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

pub(crate) fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
