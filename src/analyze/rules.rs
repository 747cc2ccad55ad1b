// src/analyze/rules.rs
//! Lexicon classifier: deterministic, offline, always available.
//!
//! Scores tokens against `sentiment_lexicon.json`; a negator in the preceding
//! 1..=3 tokens flips the sign of a hit. The summed score maps onto the
//! seven-level scale.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use once_cell::sync::Lazy;

use super::{Classification, Classifier, SentimentLabel};

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).unwrap_or_default()
});

#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Returns (score, token count).
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = *LEXICON.get(tokens[i].as_str()).unwrap_or(&0);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    pub fn classify_text(&self, text: &str) -> Classification {
        let (score, n) = self.score_text(text);
        let label = label_for_score(score);
        let confidence = if score == 0 {
            0.3
        } else {
            (0.35 + 0.05 * score.unsigned_abs() as f32).min(0.6)
        };
        Classification {
            label,
            rationale: format!("Keyword score {score:+} across {n} tokens."),
            confidence: Some(confidence),
            source: "lexicon".to_string(),
        }
    }
}

pub fn label_for_score(score: i32) -> SentimentLabel {
    match score {
        i32::MIN..=-5 => SentimentLabel::StronglyBearish,
        -4..=-2 => SentimentLabel::Bearish,
        -1 => SentimentLabel::SlightlyBearish,
        0 => SentimentLabel::Neutral,
        1 => SentimentLabel::SlightlyBullish,
        2..=4 => SentimentLabel::Bullish,
        _ => SentimentLabel::StronglyBullish,
    }
}

impl Classifier for LexiconClassifier {
    fn classify<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Classification>> + Send + 'a>> {
        let out = self.classify_text(text);
        Box::pin(async move { Ok(out) })
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

/// Alphanumeric, lower-case tokens. Apostrophes stay inside words so that
/// "won't" is one token.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "without"
            | "don't"
            | "doesn't"
    )
}
