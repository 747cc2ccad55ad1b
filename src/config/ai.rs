// src/config/ai.rs
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Classifier settings. The remote model is used only when `enabled` and a key
/// is present; otherwise the lexicon classifier answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: default_model(),
        }
    }
}

impl ClassifierConfig {
    /// `OPENAI_API_KEY`, `CLASSIFIER_MODEL`, `CLASSIFIER_ENABLED` (defaults to
    /// on when a key is present).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let enabled = match lookup("CLASSIFIER_ENABLED") {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
            None => api_key.is_some(),
        };
        let model = lookup("CLASSIFIER_MODEL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_model);
        Self {
            enabled,
            api_key,
            model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn enabled_by_key_presence_unless_overridden() {
        let c = ClassifierConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-x")]));
        assert!(c.enabled);
        assert_eq!(c.model, DEFAULT_MODEL);

        let off = ClassifierConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-x"),
            ("CLASSIFIER_ENABLED", "false"),
        ]));
        assert!(!off.enabled);

        let none = ClassifierConfig::from_lookup(lookup(&[]));
        assert!(!none.enabled);
        assert!(none.api_key.is_none());
    }
}
