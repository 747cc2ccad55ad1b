use serde::Serialize;

use super::AlertPayload;
use crate::analyze::SentimentLabel;

// Discord rejects embeds over these sizes.
const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;

#[derive(Debug, Serialize)]
pub struct DiscordEmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    color: u32,
    timestamp: String,
    fields: Vec<DiscordEmbedField>,
}

#[derive(Debug, Serialize)]
pub struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    pub fn from_alert(alert: &AlertPayload) -> Self {
        let who = alert.author.as_deref().unwrap_or(alert.account.as_str());
        let title = truncate(&format!("{} | {} ({})", alert.label, who, alert.platform), MAX_TITLE);

        let confidence = alert
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "n/a".to_string());

        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title,
                description: truncate(&alert.text, MAX_DESCRIPTION),
                url: alert.url.clone(),
                color: color_for(alert.label),
                timestamp: alert.created_at.to_rfc3339(),
                fields: vec![
                    DiscordEmbedField {
                        name: "Rationale".to_string(),
                        value: truncate(&alert.rationale, 1024),
                        inline: false,
                    },
                    DiscordEmbedField {
                        name: "Confidence".to_string(),
                        value: confidence,
                        inline: true,
                    },
                    DiscordEmbedField {
                        name: "Classifier".to_string(),
                        value: alert.classifier.clone(),
                        inline: true,
                    },
                ],
            }],
        }
    }
}

fn color_for(label: SentimentLabel) -> u32 {
    match label {
        SentimentLabel::StronglyBearish => 0x992D22,
        SentimentLabel::Bearish => 0xE74C3C,
        SentimentLabel::SlightlyBearish => 0xF1948A,
        SentimentLabel::Neutral => 0x95A5A6,
        SentimentLabel::SlightlyBullish => 0x82E0AA,
        SentimentLabel::Bullish => 0x2ECC71,
        SentimentLabel::StronglyBullish => 0x1E8449,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
