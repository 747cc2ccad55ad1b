// src/notify/webhook.rs
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};

/// Upper bound on attempts per endpoint.
pub const MAX_ATTEMPTS: u8 = 6;
const MAX_BACKOFF: Duration = Duration::from_secs(8);

fn retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Delay before retry number `attempt` (1-based): 500ms doubling, capped at 8s.
fn backoff(attempt: u8) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    Duration::from_millis(500u64 << shift).min(MAX_BACKOFF)
}

/// POST a JSON body, retrying network errors, 5xx and 429 with exponential
/// backoff (500ms, 1s, 2s, ...). Other 4xx answers fail immediately.
/// `max_retries` is clamped to `1..=MAX_ATTEMPTS`.
pub async fn post_json_with_retries(
    client: &Client,
    url: &str,
    body: &serde_json::Value,
    timeout: Duration,
    max_retries: u8,
) -> Result<()> {
    let max_retries = max_retries.clamp(1, MAX_ATTEMPTS);
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        let res = client.post(url).timeout(timeout).json(body).send().await;

        match res {
            Ok(rsp) => {
                let status = rsp.status();
                if status.is_success() {
                    return Ok(());
                }
                if retryable(status) && attempt < max_retries {
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                return Err(anyhow!("webhook HTTP error: {status}"));
            }
            Err(e) => {
                if attempt < max_retries {
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                // without_url: the path of a webhook is its credential
                return Err(anyhow!("webhook request failed: {}", e.without_url()));
            }
        }
    }
}
