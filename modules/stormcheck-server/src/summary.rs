//! Claude-backed plain-language summaries for verified alerts.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stormcheck_common::Alert;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const SUMMARY_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 512;

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct SummaryClient {
    http: reqwest::Client,
    api_key: String,
}

impl SummaryClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).context("Invalid API key")?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// One- or two-sentence summary of a verified alert and its ground
    /// truth, suitable for a dashboard card.
    pub async fn summarize(&self, alert: &Alert) -> Result<String> {
        let request = MessagesRequest {
            model: SUMMARY_MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user".to_string(),
                content: summary_prompt(alert),
            }],
        };

        debug!(alert_id = %alert.id, "Requesting alert summary");

        let response = self
            .http
            .post(format!("{}/messages", ANTHROPIC_API_URL))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .context("Failed to send summary request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Summary request failed ({}): {}", status, error_text);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse summary response")?;

        let text = body
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!("Summary response contained no text");
        }
        Ok(text)
    }
}

fn summary_prompt(alert: &Alert) -> String {
    let mut facts = vec![
        format!("Event: {}", alert.event),
        format!("Severity: {}", alert.severity),
        format!("Area: {}", alert.area_desc),
        format!(
            "In effect: {} to {}",
            alert.effective.to_rfc3339(),
            alert.expires.to_rfc3339()
        ),
    ];
    if let Some(size) = alert.params.hail_size_in {
        facts.push(format!("Forecast hail size: {size} inches"));
    }
    if let Some(speed) = alert.params.wind_speed_mph {
        facts.push(format!("Forecast wind speed: {speed} mph"));
    }
    facts.push(format!(
        "Ground-truth storm reports matched: {}",
        alert.matched_report_ids.len()
    ));
    if let Some(confidence) = alert.match_confidence {
        facts.push(format!("Match confidence: {confidence}"));
    }

    format!(
        "Write one or two plain sentences summarizing this severe weather alert \
         and whether observed storm reports confirmed it. No preamble.\n\n{}",
        facts.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use stormcheck_common::{AlertStatus, Severity, WarningParams};

    #[test]
    fn prompt_includes_extracted_magnitudes() {
        let now = Utc::now();
        let alert = Alert {
            id: "a1".into(),
            event: "Severe Thunderstorm Warning".into(),
            severity: Severity::Severe,
            headline: None,
            description: String::new(),
            area_desc: "Cleveland, OK".into(),
            sent: now,
            effective: now,
            expires: now,
            polygon: None,
            bbox: None,
            area_codes: vec![],
            params: WarningParams {
                hail_size_in: Some(1.75),
                wind_speed_mph: Some(60.0),
            },
            status: AlertStatus::Verified,
            match_confidence: Some(0.9),
            match_method: None,
            matched_report_ids: vec!["r1".into(), "r2".into()],
            verified_at: Some(now),
            summary: None,
            fingerprint: "fp".into(),
            first_seen_at: now,
            last_seen_at: now,
        };

        let prompt = summary_prompt(&alert);
        assert!(prompt.contains("1.75 inches"));
        assert!(prompt.contains("60 mph"));
        assert!(prompt.contains("reports matched: 2"));
        assert!(prompt.contains("confidence: 0.9"));
    }

    #[test]
    fn response_parsing_skips_non_text_blocks() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"thinking","text":""},{"type":"text","text":" A verified warning. "}]}"#,
        )
        .unwrap();
        let text = body
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.trim().to_string())
            .unwrap_or_default();
        assert_eq!(text, "A verified warning.");
    }
}
