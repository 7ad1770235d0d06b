//! LLM-backed threat classification
//!
//! Sends a device digest to a local model endpoint and expects a strict JSON
//! assessment back. Any failure (disabled, HTTP error, bad JSON, timeout)
//! degrades to a conservative static fallback; this module never fails a
//! scan cycle.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::registry::HistoryRecord;
use crate::risk::RiskLevel;

const DEFAULT_CLASSIFIER_TIMEOUT_MS: u64 = 8000;
const DEFAULT_CLASSIFIER_ENDPOINT: &str = "http://127.0.0.1:11434";
const DEFAULT_CLASSIFIER_MODEL: &str = "qwen3:8b";

/// Runtime classifier settings (env-driven)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub endpoint: String,
    pub model: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ClassifierSettings {
    pub fn from_env() -> Self {
        Self {
            enabled: env_parse_bool("NETGUARD_AI_ENABLED", false),
            timeout_ms: env_parse_u64(
                "NETGUARD_AI_TIMEOUT_MS",
                DEFAULT_CLASSIFIER_TIMEOUT_MS,
                500,
                60_000,
            ),
            endpoint: env_var("NETGUARD_AI_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_ENDPOINT.to_string()),
            model: env_var("NETGUARD_AI_MODEL")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Device digest submitted to the classifier
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDigest {
    pub ip: String,
    pub mac: String,
    pub vendor: Option<String>,
    pub device_type: Option<String>,
    pub risk_score: u8,
    pub is_online: bool,
}

/// Classifier verdict for a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub threat_level: RiskLevel,
    pub risk_score: u8,
    pub recommendations: Vec<String>,
    pub summary: String,
    pub should_block: bool,
}

impl ThreatAssessment {
    /// Conservative static default used whenever the classifier cannot run.
    /// Never recommends blocking on an error path.
    pub fn fallback(current_score: u8) -> Self {
        Self {
            threat_level: RiskLevel::Medium,
            risk_score: current_score,
            recommendations: vec![
                "Monitor this device closely".to_string(),
                "Review access logs".to_string(),
                "Update firewall rules".to_string(),
            ],
            summary: "Unable to complete full analysis. Device requires manual review."
                .to_string(),
            should_block: false,
        }
    }
}

/// Assess a device with the configured classifier.
///
/// Returns the fallback assessment on any failure; the only error the caller
/// ever sees is a fabricated one, so the signature is infallible.
pub async fn assess(
    settings: &ClassifierSettings,
    device: &DeviceDigest,
    history: &[HistoryRecord],
) -> ThreatAssessment {
    if !settings.enabled {
        return ThreatAssessment::fallback(device.risk_score);
    }

    match call_classifier(settings, device, history).await {
        Ok(assessment) => assessment,
        Err(e) => {
            tracing::warn!("Threat classifier failed, using fallback: {}", e);
            ThreatAssessment::fallback(device.risk_score)
        }
    }
}

async fn call_classifier(
    settings: &ClassifierSettings,
    device: &DeviceDigest,
    history: &[HistoryRecord],
) -> Result<ThreatAssessment> {
    let client = Client::builder()
        .timeout(settings.timeout())
        .build()
        .context("Failed to build classifier HTTP client")?;

    let prompt = build_prompt(device, history)?;
    let endpoint = settings.endpoint.trim_end_matches('/');
    let url = format!("{}/api/generate", endpoint);

    let response = client
        .post(url)
        .json(&json!({
            "model": settings.model,
            "prompt": prompt,
            "stream": false,
            "format": "json"
        }))
        .send()
        .await
        .context("Failed to call classifier generate endpoint")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Classifier request failed with {}: {}", status, body));
    }

    let payload: serde_json::Value = response
        .json()
        .await
        .context("Failed to parse classifier response JSON")?;
    let text = payload
        .get("response")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Classifier response missing 'response' field"))?;

    parse_assessment_json(text)
}

fn build_prompt(device: &DeviceDigest, history: &[HistoryRecord]) -> Result<String> {
    let history_context: String = history
        .iter()
        .take(10)
        .map(|h| format!("{}: {}", h.event_kind, h.details.as_deref().unwrap_or("")))
        .collect::<Vec<_>>()
        .join("\n");

    let digest_json =
        serde_json::to_string_pretty(device).context("Failed to serialize device digest")?;

    Ok(format!(
        "You are a network security expert. Analyze the following device and provide a threat assessment.\n\
Return ONLY valid JSON with this exact schema:\n\
{{\n\
  \"threat_level\": \"low|medium|high|critical\",\n\
  \"risk_score\": 0,\n\
  \"recommendations\": [\"string\"],\n\
  \"summary\": \"string\",\n\
  \"should_block\": false\n\
}}\n\
\n\
Device:\n{}\n\
\n\
Recent activity:\n{}",
        digest_json,
        if history_context.is_empty() {
            "No recent activity"
        } else {
            &history_context
        }
    ))
}

fn parse_assessment_json(raw: &str) -> Result<ThreatAssessment> {
    let trimmed = raw.trim();
    let json_slice = extract_json_object(trimmed).unwrap_or(trimmed);

    #[derive(Deserialize)]
    struct WireAssessment {
        threat_level: RiskLevel,
        risk_score: i64,
        recommendations: Vec<String>,
        summary: String,
        should_block: bool,
    }

    let wire: WireAssessment =
        serde_json::from_str(json_slice).context("Failed to parse threat assessment JSON body")?;

    if wire.summary.trim().is_empty() {
        return Err(anyhow!("Threat assessment summary is empty"));
    }

    Ok(ThreatAssessment {
        threat_level: wire.threat_level,
        // Out-of-range model output is clamped, not rejected.
        risk_score: wire.risk_score.clamp(0, 100) as u8,
        recommendations: wire.recommendations,
        summary: wire.summary,
        should_block: wire.should_block,
    })
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_bool(name: &str, default: bool) -> bool {
    match env_var(name) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_conservative() {
        let fallback = ThreatAssessment::fallback(42);
        assert_eq!(fallback.threat_level, RiskLevel::Medium);
        assert_eq!(fallback.risk_score, 42);
        assert!(!fallback.should_block);
        assert!(!fallback.recommendations.is_empty());
    }

    #[test]
    fn parse_assessment_handles_code_fence() {
        let raw = "```json\n{\"threat_level\":\"high\",\"risk_score\":75,\"recommendations\":[\"r\"],\"summary\":\"s\",\"should_block\":true}\n```";
        let parsed = parse_assessment_json(raw).expect("assessment should parse");
        assert_eq!(parsed.threat_level, RiskLevel::High);
        assert_eq!(parsed.risk_score, 75);
        assert!(parsed.should_block);
    }

    #[test]
    fn parse_assessment_clamps_out_of_range_score() {
        let raw = "{\"threat_level\":\"low\",\"risk_score\":250,\"recommendations\":[],\"summary\":\"s\",\"should_block\":false}";
        let parsed = parse_assessment_json(raw).expect("assessment should parse");
        assert_eq!(parsed.risk_score, 100);
    }

    #[test]
    fn parse_assessment_rejects_empty_summary() {
        let raw = "{\"threat_level\":\"low\",\"risk_score\":10,\"recommendations\":[],\"summary\":\"  \",\"should_block\":false}";
        assert!(parse_assessment_json(raw).is_err());
    }

    #[tokio::test]
    async fn disabled_classifier_returns_fallback() {
        let settings = ClassifierSettings {
            enabled: false,
            timeout_ms: 1000,
            endpoint: "http://127.0.0.1:1".to_string(),
            model: "none".to_string(),
        };
        let device = DeviceDigest {
            ip: "192.168.1.10".to_string(),
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            vendor: None,
            device_type: None,
            risk_score: 30,
            is_online: true,
        };
        let assessment = assess(&settings, &device, &[]).await;
        assert_eq!(assessment, ThreatAssessment::fallback(30));
    }
}
