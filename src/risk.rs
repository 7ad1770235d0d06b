//! Risk scoring and anomaly detection
//!
//! Computes a 0-100 risk score from device attributes, derives the discrete
//! risk level, and flags behavioral anomalies from history counters.

use serde::{Deserialize, Serialize};

use crate::config::{
    ANOMALY_CHURN_THRESHOLD, RISK_NEW_DEVICE, RISK_UNKNOWN_TYPE, RISK_UNKNOWN_VENDOR,
    RISK_WATCHED_TYPE,
};

/// Discrete risk classification derived from the 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Step function over the score: <40 low, 40-59 medium, 60-79 high, >=80 critical
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=39 => RiskLevel::Low,
            40..=59 => RiskLevel::Medium,
            60..=79 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Compute a device's risk score from weighted factors, clamped to 0-100.
pub fn score(vendor: Option<&str>, device_type: Option<&str>, is_newly_observed: bool) -> u8 {
    let mut total: u16 = 0;

    if is_newly_observed {
        total += RISK_NEW_DEVICE as u16;
    }
    if is_unresolved_vendor(vendor) {
        total += RISK_UNKNOWN_VENDOR as u16;
    }
    if is_unresolved_type(device_type) {
        total += RISK_UNKNOWN_TYPE as u16;
    }
    if is_watched_type(device_type) {
        total += RISK_WATCHED_TYPE as u16;
    }

    total.min(100) as u8
}

fn is_unresolved_vendor(vendor: Option<&str>) -> bool {
    match vendor {
        None => true,
        Some(v) => {
            let lower = v.to_lowercase();
            lower.is_empty() || lower == "unknown" || lower == "unknown vendor"
        }
    }
}

fn is_unresolved_type(device_type: Option<&str>) -> bool {
    match device_type {
        None => true,
        Some(t) => {
            let lower = t.to_lowercase();
            lower.is_empty()
                || lower == "unknown"
                || lower == "unknown device"
                || lower.contains("network device")
        }
    }
}

fn is_watched_type(device_type: Option<&str>) -> bool {
    match device_type {
        None => false,
        Some(t) => {
            let lower = t.to_lowercase();
            lower.contains("smart tv")
                || lower.contains(" tv")
                || lower.ends_with("tv")
                || lower.contains("camera")
                || lower.contains("printer")
        }
    }
}

/// Severity attached to an anomaly signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::Low => "low",
            AnomalySeverity::Medium => "medium",
            AnomalySeverity::High => "high",
        }
    }
}

/// Result of the heuristic anomaly check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub is_anomaly: bool,
    pub reason: String,
    pub severity: AnomalySeverity,
}

/// Detect behavioral anomalies for a device.
///
/// First matching rule wins; reasons are never stacked. Absence of a signal
/// is not an anomaly.
pub fn detect_anomaly(
    device_type: Option<&str>,
    risk_score: u8,
    connected_events: i64,
    disconnected_events: i64,
) -> AnomalyReport {
    if connected_events > ANOMALY_CHURN_THRESHOLD && disconnected_events > ANOMALY_CHURN_THRESHOLD {
        return AnomalyReport {
            is_anomaly: true,
            reason: "Device showing unusual connection patterns".to_string(),
            severity: AnomalySeverity::Medium,
        };
    }

    if risk_score > 80 {
        return AnomalyReport {
            is_anomaly: true,
            reason: "Device has critical risk score".to_string(),
            severity: AnomalySeverity::High,
        };
    }

    if is_unresolved_type(device_type) && risk_score > 50 {
        return AnomalyReport {
            is_anomaly: true,
            reason: "Unknown device with elevated risk".to_string(),
            severity: AnomalySeverity::Medium,
        };
    }

    AnomalyReport {
        is_anomaly: false,
        reason: "Device behavior appears normal".to_string(),
        severity: AnomalySeverity::Low,
    }
}
