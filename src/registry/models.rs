//! Registry row types and their string encodings
//!
//! Enums are stored as TEXT; Display writes the stored form and FromStr
//! parses it back, the same pair of impls on every enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;
use crate::router::RouterType;

/// A device as persisted in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: i64,
    pub account_id: String,
    pub ip: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub is_online: bool,
    pub is_blocked: bool,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_type: Option<RouterType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Name shown to the user: their label wins over anything observed.
    pub fn display_name(&self) -> String {
        self.custom_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.hostname.as_deref().filter(|h| !h.is_empty()))
            .or(self.device_type.as_deref())
            .unwrap_or("Unknown Device")
            .to_string()
    }
}

/// Kinds of device lifecycle events kept in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventKind {
    Connected,
    Disconnected,
    Blocked,
    Unblocked,
    RiskUpdated,
}

impl std::fmt::Display for HistoryEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryEventKind::Connected => write!(f, "connected"),
            HistoryEventKind::Disconnected => write!(f, "disconnected"),
            HistoryEventKind::Blocked => write!(f, "blocked"),
            HistoryEventKind::Unblocked => write!(f, "unblocked"),
            HistoryEventKind::RiskUpdated => write!(f, "risk_updated"),
        }
    }
}

impl std::str::FromStr for HistoryEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(HistoryEventKind::Connected),
            "disconnected" => Ok(HistoryEventKind::Disconnected),
            "blocked" => Ok(HistoryEventKind::Blocked),
            "unblocked" => Ok(HistoryEventKind::Unblocked),
            "risk_updated" => Ok(HistoryEventKind::RiskUpdated),
            _ => Err(format!("Unknown history event kind: {}", s)),
        }
    }
}

/// One device history event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub device_id: i64,
    pub event_kind: HistoryEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NewDevice,
    HighRiskDevice,
    SuspiciousActivity,
    AnomalyDetected,
    DeviceBlocked,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::NewDevice => "new_device",
            AlertType::HighRiskDevice => "high_risk_device",
            AlertType::SuspiciousActivity => "suspicious_activity",
            AlertType::AnomalyDetected => "anomaly_detected",
            AlertType::DeviceBlocked => "device_blocked",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_device" => Ok(AlertType::NewDevice),
            "high_risk_device" => Ok(AlertType::HighRiskDevice),
            "suspicious_activity" => Ok(AlertType::SuspiciousActivity),
            "anomaly_detected" => Ok(AlertType::AnomalyDetected),
            "device_blocked" => Ok(AlertType::DeviceBlocked),
            _ => Err(format!("Unknown alert type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// A persisted security alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn history_kinds_round_trip() {
        for kind in [
            HistoryEventKind::Connected,
            HistoryEventKind::Disconnected,
            HistoryEventKind::Blocked,
            HistoryEventKind::Unblocked,
            HistoryEventKind::RiskUpdated,
        ] {
            let parsed = HistoryEventKind::from_str(&kind.to_string()).expect("round trip");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn alert_types_round_trip() {
        for alert_type in [
            AlertType::NewDevice,
            AlertType::HighRiskDevice,
            AlertType::SuspiciousActivity,
            AlertType::AnomalyDetected,
            AlertType::DeviceBlocked,
        ] {
            let parsed = AlertType::from_str(alert_type.as_str()).expect("round trip");
            assert_eq!(parsed, alert_type);
        }
    }

    #[test]
    fn severities_order_by_urgency() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::High < AlertSeverity::Critical);
    }

    #[test]
    fn display_name_prefers_custom_name() {
        let record = DeviceRecord {
            id: 1,
            account_id: "acct".to_string(),
            ip: "192.168.1.9".to_string(),
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            hostname: Some("old-hostname".to_string()),
            custom_name: Some("Living Room TV".to_string()),
            device_type: Some("Samsung Smart TV".to_string()),
            vendor: None,
            is_online: true,
            is_blocked: false,
            risk_score: 0,
            risk_level: RiskLevel::Low,
            router_type: None,
            router_ip: None,
            signal: None,
            bandwidth: None,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        };
        assert_eq!(record.display_name(), "Living Room TV");
    }
}
