//! Alert delivery
//!
//! A small trait seam so scan cycles can raise alerts without knowing where
//! they go. The default sink writes structured log events; tests swap in a
//! capturing sink.

use async_trait::async_trait;

use crate::registry::{AlertSeverity, AlertType};

/// A single alert ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub body: String,
    pub device_mac: Option<String>,
}

impl Notification {
    pub fn new_device(mac: &str, display_name: &str, ip: &str) -> Self {
        Self {
            alert_type: AlertType::NewDevice,
            severity: AlertSeverity::Low,
            title: "New device joined the network".to_string(),
            body: format!("{} ({}) appeared at {}", display_name, mac, ip),
            device_mac: Some(mac.to_string()),
        }
    }

    pub fn high_risk(mac: &str, display_name: &str, score: u8, level: &str) -> Self {
        Self {
            alert_type: AlertType::HighRiskDevice,
            severity: AlertSeverity::High,
            title: format!("Device risk is {}", level),
            body: format!("{} ({}) scored {} on the latest assessment", display_name, mac, score),
            device_mac: Some(mac.to_string()),
        }
    }

    pub fn suspicious_activity(mac: &str, display_name: &str, summary: &str) -> Self {
        Self {
            alert_type: AlertType::SuspiciousActivity,
            severity: AlertSeverity::Medium,
            title: "Suspicious activity detected".to_string(),
            body: format!("{} ({}): {}", display_name, mac, summary),
            device_mac: Some(mac.to_string()),
        }
    }

    pub fn anomaly(mac: &str, display_name: &str, reason: &str) -> Self {
        Self {
            alert_type: AlertType::AnomalyDetected,
            severity: AlertSeverity::Medium,
            title: "Behavioral anomaly detected".to_string(),
            body: format!("{} ({}): {}", display_name, mac, reason),
            device_mac: Some(mac.to_string()),
        }
    }

    pub fn device_blocked(mac: &str, display_name: &str, automatic: bool) -> Self {
        let body = if automatic {
            format!("{} ({}) was blocked automatically after threat analysis", display_name, mac)
        } else {
            format!("{} ({}) was blocked", display_name, mac)
        };
        Self {
            alert_type: AlertType::DeviceBlocked,
            severity: AlertSeverity::Critical,
            title: "Device blocked".to_string(),
            body,
            device_mac: Some(mac.to_string()),
        }
    }
}

/// Delivery sink for alerts raised during scan cycles
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Default sink: structured log events, nothing external
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) {
        match notification.severity {
            AlertSeverity::Critical => tracing::error!(
                alert_type = notification.alert_type.as_str(),
                mac = notification.device_mac.as_deref().unwrap_or("-"),
                "{}: {}",
                notification.title,
                notification.body
            ),
            AlertSeverity::High | AlertSeverity::Medium => tracing::warn!(
                alert_type = notification.alert_type.as_str(),
                mac = notification.device_mac.as_deref().unwrap_or("-"),
                "{}: {}",
                notification.title,
                notification.body
            ),
            AlertSeverity::Low => tracing::info!(
                alert_type = notification.alert_type.as_str(),
                mac = notification.device_mac.as_deref().unwrap_or("-"),
                "{}: {}",
                notification.title,
                notification.body
            ),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures notifications for assertions
    #[derive(Default)]
    pub struct CapturingNotifier {
        pub captured: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn notify(&self, notification: &Notification) {
            self.captured
                .lock()
                .expect("notifier mutex poisoned")
                .push(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_device_notification_is_low_severity() {
        let n = Notification::new_device("AA:BB:CC:DD:EE:FF", "Kitchen Tablet", "192.168.1.23");
        assert_eq!(n.alert_type, AlertType::NewDevice);
        assert_eq!(n.severity, AlertSeverity::Low);
        assert!(n.body.contains("192.168.1.23"));
    }

    #[test]
    fn blocked_notification_is_critical() {
        let n = Notification::device_blocked("AA:BB:CC:DD:EE:FF", "Unknown Device", true);
        assert_eq!(n.severity, AlertSeverity::Critical);
        assert!(n.body.contains("automatically"));
    }

    #[tokio::test]
    async fn capturing_notifier_records_in_order() {
        let sink = testing::CapturingNotifier::default();
        sink.notify(&Notification::new_device("AA:BB:CC:DD:EE:FF", "a", "10.0.0.2"))
            .await;
        sink.notify(&Notification::anomaly("AA:BB:CC:DD:EE:FF", "a", "churn"))
            .await;
        let captured = sink.captured.lock().expect("mutex poisoned");
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].alert_type, AlertType::NewDevice);
        assert_eq!(captured[1].alert_type, AlertType::AnomalyDetected);
    }
}
