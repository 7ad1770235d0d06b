//! Shared data models for the NetGuard core engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::RouterType;

/// A device observation normalized across router vendors and probe sweeps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDevice {
    pub ip: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub router_type: RouterType,
    pub router_ip: String,
    /// Signal strength reported by mobile routers (dBm), when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i64>,
}

impl UnifiedDevice {
    /// Preferred display name: hostname if resolved, otherwise the type label.
    pub fn display_name(&self) -> String {
        self.hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(|| self.device_type.clone())
            .unwrap_or_else(|| "Unknown Device".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> UnifiedDevice {
        UnifiedDevice {
            ip: "192.168.1.23".to_string(),
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            hostname: None,
            device_type: None,
            vendor: None,
            is_online: true,
            last_seen: Utc::now(),
            router_type: RouterType::Huawei,
            router_ip: "192.168.1.1".to_string(),
            signal: None,
            bandwidth: None,
        }
    }

    #[test]
    fn display_name_prefers_hostname() {
        let mut device = sample_device();
        device.hostname = Some("laptop".to_string());
        device.device_type = Some("Dell Laptop".to_string());
        assert_eq!(device.display_name(), "laptop");
    }

    #[test]
    fn display_name_falls_back_to_type_then_unknown() {
        let mut device = sample_device();
        device.device_type = Some("Huawei Router".to_string());
        assert_eq!(device.display_name(), "Huawei Router");

        device.device_type = None;
        assert_eq!(device.display_name(), "Unknown Device");
    }

    #[test]
    fn display_name_skips_empty_hostname() {
        let mut device = sample_device();
        device.hostname = Some(String::new());
        device.device_type = Some("Printer".to_string());
        assert_eq!(device.display_name(), "Printer");
    }
}
