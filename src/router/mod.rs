//! Router management adapters
//!
//! Each supported router firmware gets an adapter implementing the same
//! capability set. Firmware APIs are undocumented and vary across revisions,
//! so adapters try candidate endpoints in order and decode payloads
//! leniently. Adapter methods never propagate transport errors; failure is a
//! `false` return or an empty list.

pub mod huawei;
pub mod manager;
pub mod rain;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub use manager::{RouterManager, RouterScanResult};

/// Supported router firmware families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterType {
    Huawei,
    Rain101,
}

impl RouterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterType::Huawei => "huawei",
            RouterType::Rain101 => "rain101",
        }
    }
}

impl fmt::Display for RouterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RouterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huawei" => Ok(RouterType::Huawei),
            "rain101" | "rain" | "rain-101" => Ok(RouterType::Rain101),
            other => Err(format!("Unknown router type: {}", other)),
        }
    }
}

/// Credentials and address for one managed router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub router_type: RouterType,
    pub ip: String,
    pub username: String,
    pub password: String,
}

/// A device exactly as a router adapter reported it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDevice {
    pub ip: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i64>,
    pub last_seen: DateTime<Utc>,
}

impl RawDevice {
    /// Decode one device entry from a firmware payload item.
    ///
    /// Field names vary per firmware revision, so every known alias is
    /// tried. Entries without both an IP and a MAC are dropped.
    /// `check_connected_flag` additionally honors a `connected` boolean,
    /// which only some firmwares emit.
    pub fn from_item(item: &Value, check_connected_flag: bool) -> Option<RawDevice> {
        let ip = string_field(item, &["ip", "ipaddr", "ipAddress"])?;
        let mac = string_field(item, &["mac", "macaddr", "macAddress", "hwaddr"])?;
        if ip.is_empty() || mac.is_empty() {
            return None;
        }

        let online = item.get("online").and_then(Value::as_bool) != Some(false)
            && item.get("status").and_then(Value::as_str) != Some("offline");
        let online = if check_connected_flag {
            online && item.get("connected").and_then(Value::as_bool) != Some(false)
        } else {
            online
        };

        Some(RawDevice {
            ip,
            mac: mac.to_uppercase(),
            hostname: string_field(item, &["hostname", "name", "deviceName"])
                .filter(|s| !s.is_empty()),
            device_type: string_field(item, &["type", "deviceType"]).filter(|s| !s.is_empty()),
            vendor: string_field(item, &["vendor"]).filter(|s| !s.is_empty()),
            is_online: online,
            signal: int_field(item, &["signal", "rssi"]),
            bandwidth: int_field(item, &["bandwidth", "speed"]),
            last_seen: Utc::now(),
        })
    }

    /// Decode a whole payload: a bare array or an object wrapping the list
    /// under one of the known keys.
    pub fn list_from_value(payload: &Value, check_connected_flag: bool) -> Vec<RawDevice> {
        let items: &[Value] = if let Some(array) = payload.as_array() {
            array
        } else {
            const LIST_KEYS: &[&str] =
                &["devices", "hosts", "clients", "dhcp_clients", "connected_devices"];
            LIST_KEYS
                .iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_array))
                .map(Vec::as_slice)
                .unwrap_or(&[])
        };

        items
            .iter()
            .filter_map(|item| RawDevice::from_item(item, check_connected_flag))
            .collect()
    }
}

fn string_field(item: &Value, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
}

fn int_field(item: &Value, aliases: &[&str]) -> Option<i64> {
    aliases
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_i64))
}

/// Capability set every router adapter provides.
///
/// No method returns an error; routers disappear, reboot, and change
/// firmware mid-session, and the scan loop treats all of that as ordinary.
#[async_trait]
pub trait RouterAdapter: Send + Sync {
    /// Establish a session. False means bad credentials or no usable
    /// firmware endpoint, never a panic.
    async fn authenticate(&mut self) -> bool;

    /// List devices the router currently knows about. Empty on any failure.
    async fn list_devices(&self) -> Vec<RawDevice>;

    /// Block a device by MAC. True only when the firmware acknowledged.
    async fn block_device(&self, mac: &str) -> bool;

    /// Unblock a device by MAC.
    async fn unblock_device(&self, mac: &str) -> bool;

    /// Opaque firmware status payload, passed through untouched.
    async fn stats(&self) -> Option<Value>;

    /// End the session. Always attempted, even after failures.
    async fn logout(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn router_type_round_trips_through_strings() {
        assert_eq!("huawei".parse::<RouterType>().expect("parse"), RouterType::Huawei);
        assert_eq!("RAIN101".parse::<RouterType>().expect("parse"), RouterType::Rain101);
        assert_eq!(RouterType::Rain101.as_str(), "rain101");
        assert!("netgear".parse::<RouterType>().is_err());
    }

    #[test]
    fn decodes_bare_array_payload() {
        let payload = json!([
            {"ip": "192.168.1.10", "mac": "aa:bb:cc:dd:ee:ff", "hostname": "laptop"},
            {"ip": "192.168.1.11", "mac": "11:22:33:44:55:66"}
        ]);
        let devices = RawDevice::list_from_value(&payload, false);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[0].hostname.as_deref(), Some("laptop"));
        assert!(devices[1].hostname.is_none());
    }

    #[test]
    fn decodes_nested_payloads_under_known_keys() {
        for key in ["devices", "hosts", "clients", "dhcp_clients", "connected_devices"] {
            let payload = json!({key: [{"ipaddr": "10.0.0.2", "hwaddr": "AA:BB:CC:00:11:22"}]});
            let devices = RawDevice::list_from_value(&payload, false);
            assert_eq!(devices.len(), 1, "key {} should decode", key);
            assert_eq!(devices[0].ip, "10.0.0.2");
        }
    }

    #[test]
    fn entries_missing_ip_or_mac_are_dropped() {
        let payload = json!([
            {"ip": "192.168.1.10"},
            {"mac": "AA:BB:CC:DD:EE:FF"},
            {"ip": "", "mac": "AA:BB:CC:DD:EE:FF"}
        ]);
        assert!(RawDevice::list_from_value(&payload, false).is_empty());
    }

    #[test]
    fn offline_markers_are_honored() {
        let payload = json!([
            {"ip": "1.1.1.1", "mac": "AA:AA:AA:AA:AA:01", "online": false},
            {"ip": "1.1.1.2", "mac": "AA:AA:AA:AA:AA:02", "status": "offline"},
            {"ip": "1.1.1.3", "mac": "AA:AA:AA:AA:AA:03"}
        ]);
        let devices = RawDevice::list_from_value(&payload, false);
        assert!(!devices[0].is_online);
        assert!(!devices[1].is_online);
        assert!(devices[2].is_online);
    }

    #[test]
    fn connected_flag_only_applies_when_requested() {
        let item = json!({"ip": "1.1.1.1", "mac": "AA:AA:AA:AA:AA:01", "connected": false});
        let without = RawDevice::from_item(&item, false).expect("decode");
        let with = RawDevice::from_item(&item, true).expect("decode");
        assert!(without.is_online);
        assert!(!with.is_online);
    }

    #[test]
    fn signal_and_bandwidth_aliases_decode() {
        let item = json!({"ip": "1.1.1.1", "mac": "AA:AA:AA:AA:AA:01", "rssi": -61, "speed": 300});
        let device = RawDevice::from_item(&item, true).expect("decode");
        assert_eq!(device.signal, Some(-61));
        assert_eq!(device.bandwidth, Some(300));
    }

    #[test]
    fn malformed_payload_decodes_to_empty() {
        assert!(RawDevice::list_from_value(&json!("not a list"), false).is_empty());
        assert!(RawDevice::list_from_value(&json!({"unrelated": 1}), false).is_empty());
    }
}
