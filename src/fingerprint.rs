//! Device fingerprinting from hardware address prefixes
//!
//! Maps OUI prefixes to a best-guess vendor, device type, and category.
//! Pure lookup with no I/O, safe to call on the device-list hot path.

use serde::{Deserialize, Serialize};

/// Confidence of a fingerprint match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Broad device category derived from the matched type label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    Computer,
    Phone,
    Tablet,
    Router,
    Iot,
    Gaming,
    Printer,
    Tv,
    Unknown,
}

impl DeviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Computer => "computer",
            DeviceCategory::Phone => "phone",
            DeviceCategory::Tablet => "tablet",
            DeviceCategory::Router => "router",
            DeviceCategory::Iot => "iot",
            DeviceCategory::Gaming => "gaming",
            DeviceCategory::Printer => "printer",
            DeviceCategory::Tv => "tv",
            DeviceCategory::Unknown => "unknown",
        }
    }
}

/// Result of a hardware-address fingerprint lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Canonical colon-separated uppercase form of the input address
    pub mac: String,
    pub vendor: String,
    pub device_type: String,
    pub icon: &'static str,
    pub confidence: Confidence,
    pub category: DeviceCategory,
}

/// OUI prefix table: 3-octet prefix -> (vendor, device type, icon)
const OUI_TABLE: &[(&str, &str, &str, &str)] = &[
    // Apple
    ("00:1A:2B", "Apple", "iPhone/iPad/Mac", "📱"),
    ("A4:C3:F0", "Apple", "iPhone", "📱"),
    ("F0:18:98", "Apple", "MacBook", "💻"),
    ("3C:22:FB", "Apple", "Apple Device", "🍎"),
    // Samsung
    ("00:16:32", "Samsung", "Samsung Device", "📱"),
    ("8C:77:12", "Samsung", "Samsung Phone", "📱"),
    ("CC:07:AB", "Samsung", "Samsung TV", "📺"),
    // Huawei
    ("00:E0:FC", "Huawei", "Huawei Router", "📡"),
    ("48:DB:50", "Huawei", "Huawei Device", "📱"),
    ("28:31:52", "Huawei", "Huawei Router", "📡"),
    // Xiaomi
    ("28:6C:07", "Xiaomi", "Xiaomi Device", "📱"),
    ("F8:A4:5F", "Xiaomi", "Xiaomi Phone", "📱"),
    // Dell
    ("00:14:22", "Dell", "Dell Computer", "💻"),
    ("14:FE:B5", "Dell", "Dell Laptop", "💻"),
    // HP
    ("00:1F:29", "HP", "HP Computer", "💻"),
    ("3C:D9:2B", "HP", "HP Printer", "🖨️"),
    // Cisco
    ("00:1B:54", "Cisco", "Cisco Switch", "🔀"),
    ("00:0F:23", "Cisco", "Cisco Router", "📡"),
    // TP-Link
    ("50:C7:BF", "TP-Link", "TP-Link Router", "📡"),
    ("14:CC:20", "TP-Link", "TP-Link Device", "📡"),
    // Netgear
    ("00:14:6C", "Netgear", "Netgear Router", "📡"),
    ("A0:21:B7", "Netgear", "Netgear Device", "📡"),
    // Raspberry Pi
    ("B8:27:EB", "Raspberry Pi", "Raspberry Pi", "🖥️"),
    ("DC:A6:32", "Raspberry Pi", "Raspberry Pi", "🖥️"),
    // Amazon
    ("FC:65:DE", "Amazon", "Amazon Echo/Fire", "🔊"),
    ("74:C2:46", "Amazon", "Amazon Device", "📦"),
    // Google
    ("F4:F5:D8", "Google", "Google Device", "🔊"),
    ("54:60:09", "Google", "Chromecast", "📺"),
    // Sony
    ("00:1A:80", "Sony", "Sony PlayStation", "🎮"),
    ("AC:9B:0A", "Sony", "Sony Device", "📺"),
    // Nintendo
    ("00:19:FD", "Nintendo", "Nintendo Switch", "🎮"),
    ("98:B6:E9", "Nintendo", "Nintendo Device", "🎮"),
    // Microsoft
    ("00:50:F2", "Microsoft", "Microsoft Device", "💻"),
    // Virtualization
    ("00:0C:29", "VMware", "Virtual Machine", "🖥️"),
    ("08:00:27", "VirtualBox", "Virtual Machine", "🖥️"),
    ("52:54:00", "QEMU", "Virtual Machine", "🖥️"),
];

/// Identify a device from its hardware address.
///
/// A 3-octet prefix hit yields high confidence; a 2-octet partial match
/// degrades to medium; a total miss returns an unknown fingerprint.
pub fn identify(mac: &str) -> Fingerprint {
    let normalized = normalize_mac(mac);

    if normalized.is_empty() {
        return unknown_fingerprint(String::new(), "❓");
    }

    if normalized.len() >= 8 {
        let prefix = &normalized[..8];
        if let Some(&(_, vendor, device_type, icon)) =
            OUI_TABLE.iter().find(|(oui, _, _, _)| *oui == prefix)
        {
            return Fingerprint {
                mac: normalized,
                vendor: vendor.to_string(),
                device_type: device_type.to_string(),
                icon,
                confidence: Confidence::High,
                category: categorize(device_type),
            };
        }
    }

    if normalized.len() >= 5 {
        let short_prefix = &normalized[..5];
        if let Some(&(_, vendor, device_type, icon)) = OUI_TABLE
            .iter()
            .find(|(oui, _, _, _)| oui.starts_with(short_prefix))
        {
            return Fingerprint {
                mac: normalized,
                vendor: vendor.to_string(),
                device_type: device_type.to_string(),
                icon,
                confidence: Confidence::Medium,
                category: categorize(device_type),
            };
        }
    }

    unknown_fingerprint(normalized, "🖥️")
}

/// Enrich an observation with fingerprint data, keeping adapter-provided
/// fields when the router already supplied them.
pub fn enrich(mac: &str, vendor: Option<&str>, device_type: Option<&str>) -> (String, String) {
    let fingerprint = identify(mac);

    let vendor = vendor
        .filter(|v| !v.is_empty() && *v != "Unknown")
        .map(str::to_string)
        .unwrap_or(fingerprint.vendor);
    let device_type = device_type
        .filter(|t| !t.is_empty() && *t != "Unknown")
        .map(str::to_string)
        .unwrap_or(fingerprint.device_type);

    (vendor, device_type)
}

/// Canonical colon-separated uppercase form
fn normalize_mac(mac: &str) -> String {
    mac.trim().to_uppercase().replace('-', ":")
}

fn unknown_fingerprint(mac: String, icon: &'static str) -> Fingerprint {
    Fingerprint {
        mac,
        vendor: "Unknown Vendor".to_string(),
        device_type: "Unknown Device".to_string(),
        icon,
        confidence: Confidence::Low,
        category: DeviceCategory::Unknown,
    }
}

fn categorize(device_type: &str) -> DeviceCategory {
    let lower = device_type.to_lowercase();
    if contains_any(&lower, &["phone", "iphone", "android"]) {
        return DeviceCategory::Phone;
    }
    if contains_any(&lower, &["ipad", "tablet"]) {
        return DeviceCategory::Tablet;
    }
    if contains_any(&lower, &["mac", "laptop", "computer", "pc", "virtual machine"]) {
        return DeviceCategory::Computer;
    }
    if contains_any(&lower, &["router", "switch", "gateway"]) {
        return DeviceCategory::Router;
    }
    if contains_any(&lower, &["tv", "chromecast", "fire"]) {
        return DeviceCategory::Tv;
    }
    if contains_any(&lower, &["playstation", "xbox", "nintendo"]) {
        return DeviceCategory::Gaming;
    }
    if lower.contains("printer") {
        return DeviceCategory::Printer;
    }
    if contains_any(&lower, &["echo", "raspberry", "iot"]) {
        return DeviceCategory::Iot;
    }
    DeviceCategory::Unknown
}

fn contains_any(s: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| s.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_prefix_match_is_high_confidence() {
        let fp = identify("b8:27:eb:12:34:56");
        assert_eq!(fp.mac, "B8:27:EB:12:34:56");
        assert_eq!(fp.vendor, "Raspberry Pi");
        assert_eq!(fp.confidence, Confidence::High);
        assert_eq!(fp.category, DeviceCategory::Iot);
    }

    #[test]
    fn two_octet_match_degrades_to_medium() {
        // B8:27 matches the Raspberry Pi OUI on the first two octets only.
        let fp = identify("B8:27:00:00:00:00");
        assert_eq!(fp.vendor, "Raspberry Pi");
        assert_eq!(fp.confidence, Confidence::Medium);
    }

    #[test]
    fn miss_returns_unknown_low_confidence() {
        let fp = identify("FF:FF:FF:00:00:01");
        assert_eq!(fp.vendor, "Unknown Vendor");
        assert_eq!(fp.device_type, "Unknown Device");
        assert_eq!(fp.confidence, Confidence::Low);
        assert_eq!(fp.category, DeviceCategory::Unknown);
    }

    #[test]
    fn empty_input_is_unknown() {
        let fp = identify("");
        assert!(fp.mac.is_empty());
        assert_eq!(fp.confidence, Confidence::Low);
    }

    #[test]
    fn dash_separated_input_is_normalized() {
        let fp = identify("cc-07-ab-01-02-03");
        assert_eq!(fp.mac, "CC:07:AB:01:02:03");
        assert_eq!(fp.vendor, "Samsung");
        assert_eq!(fp.category, DeviceCategory::Tv);
    }

    #[test]
    fn identify_is_pure() {
        let first = identify("00:1A:2B:99:88:77");
        let second = identify("00:1A:2B:99:88:77");
        assert_eq!(first, second);
    }

    #[test]
    fn enrich_keeps_adapter_vendor() {
        let (vendor, device_type) = enrich("FF:FF:FF:00:00:01", Some("Acme"), None);
        assert_eq!(vendor, "Acme");
        assert_eq!(device_type, "Unknown Device");
    }

    #[test]
    fn enrich_fills_missing_fields_from_table() {
        let (vendor, device_type) = enrich("50:C7:BF:00:11:22", None, None);
        assert_eq!(vendor, "TP-Link");
        assert_eq!(device_type, "TP-Link Router");
    }

    #[test]
    fn categorize_keywords() {
        assert_eq!(categorize("Samsung Phone"), DeviceCategory::Phone);
        assert_eq!(categorize("Cisco Switch"), DeviceCategory::Router);
        assert_eq!(categorize("HP Printer"), DeviceCategory::Printer);
        assert_eq!(categorize("Sony PlayStation"), DeviceCategory::Gaming);
        assert_eq!(categorize("Mystery Gadget"), DeviceCategory::Unknown);
    }
}
