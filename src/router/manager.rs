//! Dispatch over configured routers
//!
//! The manager turns router configs into adapters, drives the
//! authenticate-act-logout session shape for every operation, and normalizes
//! adapter output into `UnifiedDevice` observations. A misbehaving router
//! produces a failed `RouterScanResult`, never an escaped error.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint;
use crate::models::UnifiedDevice;
use crate::router::huawei::HuaweiAdapter;
use crate::router::rain::Rain101Adapter;
use crate::router::{RawDevice, RouterAdapter, RouterConfig, RouterType};

/// Outcome of scanning a single router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterScanResult {
    pub success: bool,
    pub router_type: RouterType,
    pub router_ip: String,
    pub devices_found: usize,
    pub devices: Vec<UnifiedDevice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RouterScanResult {
    fn failure(config: &RouterConfig, error: String) -> Self {
        Self {
            success: false,
            router_type: config.router_type,
            router_ip: config.ip.clone(),
            devices_found: 0,
            devices: Vec::new(),
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BlockAction {
    Block,
    Unblock,
}

impl BlockAction {
    fn as_str(&self) -> &'static str {
        match self {
            BlockAction::Block => "block",
            BlockAction::Unblock => "unblock",
        }
    }
}

pub struct RouterManager {
    configs: Vec<RouterConfig>,
}

impl RouterManager {
    pub fn new(configs: Vec<RouterConfig>) -> Self {
        Self { configs }
    }

    pub fn configs(&self) -> &[RouterConfig] {
        &self.configs
    }

    pub fn has_routers(&self) -> bool {
        !self.configs.is_empty()
    }

    fn adapter_for(config: &RouterConfig) -> anyhow::Result<Box<dyn RouterAdapter>> {
        Ok(match config.router_type {
            RouterType::Huawei => Box::new(HuaweiAdapter::new(config)?),
            RouterType::Rain101 => Box::new(Rain101Adapter::new(config)?),
        })
    }

    /// Scan one router: authenticate, list, logout.
    pub async fn scan_router(config: &RouterConfig) -> RouterScanResult {
        let mut adapter = match Self::adapter_for(config) {
            Ok(adapter) => adapter,
            Err(e) => return RouterScanResult::failure(config, e.to_string()),
        };

        if !adapter.authenticate().await {
            adapter.logout().await;
            return RouterScanResult::failure(
                config,
                format!("Authentication failed for {} at {}", config.router_type, config.ip),
            );
        }

        let raw_devices = adapter.list_devices().await;
        adapter.logout().await;

        let devices: Vec<UnifiedDevice> = raw_devices
            .into_iter()
            .map(|raw| unify(raw, config))
            .collect();

        tracing::info!(
            "Router scan of {} ({}) found {} devices",
            config.ip,
            config.router_type,
            devices.len()
        );

        RouterScanResult {
            success: true,
            router_type: config.router_type,
            router_ip: config.ip.clone(),
            devices_found: devices.len(),
            devices,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Scan every configured router concurrently. One router failing never
    /// aborts the others.
    pub async fn scan_all(&self) -> Vec<RouterScanResult> {
        let scans = self.configs.iter().map(Self::scan_router);
        join_all(scans).await
    }

    /// Block a MAC on the first router that acknowledges.
    pub async fn block_device(&self, mac: &str) -> bool {
        self.run_action(mac, BlockAction::Block).await
    }

    /// Unblock a MAC on the first router that acknowledges.
    pub async fn unblock_device(&self, mac: &str) -> bool {
        self.run_action(mac, BlockAction::Unblock).await
    }

    async fn run_action(&self, mac: &str, action: BlockAction) -> bool {
        for config in &self.configs {
            let mut adapter = match Self::adapter_for(config) {
                Ok(adapter) => adapter,
                Err(e) => {
                    tracing::warn!("Skipping router {}: {}", config.ip, e);
                    continue;
                }
            };
            if !adapter.authenticate().await {
                adapter.logout().await;
                continue;
            }
            let acknowledged = match action {
                BlockAction::Block => adapter.block_device(mac).await,
                BlockAction::Unblock => adapter.unblock_device(mac).await,
            };
            adapter.logout().await;
            if acknowledged {
                tracing::info!("Router {} acknowledged {} of {}", config.ip, action.as_str(), mac);
                return true;
            }
        }
        tracing::warn!("No configured router acknowledged {} of {}", action.as_str(), mac);
        false
    }

    /// First available firmware status payload across configured routers.
    pub async fn stats(&self) -> Option<Value> {
        for config in &self.configs {
            let mut adapter = match Self::adapter_for(config) {
                Ok(adapter) => adapter,
                Err(_) => continue,
            };
            if !adapter.authenticate().await {
                adapter.logout().await;
                continue;
            }
            let stats = adapter.stats().await;
            adapter.logout().await;
            if stats.is_some() {
                return stats;
            }
        }
        None
    }
}

/// Normalize a raw adapter observation, filling vendor and type from the
/// hardware-address table when the firmware gave none.
fn unify(raw: RawDevice, config: &RouterConfig) -> UnifiedDevice {
    let (vendor, device_type) =
        fingerprint::enrich(&raw.mac, raw.vendor.as_deref(), raw.device_type.as_deref());
    UnifiedDevice {
        ip: raw.ip,
        mac: raw.mac,
        hostname: raw.hostname,
        device_type: Some(device_type),
        vendor: Some(vendor),
        is_online: raw.is_online,
        last_seen: raw.last_seen,
        router_type: config.router_type,
        router_ip: config.ip.clone(),
        signal: raw.signal,
        bandwidth: raw.bandwidth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn huawei_config() -> RouterConfig {
        RouterConfig {
            router_type: RouterType::Huawei,
            ip: "192.0.2.1".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }

    fn raw(mac: &str) -> RawDevice {
        RawDevice {
            ip: "192.168.1.50".to_string(),
            mac: mac.to_string(),
            hostname: Some("laptop".to_string()),
            device_type: None,
            vendor: None,
            is_online: true,
            signal: None,
            bandwidth: None,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn unify_fills_vendor_from_hardware_address() {
        let device = unify(raw("B8:27:EB:11:22:33"), &huawei_config());
        assert_eq!(device.vendor.as_deref(), Some("Raspberry Pi"));
        assert_eq!(device.router_type, RouterType::Huawei);
        assert_eq!(device.router_ip, "192.0.2.1");
    }

    #[test]
    fn unify_keeps_adapter_reported_fields() {
        let mut observed = raw("B8:27:EB:11:22:33");
        observed.vendor = Some("Custom Vendor".to_string());
        observed.device_type = Some("NAS".to_string());
        let device = unify(observed, &huawei_config());
        assert_eq!(device.vendor.as_deref(), Some("Custom Vendor"));
        assert_eq!(device.device_type.as_deref(), Some("NAS"));
    }

    #[tokio::test]
    async fn manager_without_routers_scans_nothing() {
        let manager = RouterManager::new(Vec::new());
        assert!(!manager.has_routers());
        assert!(manager.scan_all().await.is_empty());
        assert!(!manager.block_device("AA:BB:CC:DD:EE:FF").await);
        assert!(manager.stats().await.is_none());
    }

    #[tokio::test]
    async fn unreachable_router_yields_failed_result() {
        let result = RouterManager::scan_router(&huawei_config()).await;
        assert!(!result.success);
        assert_eq!(result.devices_found, 0);
        assert!(result.error.is_some());
    }
}
