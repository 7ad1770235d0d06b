//! Huawei router adapter (B535 / B715 / B818 family)
//!
//! Session-cookie auth against the firmware web API. Endpoint paths differ
//! between firmware revisions, so each operation walks a candidate list and
//! takes the first answer that decodes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::{ROUTER_HTTP_TIMEOUT, ROUTER_USER_AGENT};
use crate::router::{RawDevice, RouterAdapter, RouterConfig};

const DEVICE_ENDPOINTS: &[&str] = &[
    "/api/system/HostInfo",
    "/api/system/host_info",
    "/api/device/info",
    "/api/lan/host-list",
];

const DHCP_ENDPOINTS: &[&str] = &[
    "/api/system/dhcp_client",
    "/api/system/dhcp-clients",
    "/api/lan/dhcp-clients",
];

const BLOCK_ENDPOINTS: &[&str] = &[
    "/api/system/block_device",
    "/api/device/block",
    "/api/lan/block-device",
];

const UNBLOCK_ENDPOINTS: &[&str] = &[
    "/api/system/block_device",
    "/api/device/unblock",
    "/api/lan/unblock-device",
];

const STATS_ENDPOINTS: &[&str] = &[
    "/api/system/status",
    "/api/system/router_status",
    "/api/device/status",
];

pub struct HuaweiAdapter {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    session_id: String,
    authenticated: bool,
}

impl HuaweiAdapter {
    pub fn new(config: &RouterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(ROUTER_HTTP_TIMEOUT)
            .user_agent(ROUTER_USER_AGENT)
            .build()
            .context("Failed to build Huawei HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("http://{}", config.ip.trim()),
            username: config.username.clone(),
            password: config.password.clone(),
            session_id: String::new(),
            authenticated: false,
        })
    }

    fn cookie(&self) -> String {
        format!("sessionid={}", self.session_id)
    }

    async fn get_json(&self, path: &str) -> Option<Value> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Cookie", self.cookie())
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    async fn post_json(&self, path: &str, body: &Value) -> Option<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Cookie", self.cookie())
            .json(body)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok().or(Some(Value::Null))
    }

    async fn try_login(&self, path: &str) -> Option<String> {
        let payload = json!({"username": self.username, "password": self.password});
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&payload)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: Value = response.json().await.ok()?;
        body.get("sessionid")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    async fn first_device_list(&self, endpoints: &[&str]) -> Vec<RawDevice> {
        for endpoint in endpoints {
            if let Some(payload) = self.get_json(endpoint).await {
                let devices = RawDevice::list_from_value(&payload, false);
                if !devices.is_empty() {
                    tracing::debug!("Huawei: {} devices via {}", devices.len(), endpoint);
                    return devices;
                }
            }
        }
        Vec::new()
    }

    async fn post_block_action(&self, endpoints: &[&str], mac: &str, block: u8) -> bool {
        if !self.authenticated {
            tracing::warn!("Huawei: block action without a session");
            return false;
        }
        let payload = json!({"mac": mac, "block": block});
        for endpoint in endpoints {
            if self.post_json(endpoint, &payload).await.is_some() {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl RouterAdapter for HuaweiAdapter {
    async fn authenticate(&mut self) -> bool {
        // Prime the session: some firmwares only issue cookies after the
        // landing page has been fetched.
        let _ = self
            .client
            .get(format!("{}/html/content.html", self.base_url))
            .send()
            .await;

        for path in ["/api/system/user_login", "/api/user/login"] {
            if let Some(session_id) = self.try_login(path).await {
                self.session_id = session_id;
                self.authenticated = true;
                tracing::info!("Huawei: authenticated via {}", path);
                return true;
            }
        }
        tracing::warn!("Huawei: authentication failed for {}", self.base_url);
        false
    }

    async fn list_devices(&self) -> Vec<RawDevice> {
        if !self.authenticated {
            return Vec::new();
        }
        let devices = self.first_device_list(DEVICE_ENDPOINTS).await;
        if !devices.is_empty() {
            return devices;
        }
        // DHCP client table as a fallback view of the same population
        self.first_device_list(DHCP_ENDPOINTS).await
    }

    async fn block_device(&self, mac: &str) -> bool {
        self.post_block_action(BLOCK_ENDPOINTS, mac, 1).await
    }

    async fn unblock_device(&self, mac: &str) -> bool {
        self.post_block_action(UNBLOCK_ENDPOINTS, mac, 0).await
    }

    async fn stats(&self) -> Option<Value> {
        if !self.authenticated {
            return None;
        }
        for endpoint in STATS_ENDPOINTS {
            if let Some(payload) = self.get_json(endpoint).await {
                return Some(payload);
            }
        }
        None
    }

    async fn logout(&mut self) {
        let _ = self
            .client
            .post(format!("{}/api/user/logout", self.base_url))
            .header("Cookie", self.cookie())
            .send()
            .await;
        self.authenticated = false;
        self.session_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouterType;

    fn test_config() -> RouterConfig {
        RouterConfig {
            router_type: RouterType::Huawei,
            ip: "192.168.8.1".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn adapter_builds_base_url_from_config() {
        let adapter = HuaweiAdapter::new(&test_config()).expect("adapter");
        assert_eq!(adapter.base_url, "http://192.168.8.1");
        assert!(!adapter.authenticated);
    }

    #[tokio::test]
    async fn unauthenticated_adapter_lists_nothing() {
        let adapter = HuaweiAdapter::new(&test_config()).expect("adapter");
        assert!(adapter.list_devices().await.is_empty());
        assert!(adapter.stats().await.is_none());
        assert!(!adapter.block_device("AA:BB:CC:DD:EE:FF").await);
    }
}
