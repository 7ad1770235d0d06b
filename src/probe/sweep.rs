//! Subnet ping sweep, the fallback discovery path when no router answers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::sync::{Mutex, Semaphore};

use crate::config::{ARP_RESOLVE_TIMEOUT, MAX_CONCURRENT_SWEEP_PINGS, SWEEP_PING_TIMEOUT};
use crate::probe::ping::rand_identifier;
use crate::probe::ProbeError;

/// A live host found by the sweep, MAC resolved via ARP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepHost {
    pub ip: String,
    pub mac: String,
    pub latency_ms: f64,
    pub discovered_at: DateTime<Utc>,
}

/// Ping every address in the router's /24 and ARP-resolve the responders.
///
/// Hosts that answer the echo but yield no ARP reply are dropped; without a
/// MAC they cannot enter the registry.
pub async fn sweep_subnet(router_ip: &str) -> Result<Vec<SweepHost>, ProbeError> {
    let router: Ipv4Addr = router_ip
        .trim()
        .parse()
        .map_err(|_| ProbeError::NotIpv4(router_ip.to_string()))?;
    let octets = router.octets();

    let client = match Client::new(&Config::default()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("Failed to create ICMP client for sweep: {}", e);
            return Ok(Vec::new());
        }
    };

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SWEEP_PINGS));
    let found: Arc<Mutex<Vec<SweepHost>>> = Arc::new(Mutex::new(Vec::new()));
    let payload = [0u8; 32];

    let mut handles = Vec::with_capacity(254);
    for last_octet in 1u8..=254 {
        let host = Ipv4Addr::new(octets[0], octets[1], octets[2], last_octet);
        if host == router {
            continue;
        }
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        let found = Arc::clone(&found);
        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let mut pinger = client
                .pinger(IpAddr::V4(host), PingIdentifier(rand_identifier()))
                .await;
            pinger.timeout(SWEEP_PING_TIMEOUT);
            let latency = match pinger.ping(PingSequence(0), &payload).await {
                Ok((_packet, duration)) => duration.as_secs_f64() * 1000.0,
                Err(_) => return,
            };
            let Some(mac) = resolve_mac(host).await else {
                tracing::debug!("Host {} answered ping but not ARP, skipping", host);
                return;
            };
            found.lock().await.push(SweepHost {
                ip: host.to_string(),
                mac,
                latency_ms: (latency * 100.0).round() / 100.0,
                discovered_at: Utc::now(),
            });
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!("Sweep task failed: {}", e);
        }
    }

    let mut hosts = found.lock().await.clone();
    hosts.sort_by(|a, b| a.ip.cmp(&b.ip));
    tracing::info!("Subnet sweep of {}/24 found {} hosts", router, hosts.len());
    Ok(hosts)
}

async fn resolve_mac(host: Ipv4Addr) -> Option<String> {
    match libarp::client::ArpClient::new() {
        Ok(mut client) => match client.ip_to_mac(host, Some(ARP_RESOLVE_TIMEOUT)).await {
            Ok(mac) => Some(mac.to_string().to_uppercase()),
            Err(_) => None,
        },
        Err(e) => {
            tracing::debug!("ARP client unavailable: {}", e);
            None
        }
    }
}
