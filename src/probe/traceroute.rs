//! Hop-by-hop path tracing with TTL-limited ICMP probes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence};
use tokio::time::timeout;

use crate::config::{TRACE_MAX_CONSECUTIVE_TIMEOUTS, TRACE_MAX_HOPS, TRACE_OVERALL_BUDGET};
use crate::probe::dns::reverse_dns_lookup;
use crate::probe::ping::{rand_identifier, resolve_host};
use crate::probe::ProbeError;

/// One hop on the path to the destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteHop {
    pub hop: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteReport {
    pub host: String,
    pub ip: String,
    pub hops: Vec<TracerouteHop>,
    pub total_hops: usize,
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Trace the route to a host, one TTL-limited probe per hop.
///
/// Stops early once the destination answers, after too many consecutive
/// silent hops, or when the overall time budget runs out. `completed` is
/// true only when the final hop is the destination itself.
pub async fn traceroute(host: &str, max_hops: Option<u8>) -> Result<TracerouteReport, ProbeError> {
    traceroute_within(host, max_hops, TRACE_OVERALL_BUDGET).await
}

async fn traceroute_within(
    host: &str,
    max_hops: Option<u8>,
    budget: Duration,
) -> Result<TracerouteReport, ProbeError> {
    let max_hops = max_hops.unwrap_or(TRACE_MAX_HOPS);
    if max_hops == 0 || max_hops > TRACE_MAX_HOPS {
        return Err(ProbeError::InvalidHopLimit(max_hops, TRACE_MAX_HOPS));
    }
    let target = resolve_host(host).await?;

    // Per-hop timeout scaled so a fully silent path still fits the budget.
    let hop_timeout =
        Duration::from_millis((budget.as_millis() as u64 / TRACE_MAX_HOPS as u64).max(500));

    let mut hops: Vec<TracerouteHop> = Vec::new();
    let mut completed = false;

    // The trace returns whatever hops it collected when the budget hits,
    // which also bounds the per-hop reverse DNS lookups.
    let walk = walk_hops(target, max_hops, hop_timeout, &mut hops, &mut completed);
    if timeout(budget, walk).await.is_err() {
        tracing::warn!("Trace to {} hit the overall budget", target);
    }

    Ok(TracerouteReport {
        host: host.to_string(),
        ip: target.to_string(),
        total_hops: hops.len(),
        hops,
        completed,
        timestamp: Utc::now(),
    })
}

async fn walk_hops(
    target: IpAddr,
    max_hops: u8,
    hop_timeout: Duration,
    hops: &mut Vec<TracerouteHop>,
    completed: &mut bool,
) {
    let payload = [0u8; 56];
    let mut consecutive_timeouts: u8 = 0;

    for ttl in 1..=max_hops {
        let config = Config::builder().ttl(ttl as u32).build();
        let client = match Client::new(&config) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to create ICMP client at ttl {}: {}", ttl, e);
                hops.push(silent_hop(ttl));
                consecutive_timeouts += 1;
                if consecutive_timeouts >= TRACE_MAX_CONSECUTIVE_TIMEOUTS {
                    break;
                }
                continue;
            }
        };

        let mut pinger = client.pinger(target, PingIdentifier(rand_identifier())).await;
        pinger.timeout(hop_timeout);

        match pinger.ping(PingSequence(ttl as u16), &payload).await {
            Ok((packet, duration)) => {
                let hop_ip = match &packet {
                    IcmpPacket::V4(v4) => IpAddr::V4(v4.get_source()),
                    IcmpPacket::V6(v6) => IpAddr::V6(v6.get_source()),
                };
                let hostname = reverse_dns_lookup(hop_ip).await.into_iter().next();
                let latency = (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
                hops.push(TracerouteHop {
                    hop: ttl,
                    ip: Some(hop_ip.to_string()),
                    hostname,
                    latency_ms: Some(latency),
                    timed_out: false,
                });
                consecutive_timeouts = 0;
                if hop_ip == target {
                    *completed = true;
                    break;
                }
            }
            Err(_) => {
                hops.push(silent_hop(ttl));
                consecutive_timeouts += 1;
                if consecutive_timeouts >= TRACE_MAX_CONSECUTIVE_TIMEOUTS {
                    tracing::debug!(
                        "Stopping trace to {} after {} consecutive timeouts",
                        target,
                        consecutive_timeouts
                    );
                    break;
                }
            }
        }
    }
}

fn silent_hop(ttl: u8) -> TracerouteHop {
    TracerouteHop {
        hop: ttl,
        ip: None,
        hostname: None,
        latency_ms: None,
        timed_out: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_hop_limit_is_rejected() {
        let result = traceroute("192.0.2.1", Some(0)).await;
        assert_eq!(
            result.unwrap_err(),
            ProbeError::InvalidHopLimit(0, TRACE_MAX_HOPS)
        );
    }

    #[tokio::test]
    async fn oversized_hop_limit_is_rejected() {
        let result = traceroute("192.0.2.1", Some(TRACE_MAX_HOPS + 1)).await;
        assert!(matches!(result, Err(ProbeError::InvalidHopLimit(_, _))));
    }

    #[tokio::test]
    async fn bad_host_is_rejected() {
        let result = traceroute("no★such★host", Some(5)).await;
        assert!(matches!(result, Err(ProbeError::InvalidHost(_))));
    }

    #[tokio::test]
    async fn expired_budget_yields_partial_report() {
        let start = std::time::Instant::now();
        let report = traceroute_within("192.0.2.1", Some(TRACE_MAX_HOPS), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!report.completed);
        assert_eq!(report.total_hops, report.hops.len());
        // Hop probes and their reverse DNS lookups stop at the budget.
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn silent_hop_has_no_address() {
        let hop = silent_hop(7);
        assert_eq!(hop.hop, 7);
        assert!(hop.timed_out);
        assert!(hop.ip.is_none());
        assert!(hop.latency_ms.is_none());
    }
}
