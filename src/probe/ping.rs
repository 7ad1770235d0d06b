//! ICMP echo probes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};

use crate::config::{DEFAULT_PING_COUNT, MAX_PING_COUNT, PING_PROBE_TIMEOUT};
use crate::probe::ProbeError;

/// Aggregated result of a multi-probe ping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReport {
    pub host: String,
    pub ip: String,
    pub probes_sent: usize,
    pub probes_received: usize,
    pub packet_loss_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    pub reachable: bool,
    pub timestamp: DateTime<Utc>,
}

/// Ping a host `count` times and aggregate latency statistics.
///
/// An unreachable host is a normal report (100% loss, no latencies), not an
/// error. Only invalid input is rejected, before any packet is sent.
pub async fn ping(host: &str, count: Option<usize>) -> Result<PingReport, ProbeError> {
    let count = count.unwrap_or(DEFAULT_PING_COUNT);
    if count == 0 || count > MAX_PING_COUNT {
        return Err(ProbeError::InvalidCount(count, MAX_PING_COUNT));
    }
    let ip = resolve_host(host).await?;

    let client = match Client::new(&Config::default()) {
        Ok(client) => client,
        Err(e) => {
            // Raw-socket creation can fail without privileges. Report the
            // host as unprobed rather than killing the caller.
            tracing::warn!("Failed to create ICMP client for {}: {}", host, e);
            return Ok(unreachable_report(host, ip, count));
        }
    };

    let payload = [0u8; 56];
    let mut pinger = client.pinger(ip, PingIdentifier(rand_identifier())).await;
    pinger.timeout(PING_PROBE_TIMEOUT);

    let mut latencies: Vec<f64> = Vec::with_capacity(count);
    for seq in 0..count {
        match pinger.ping(PingSequence(seq as u16), &payload).await {
            Ok((_packet, duration)) => {
                latencies.push(duration.as_secs_f64() * 1000.0);
            }
            Err(_) => {
                tracing::debug!("Ping probe {} to {} timed out", seq, ip);
            }
        }
    }

    Ok(build_report(host, ip, count, &latencies))
}

fn build_report(host: &str, ip: IpAddr, sent: usize, latencies: &[f64]) -> PingReport {
    let received = latencies.len();
    let loss = if sent == 0 {
        100.0
    } else {
        ((sent - received) as f64 / sent as f64) * 100.0
    };

    let (min, max, avg, jitter) = if latencies.is_empty() {
        (None, None, None, None)
    } else {
        let min = latencies.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = latencies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg = latencies.iter().sum::<f64>() / received as f64;
        let jitter = if received > 1 {
            let diffs: f64 = latencies
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).abs())
                .sum();
            diffs / (received - 1) as f64
        } else {
            0.0
        };
        (
            Some(round2(min)),
            Some(round2(max)),
            Some(round2(avg)),
            Some(round2(jitter)),
        )
    };

    PingReport {
        host: host.to_string(),
        ip: ip.to_string(),
        probes_sent: sent,
        probes_received: received,
        packet_loss_percent: round2(loss),
        min_latency_ms: min,
        max_latency_ms: max,
        avg_latency_ms: avg,
        jitter_ms: jitter,
        reachable: received > 0,
        timestamp: Utc::now(),
    }
}

fn unreachable_report(host: &str, ip: IpAddr, sent: usize) -> PingReport {
    build_report(host, ip, sent, &[])
}

/// Resolve a hostname or IP literal to a single address
pub(crate) async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::InvalidHost(host.to_string()));
    }
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(ip);
    }
    let candidates = tokio::net::lookup_host(format!("{}:0", trimmed))
        .await
        .map_err(|_| ProbeError::InvalidHost(host.to_string()))?;
    candidates
        .map(|addr| addr.ip())
        .next()
        .ok_or_else(|| ProbeError::InvalidHost(host.to_string()))
}

pub(crate) fn rand_identifier() -> u16 {
    // Nanosecond clock bits are enough to keep concurrent pingers apart.
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % u16::MAX as u32) as u16
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
