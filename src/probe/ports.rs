//! TCP connect scanning and open-port risk classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

use crate::config::{
    FULL_SCAN_MAX_PORT, HIGH_RISK_PORTS, MAX_CONCURRENT_PORT_PROBES, MEDIUM_RISK_PORTS,
    PORT_CONNECT_TIMEOUT, PORT_SCAN_DEADLINE, QUICK_SCAN_PORTS,
};
use crate::probe::ping::resolve_host;
use crate::probe::ProbeError;
use crate::risk::RiskLevel;

/// One open port with its best-effort service name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanReport {
    pub host: String,
    pub ip: String,
    pub open_ports: Vec<OpenPort>,
    pub total_scanned: usize,
    pub duration_ms: u64,
    pub risk_level: RiskLevel,
    pub vulnerabilities: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Probe the fixed list of common ports
pub async fn quick_scan(host: &str) -> Result<PortScanReport, ProbeError> {
    let target = resolve_host(host).await?;
    Ok(scan(host, target, QUICK_SCAN_PORTS.to_vec()).await)
}

/// Probe a numeric port range, default 1..=1024
pub async fn full_scan(
    host: &str,
    range: Option<(u16, u16)>,
) -> Result<PortScanReport, ProbeError> {
    let (start, end) = range.unwrap_or((1, FULL_SCAN_MAX_PORT));
    if start == 0 || start > end {
        return Err(ProbeError::InvalidPortRange(start, end));
    }
    let target = resolve_host(host).await?;
    Ok(scan(host, target, (start..=end).collect()).await)
}

async fn scan(host: &str, target: IpAddr, ports: Vec<u16>) -> PortScanReport {
    let started = Instant::now();
    let total = ports.len();
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PORT_PROBES));
    let open: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));

    let fan_out = async {
        let mut handles = Vec::with_capacity(total);
        for port in ports {
            let semaphore = Arc::clone(&semaphore);
            let open = Arc::clone(&open);
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let addr = std::net::SocketAddr::new(target, port);
                if let Ok(Ok(_stream)) = timeout(PORT_CONNECT_TIMEOUT, TcpStream::connect(addr)).await
                {
                    open.lock().await.push(port);
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Port probe task failed: {}", e);
            }
        }
    };

    // The scan returns whatever it found when the deadline hits.
    if timeout(PORT_SCAN_DEADLINE, fan_out).await.is_err() {
        tracing::warn!("Port scan of {} hit the overall deadline", target);
    }

    let mut open_ports: Vec<u16> = open.lock().await.clone();
    open_ports.sort_unstable();

    let (risk_level, vulnerabilities) = classify(&open_ports);
    let open_ports = open_ports
        .into_iter()
        .map(|port| OpenPort {
            port,
            service: service_name(port).to_string(),
        })
        .collect();

    PortScanReport {
        host: host.to_string(),
        ip: target.to_string(),
        open_ports,
        total_scanned: total,
        duration_ms: started.elapsed().as_millis() as u64,
        risk_level,
        vulnerabilities,
        timestamp: Utc::now(),
    }
}

/// Well-known service table for scan output
pub fn service_name(port: u16) -> &'static str {
    static TABLE: &[(u16, &str)] = &[
        (21, "FTP"),
        (22, "SSH"),
        (23, "Telnet"),
        (25, "SMTP"),
        (53, "DNS"),
        (80, "HTTP"),
        (110, "POP3"),
        (143, "IMAP"),
        (443, "HTTPS"),
        (445, "SMB"),
        (3306, "MySQL"),
        (3389, "RDP"),
        (5432, "PostgreSQL"),
        (5900, "VNC"),
        (6379, "Redis"),
        (8080, "HTTP-Alt"),
        (8443, "HTTPS-Alt"),
        (27017, "MongoDB"),
    ];
    TABLE
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

/// Classify an open-port set. Deterministic: identical sets always produce
/// identical level and note list, so notes follow ascending port order.
pub fn classify(open_ports: &[u16]) -> (RiskLevel, Vec<String>) {
    let notes: HashMap<u16, &str> = HashMap::from([
        (23, "Telnet (port 23) is open — unencrypted remote access"),
        (21, "FTP (port 21) is open — unencrypted file transfer"),
        (445, "SMB (port 445) is open — potential ransomware vector"),
        (3389, "RDP (port 3389) is open — remote desktop exposed"),
        (5900, "VNC (port 5900) is open — remote desktop exposed"),
        (22, "SSH (port 22) is open — ensure strong authentication"),
        (3306, "MySQL (port 3306) is exposed — database should not be public"),
        (5432, "PostgreSQL (port 5432) is exposed — database should not be public"),
        (6379, "Redis (port 6379) is exposed — often misconfigured without auth"),
        (27017, "MongoDB (port 27017) is exposed — check authentication"),
    ]);

    let mut sorted: Vec<u16> = open_ports.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut max_tier: u8 = 0;
    let mut vulnerabilities = Vec::new();
    for port in sorted {
        if HIGH_RISK_PORTS.contains(&port) {
            max_tier = max_tier.max(3);
        } else if MEDIUM_RISK_PORTS.contains(&port) {
            max_tier = max_tier.max(2);
        } else if port < 1024 {
            max_tier = max_tier.max(1);
        }
        if let Some(note) = notes.get(&port) {
            vulnerabilities.push((*note).to_string());
        }
    }

    let level = match max_tier {
        3 => RiskLevel::Critical,
        2 => RiskLevel::High,
        1 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    };
    (level, vulnerabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_low_risk() {
        let (level, notes) = classify(&[]);
        assert_eq!(level, RiskLevel::Low);
        assert!(notes.is_empty());
    }

    #[test]
    fn telnet_alone_is_critical_with_warning() {
        let (level, notes) = classify(&[23]);
        assert_eq!(level, RiskLevel::Critical);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("Telnet"));
    }

    #[test]
    fn medium_risk_ports_classify_as_high() {
        let (level, notes) = classify(&[22, 6379]);
        assert_eq!(level, RiskLevel::High);
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().any(|n| n.contains("Redis")));
    }

    #[test]
    fn privileged_only_is_medium() {
        let (level, notes) = classify(&[80, 443]);
        assert_eq!(level, RiskLevel::Medium);
        assert!(notes.is_empty());
    }

    #[test]
    fn unprivileged_unknown_port_is_low() {
        let (level, _) = classify(&[8080]);
        assert_eq!(level, RiskLevel::Low);
    }

    #[test]
    fn classification_is_order_independent() {
        let forward = classify(&[22, 23, 80]);
        let backward = classify(&[80, 23, 22]);
        assert_eq!(forward, backward);
        assert_eq!(forward.0, RiskLevel::Critical);
    }

    #[test]
    fn service_table_covers_common_ports() {
        assert_eq!(service_name(21), "FTP");
        assert_eq!(service_name(443), "HTTPS");
        assert_eq!(service_name(8080), "HTTP-Alt");
        assert_eq!(service_name(12345), "unknown");
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let result = full_scan("192.0.2.1", Some((100, 10))).await;
        assert_eq!(result.unwrap_err(), ProbeError::InvalidPortRange(100, 10));
    }

    #[tokio::test]
    async fn zero_start_port_is_rejected() {
        let result = full_scan("192.0.2.1", Some((0, 10))).await;
        assert!(matches!(result, Err(ProbeError::InvalidPortRange(0, 10))));
    }
}
