//! Forward and reverse DNS lookups

use chrono::{DateTime, Utc};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tokio::time::timeout;

use crate::config::REVERSE_DNS_TIMEOUT;
use crate::probe::ProbeError;

/// Record types the `dns` command accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    Aaaa,
    Mx,
    Txt,
    Ns,
    Cname,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRecordType::A => "A",
            DnsRecordType::Aaaa => "AAAA",
            DnsRecordType::Mx => "MX",
            DnsRecordType::Txt => "TXT",
            DnsRecordType::Ns => "NS",
            DnsRecordType::Cname => "CNAME",
        }
    }
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DnsRecordType {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(DnsRecordType::A),
            "AAAA" => Ok(DnsRecordType::Aaaa),
            "MX" => Ok(DnsRecordType::Mx),
            "TXT" => Ok(DnsRecordType::Txt),
            "NS" => Ok(DnsRecordType::Ns),
            "CNAME" => Ok(DnsRecordType::Cname),
            other => Err(ProbeError::UnsupportedRecordType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsReport {
    pub domain: String,
    pub record_type: DnsRecordType,
    pub records: Vec<String>,
    /// Best-effort PTR of the first address, A lookups only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_hostname: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Query the system resolver for the given record type.
///
/// An empty answer set is a normal report. Resolver errors (NXDOMAIN,
/// SERVFAIL, timeouts) also yield an empty record list rather than failing,
/// matching how unreachable hosts are handled elsewhere.
pub async fn dns_lookup(domain: &str, record_type: DnsRecordType) -> Result<DnsReport, ProbeError> {
    let domain = domain.trim();
    if domain.is_empty() || domain.contains(char::is_whitespace) {
        return Err(ProbeError::InvalidHost(domain.to_string()));
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let records: Vec<String> = match record_type {
        DnsRecordType::A => resolver
            .ipv4_lookup(domain)
            .await
            .map(|answer| answer.iter().map(|a| a.to_string()).collect())
            .unwrap_or_default(),
        DnsRecordType::Aaaa => resolver
            .ipv6_lookup(domain)
            .await
            .map(|answer| answer.iter().map(|a| a.to_string()).collect())
            .unwrap_or_default(),
        DnsRecordType::Mx => resolver
            .mx_lookup(domain)
            .await
            .map(|answer| {
                answer
                    .iter()
                    .map(|mx| format!("{} {}", mx.preference(), mx.exchange()))
                    .collect()
            })
            .unwrap_or_default(),
        DnsRecordType::Txt => resolver
            .txt_lookup(domain)
            .await
            .map(|answer| answer.iter().map(|txt| txt.to_string()).collect())
            .unwrap_or_default(),
        DnsRecordType::Ns => resolver
            .ns_lookup(domain)
            .await
            .map(|answer| answer.iter().map(|ns| ns.to_string()).collect())
            .unwrap_or_default(),
        DnsRecordType::Cname => resolver
            .lookup(domain, RecordType::CNAME)
            .await
            .map(|answer| answer.iter().map(|r| r.to_string()).collect())
            .unwrap_or_default(),
    };

    let reverse_hostname = if record_type == DnsRecordType::A {
        match records.first().and_then(|r| r.parse::<IpAddr>().ok()) {
            Some(ip) => reverse_dns_lookup(ip).await.into_iter().next(),
            None => None,
        }
    } else {
        None
    };

    Ok(DnsReport {
        domain: domain.to_string(),
        record_type,
        records,
        reverse_hostname,
        timestamp: Utc::now(),
    })
}

/// Reverse-resolve an address to hostnames. Never errors; no PTR record,
/// NXDOMAIN, and timeouts all come back as an empty list.
pub async fn reverse_dns_lookup(ip: IpAddr) -> Vec<String> {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));
    match timeout(REVERSE_DNS_TIMEOUT, lookup).await {
        Ok(Ok(Ok(hostname))) => {
            // lookup_addr echoes the address back when there is no PTR record
            if hostname == ip.to_string() {
                Vec::new()
            } else {
                vec![hostname]
            }
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_parses_case_insensitively() {
        assert_eq!("a".parse::<DnsRecordType>().expect("parse"), DnsRecordType::A);
        assert_eq!(
            "CNAME".parse::<DnsRecordType>().expect("parse"),
            DnsRecordType::Cname
        );
        assert_eq!(
            " mx ".parse::<DnsRecordType>().expect("parse"),
            DnsRecordType::Mx
        );
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        let err = "SRV".parse::<DnsRecordType>().unwrap_err();
        assert_eq!(err, ProbeError::UnsupportedRecordType("SRV".to_string()));
    }

    #[tokio::test]
    async fn whitespace_domain_is_rejected() {
        let result = dns_lookup("bad domain", DnsRecordType::A).await;
        assert!(matches!(result, Err(ProbeError::InvalidHost(_))));
    }

    #[tokio::test]
    async fn reverse_lookup_never_errors() {
        // TEST-NET-1 has no PTR record anywhere
        let hostnames = reverse_dns_lookup("192.0.2.1".parse().expect("ip")).await;
        assert!(hostnames.is_empty() || !hostnames[0].is_empty());
    }
}
