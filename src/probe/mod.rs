//! Active network probes
//!
//! ICMP ping, hop-by-hop traceroute, DNS lookups, TCP port scans, and the
//! subnet sweep used as fallback discovery when no router adapter answers.
//! A host that does not answer is data, not an error; `ProbeError` covers
//! only invalid input rejected before any I/O.

pub mod dns;
pub mod ping;
pub mod ports;
pub mod sweep;
pub mod traceroute;

use thiserror::Error;

pub use dns::{dns_lookup, reverse_dns_lookup, DnsRecordType, DnsReport};
pub use ping::{ping, PingReport};
pub use ports::{full_scan, quick_scan, PortScanReport};
pub use sweep::{sweep_subnet, SweepHost};
pub use traceroute::{traceroute, TracerouteHop, TracerouteReport};

/// Probe input validation errors, raised before any packet is sent
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Invalid host '{0}': not an IP address or resolvable hostname")]
    InvalidHost(String),

    #[error("Invalid ping count {0}: must be between 1 and {1}")]
    InvalidCount(usize, usize),

    #[error("Invalid hop limit {0}: must be between 1 and {1}")]
    InvalidHopLimit(u8, u8),

    #[error("Invalid port range {0}-{1}")]
    InvalidPortRange(u16, u16),

    #[error("Unsupported DNS record type '{0}'")]
    UnsupportedRecordType(String),

    #[error("Host '{0}' is not an IPv4 address")]
    NotIpv4(String),
}
