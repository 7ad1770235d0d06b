//! Configuration constants for the NetGuard core engine

use std::time::Duration;

// ====== Probe Configuration ======

/// Timeout for each ICMP echo probe
pub const PING_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum echo probes accepted per ping request
pub const MAX_PING_COUNT: usize = 30;

/// Default echo probes per ping request
pub const DEFAULT_PING_COUNT: usize = 10;

/// Maximum concurrent pings during a subnet sweep
pub const MAX_CONCURRENT_SWEEP_PINGS: usize = 64;

/// Per-host timeout during a subnet sweep (shorter than a diagnostic ping)
pub const SWEEP_PING_TIMEOUT: Duration = Duration::from_millis(800);

/// ARP resolution timeout per swept host
pub const ARP_RESOLVE_TIMEOUT: Duration = Duration::from_millis(500);

// ====== Traceroute Configuration ======

/// Default maximum hops to trace
pub const TRACE_MAX_HOPS: u8 = 30;

/// Overall wall-clock budget for a traceroute
pub const TRACE_OVERALL_BUDGET: Duration = Duration::from_secs(60);

/// Stop early after this many consecutive unanswered hops
pub const TRACE_MAX_CONSECUTIVE_TIMEOUTS: u8 = 5;

// ====== Port Scan Configuration ======

/// TCP connect timeout per probed port
pub const PORT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Maximum concurrent TCP connect attempts (worker pool size)
pub const MAX_CONCURRENT_PORT_PROBES: usize = 100;

/// Overall deadline for a port scan
pub const PORT_SCAN_DEADLINE: Duration = Duration::from_secs(60);

/// Upper bound of the default full-scan range
pub const FULL_SCAN_MAX_PORT: u16 = 1024;

/// Common ports probed by a quick scan
pub const QUICK_SCAN_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 445, 3306, 3389, 5432, 5900, 6379, 8080, 8443, 27017,
];

/// Ports whose exposure alone marks a host high risk
pub const HIGH_RISK_PORTS: &[u16] = &[21, 23, 445, 3389, 5900];

/// Ports whose exposure marks a host medium risk
pub const MEDIUM_RISK_PORTS: &[u16] = &[22, 25, 110, 143, 3306, 5432, 6379, 27017];

// ====== DNS Configuration ======

/// Timeout for a blocking reverse lookup
pub const REVERSE_DNS_TIMEOUT: Duration = Duration::from_millis(2000);

/// Maximum concurrent reverse lookups
pub const MAX_CONCURRENT_DNS: usize = 10;

// ====== Router Adapter Configuration ======

/// HTTP timeout for router management API calls
pub const ROUTER_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// User-Agent presented to router firmware (some reject unknown clients)
pub const ROUTER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// ====== Risk Scoring ======

/// Weight added for a newly observed device
pub const RISK_NEW_DEVICE: u8 = 20;

/// Weight added when the vendor could not be resolved
pub const RISK_UNKNOWN_VENDOR: u8 = 15;

/// Weight added when the device type is unresolved or a generic network device
pub const RISK_UNKNOWN_TYPE: u8 = 10;

/// Weight added for watch-listed IoT-ish device types
pub const RISK_WATCHED_TYPE: u8 = 5;

/// Connect/disconnect churn threshold for the anomaly rule
pub const ANOMALY_CHURN_THRESHOLD: i64 = 20;

/// History window consulted for anomaly detection
pub const ANOMALY_HISTORY_LIMIT: i64 = 100;

// ====== Scheduler Configuration ======

/// Default scan interval in seconds
pub const DEFAULT_SCAN_INTERVAL: u64 = 60;

/// Minimum scan interval in seconds
pub const MIN_SCAN_INTERVAL: u64 = 10;

/// Maximum scan interval in seconds
pub const MAX_SCAN_INTERVAL: u64 = 3600;
