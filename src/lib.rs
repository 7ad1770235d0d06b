//! NetGuard Core Engine — Home Network Discovery, Risk Assessment & Monitoring
//!
//! This crate provides the network security core:
//! - Active network probes (ping, traceroute, DNS, TCP port scanning, subnet sweep)
//! - Router adapters for Huawei and Rain 101 gateways (device list, block/unblock)
//! - Device registry backed by SQLite with history and security alerts
//! - Heuristic risk scoring plus optional AI threat classification
//! - Background scan scheduling with anomaly detection and auto-blocking

pub mod blocking;
pub mod config;
pub mod fingerprint;
pub mod logging;
pub mod models;
pub mod notify;
pub mod probe;
pub mod reconcile;
pub mod registry;
pub mod risk;
pub mod router;
pub mod scheduler;
pub mod threat;

pub use config::*;
pub use fingerprint::{enrich, identify, Fingerprint};
pub use models::UnifiedDevice;
pub use notify::{LogNotifier, Notification, Notifier};
pub use probe::{
    dns_lookup, full_scan, ping, quick_scan, reverse_dns_lookup, sweep_subnet, traceroute,
    DnsRecordType, DnsReport, PingReport, PortScanReport, ProbeError, SweepHost, TracerouteHop,
    TracerouteReport,
};
pub use reconcile::{reconcile, ReconcileSummary};
pub use registry::{
    AlertRecord, AlertSeverity, AlertType, Database, DeviceRecord, HistoryEventKind, HistoryRecord,
};
pub use risk::{detect_anomaly, AnomalyReport, AnomalySeverity, RiskLevel};
pub use router::{
    RawDevice, RouterAdapter, RouterConfig, RouterManager, RouterScanResult, RouterType,
};
pub use scheduler::{ScanScheduler, ScanState, SchedulerRegistry};
pub use threat::{ClassifierSettings, DeviceDigest, ThreatAssessment};
