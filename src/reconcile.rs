//! Set reconciliation between observed devices and the registry
//!
//! observed − known creates, observed ∩ known updates, known − observed goes
//! offline. Running the same observation twice is a no-op the second time:
//! no duplicate devices, no duplicate history events.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::fingerprint;
use crate::models::UnifiedDevice;
use crate::registry::{queries, Database, DeviceInsert, HistoryEventKind};
use crate::risk;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub new_count: usize,
    pub updated_count: usize,
    pub went_offline_count: usize,
}

/// Merge one batch of observations into the registry for an account.
pub fn reconcile(
    db: &Database,
    account_id: &str,
    observed: &[UnifiedDevice],
) -> Result<ReconcileSummary> {
    let conn = db.connection();
    let conn = conn
        .lock()
        .map_err(|_| anyhow!("Database connection lock poisoned during reconcile"))?;

    let known = queries::list_devices(&conn, account_id)?;
    let known_by_mac: HashMap<String, &crate::registry::DeviceRecord> =
        known.iter().map(|d| (d.mac.clone(), d)).collect();

    let mut summary = ReconcileSummary::default();
    let mut seen_macs: HashSet<String> = HashSet::new();

    for device in observed {
        let mac = device.mac.to_uppercase();
        // Two routers can report the same device; first observation wins.
        if !seen_macs.insert(mac.clone()) {
            continue;
        }

        match known_by_mac.get(&mac) {
            None => {
                let (vendor, device_type) = fingerprint::enrich(
                    &mac,
                    device.vendor.as_deref(),
                    device.device_type.as_deref(),
                );
                let score = risk::score(Some(&vendor), Some(&device_type), true);
                let insert = DeviceInsert {
                    account_id,
                    ip: &device.ip,
                    mac: &mac,
                    hostname: device.hostname.as_deref(),
                    device_type: Some(&device_type),
                    vendor: Some(&vendor),
                    is_online: device.is_online,
                    risk_score: score,
                    risk_level: risk::RiskLevel::from_score(score),
                    router_type: Some(device.router_type),
                    router_ip: Some(&device.router_ip),
                    signal: device.signal,
                    bandwidth: device.bandwidth,
                };
                let details =
                    format!("New device discovered via {} router", device.router_type);
                queries::create_device(&conn, &insert, HistoryEventKind::Connected, Some(&details))?;
                tracing::info!("New device discovered: {} ({})", mac, device.ip);
                summary.new_count += 1;
            }
            Some(record) => {
                if device.is_online {
                    if !record.is_online {
                        tracing::debug!("Device came back online: {} ({})", mac, device.ip);
                    }
                    queries::mark_seen(&conn, record.id, &device.ip)?;
                } else {
                    if record.is_online {
                        tracing::debug!("Device reported offline: {} ({})", mac, device.ip);
                        queries::append_history(
                            &conn,
                            record.id,
                            HistoryEventKind::Disconnected,
                            None,
                        )?;
                        summary.went_offline_count += 1;
                    }
                    queries::mark_offline(&conn, record.id)?;
                }
                summary.updated_count += 1;
            }
        }
    }

    // Devices the routers no longer report
    for record in &known {
        if seen_macs.contains(&record.mac) || !record.is_online {
            continue;
        }
        queries::mark_offline(&conn, record.id)?;
        queries::append_history(&conn, record.id, HistoryEventKind::Disconnected, None)?;
        tracing::info!("Device went offline: {} ({})", record.mac, record.ip);
        summary.went_offline_count += 1;
    }

    Ok(summary)
}
