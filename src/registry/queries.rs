//! Registry query functions
//!
//! CRUD operations for devices, history events, alerts, and router
//! credentials. All functions take a borrowed connection; callers hold the
//! database lock.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

use super::encryption;
use super::models::{
    AlertRecord, AlertSeverity, AlertType, DeviceRecord, HistoryEventKind, HistoryRecord,
};
use crate::risk::RiskLevel;
use crate::router::{RouterConfig, RouterType};

/// Parameters used to insert a device record
pub struct DeviceInsert<'a> {
    pub account_id: &'a str,
    pub ip: &'a str,
    pub mac: &'a str,
    pub hostname: Option<&'a str>,
    pub device_type: Option<&'a str>,
    pub vendor: Option<&'a str>,
    pub is_online: bool,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub router_type: Option<RouterType>,
    pub router_ip: Option<&'a str>,
    pub signal: Option<i64>,
    pub bandwidth: Option<i64>,
}

/// Parameters used to insert an alert record
pub struct AlertInsert<'a> {
    pub account_id: &'a str,
    pub device_id: Option<i64>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: &'a str,
    pub message: &'a str,
    pub dedupe_key: Option<&'a str>,
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(text: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_device(row: &Row<'_>) -> rusqlite::Result<DeviceRecord> {
    let risk_level: String = row.get("risk_level")?;
    let router_type: Option<String> = row.get("router_type")?;
    let first_seen: String = row.get("first_seen")?;
    let last_seen: String = row.get("last_seen")?;
    let risk_score: i64 = row.get("risk_score")?;
    Ok(DeviceRecord {
        id: row.get("id")?,
        account_id: row.get("account_id")?,
        ip: row.get("ip")?,
        mac: row.get("mac")?,
        hostname: row.get("hostname")?,
        custom_name: row.get("custom_name")?,
        device_type: row.get("device_type")?,
        vendor: row.get("vendor")?,
        is_online: row.get::<_, i64>("is_online")? != 0,
        is_blocked: row.get::<_, i64>("is_blocked")? != 0,
        risk_score: risk_score.clamp(0, 100) as u8,
        risk_level: RiskLevel::from_str(&risk_level).unwrap_or(RiskLevel::Low),
        router_type: router_type.and_then(|t| RouterType::from_str(&t).ok()),
        router_ip: row.get("router_ip")?,
        signal: row.get("signal")?,
        bandwidth: row.get("bandwidth")?,
        first_seen: parse_ts(first_seen),
        last_seen: parse_ts(last_seen),
    })
}

/// Insert a new device together with its first history event.
///
/// Runs inside a savepoint so a half-created device never survives.
pub fn create_device(
    conn: &Connection,
    insert: &DeviceInsert<'_>,
    first_event: HistoryEventKind,
    first_event_details: Option<&str>,
) -> Result<i64> {
    conn.execute_batch("SAVEPOINT create_device")
        .context("Failed to start create_device transaction")?;

    let result = (|| -> Result<i64> {
        let now = now_text();
        conn.execute(
            r#"
            INSERT INTO devices (
                account_id, mac, ip, hostname, device_type, vendor,
                is_online, is_blocked, risk_score, risk_level,
                router_type, router_ip, signal, bandwidth, first_seen, last_seen
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            "#,
            params![
                insert.account_id,
                insert.mac,
                insert.ip,
                insert.hostname,
                insert.device_type,
                insert.vendor,
                insert.is_online as i64,
                insert.risk_score as i64,
                insert.risk_level.as_str(),
                insert.router_type.map(|t| t.as_str()),
                insert.router_ip,
                insert.signal,
                insert.bandwidth,
                now,
            ],
        )
        .context("Failed to insert device")?;

        let device_id = conn.last_insert_rowid();
        append_history(conn, device_id, first_event, first_event_details)?;
        Ok(device_id)
    })();

    match result {
        Ok(device_id) => {
            conn.execute_batch("RELEASE SAVEPOINT create_device")
                .context("Failed to commit create_device transaction")?;
            Ok(device_id)
        }
        Err(e) => {
            let _ = conn.execute_batch(
                "ROLLBACK TO SAVEPOINT create_device; RELEASE SAVEPOINT create_device",
            );
            Err(e)
        }
    }
}

pub fn get_device_by_mac(
    conn: &Connection,
    account_id: &str,
    mac: &str,
) -> Result<Option<DeviceRecord>> {
    conn.query_row(
        "SELECT * FROM devices WHERE account_id = ?1 AND mac = ?2",
        params![account_id, mac],
        map_device,
    )
    .optional()
    .context("Failed to query device by mac")
}

pub fn get_device_by_id(conn: &Connection, device_id: i64) -> Result<Option<DeviceRecord>> {
    conn.query_row(
        "SELECT * FROM devices WHERE id = ?1",
        params![device_id],
        map_device,
    )
    .optional()
    .context("Failed to query device by id")
}

pub fn list_devices(conn: &Connection, account_id: &str) -> Result<Vec<DeviceRecord>> {
    let mut stmt = conn
        .prepare("SELECT * FROM devices WHERE account_id = ?1 ORDER BY last_seen DESC")
        .context("Failed to prepare device list query")?;
    let devices = stmt
        .query_map(params![account_id], map_device)
        .context("Failed to list devices")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read device rows")?;
    Ok(devices)
}

/// Refresh an observed device: new ip, online, fresh last_seen.
pub fn mark_seen(conn: &Connection, device_id: i64, ip: &str) -> Result<()> {
    conn.execute(
        "UPDATE devices SET ip = ?2, is_online = 1, last_seen = ?3 WHERE id = ?1",
        params![device_id, ip, now_text()],
    )
    .context("Failed to mark device seen")?;
    Ok(())
}

pub fn mark_offline(conn: &Connection, device_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE devices SET is_online = 0, last_seen = ?2 WHERE id = ?1",
        params![device_id, now_text()],
    )
    .context("Failed to mark device offline")?;
    Ok(())
}

pub fn update_risk(conn: &Connection, device_id: i64, score: u8, level: RiskLevel) -> Result<()> {
    conn.execute(
        "UPDATE devices SET risk_score = ?2, risk_level = ?3 WHERE id = ?1",
        params![device_id, score as i64, level.as_str()],
    )
    .context("Failed to update device risk")?;
    Ok(())
}

pub fn set_blocked(conn: &Connection, device_id: i64, blocked: bool) -> Result<()> {
    conn.execute(
        "UPDATE devices SET is_blocked = ?2 WHERE id = ?1",
        params![device_id, blocked as i64],
    )
    .context("Failed to update device blocked flag")?;
    Ok(())
}

pub fn set_custom_name(conn: &Connection, device_id: i64, name: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE devices SET custom_name = ?2 WHERE id = ?1",
        params![device_id, name],
    )
    .context("Failed to update device custom name")?;
    Ok(())
}

pub fn append_history(
    conn: &Connection,
    device_id: i64,
    kind: HistoryEventKind,
    details: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO device_history (device_id, event_kind, details, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![device_id, kind.to_string(), details, now_text()],
    )
    .context("Failed to append history event")?;
    Ok(conn.last_insert_rowid())
}

pub fn list_history(conn: &Connection, device_id: i64, limit: i64) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, device_id, event_kind, details, created_at \
             FROM device_history WHERE device_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .context("Failed to prepare history query")?;
    let events = stmt
        .query_map(params![device_id, limit], |row| {
            let kind: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            Ok(HistoryRecord {
                id: row.get(0)?,
                device_id: row.get(1)?,
                event_kind: HistoryEventKind::from_str(&kind)
                    .unwrap_or(HistoryEventKind::Connected),
                details: row.get(3)?,
                created_at: parse_ts(created_at),
            })
        })
        .context("Failed to list history")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read history rows")?;
    Ok(events)
}

/// Connected and disconnected event counts within the most recent `limit`
/// events, the inputs to churn anomaly detection.
pub fn history_churn_counts(conn: &Connection, device_id: i64, limit: i64) -> Result<(i64, i64)> {
    let count = |kind: &str| -> Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM ( \
                SELECT event_kind FROM device_history \
                WHERE device_id = ?1 ORDER BY id DESC LIMIT ?2 \
             ) WHERE event_kind = ?3",
            params![device_id, limit, kind],
            |row| row.get(0),
        )
        .context("Failed to count history events")
    };
    Ok((count("connected")?, count("disconnected")?))
}

/// Insert an alert unless an unresolved alert with the same dedupe key
/// already exists. Returns None when deduplicated.
pub fn insert_alert(conn: &Connection, insert: &AlertInsert<'_>) -> Result<Option<i64>> {
    if let Some(key) = insert.dedupe_key {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM security_alerts \
                 WHERE account_id = ?1 AND dedupe_key = ?2 AND resolved = 0",
                params![insert.account_id, key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check alert dedupe key")?;
        if existing.is_some() {
            return Ok(None);
        }
    }

    conn.execute(
        "INSERT INTO security_alerts \
         (account_id, device_id, alert_type, severity, title, message, dedupe_key, resolved, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        params![
            insert.account_id,
            insert.device_id,
            insert.alert_type.as_str(),
            insert.severity.as_str(),
            insert.title,
            insert.message,
            insert.dedupe_key,
            now_text(),
        ],
    )
    .context("Failed to insert alert")?;
    Ok(Some(conn.last_insert_rowid()))
}

pub fn list_alerts(
    conn: &Connection,
    account_id: &str,
    include_resolved: bool,
) -> Result<Vec<AlertRecord>> {
    let sql = if include_resolved {
        "SELECT id, account_id, device_id, alert_type, severity, title, message, resolved, resolved_at, created_at \
         FROM security_alerts WHERE account_id = ?1 ORDER BY id DESC"
    } else {
        "SELECT id, account_id, device_id, alert_type, severity, title, message, resolved, resolved_at, created_at \
         FROM security_alerts WHERE account_id = ?1 AND resolved = 0 ORDER BY id DESC"
    };
    let mut stmt = conn.prepare(sql).context("Failed to prepare alert query")?;
    let alerts = stmt
        .query_map(params![account_id], |row| {
            let alert_type: String = row.get(3)?;
            let severity: String = row.get(4)?;
            let resolved_at: Option<String> = row.get(8)?;
            let created_at: String = row.get(9)?;
            Ok(AlertRecord {
                id: row.get(0)?,
                account_id: row.get(1)?,
                device_id: row.get(2)?,
                alert_type: AlertType::from_str(&alert_type).unwrap_or(AlertType::NewDevice),
                severity: AlertSeverity::from_str(&severity).unwrap_or(AlertSeverity::Low),
                title: row.get(5)?,
                message: row.get(6)?,
                resolved: row.get::<_, i64>(7)? != 0,
                resolved_at: resolved_at.map(parse_ts),
                created_at: parse_ts(created_at),
            })
        })
        .context("Failed to list alerts")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read alert rows")?;
    Ok(alerts)
}

/// Resolve an alert, checking account ownership. True when a row changed.
pub fn resolve_alert(conn: &Connection, account_id: &str, alert_id: i64) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE security_alerts SET resolved = 1, resolved_at = ?3 \
             WHERE id = ?1 AND account_id = ?2",
            params![alert_id, account_id, now_text()],
        )
        .context("Failed to resolve alert")?;
    Ok(changed > 0)
}

/// Store router credentials, replacing any existing entry for the same
/// account and address. Credentials are encrypted before they touch disk.
pub fn save_router(conn: &Connection, account_id: &str, config: &RouterConfig) -> Result<i64> {
    let username_enc = encryption::encrypt_secret(&config.username)?;
    let password_enc = encryption::encrypt_secret(&config.password)?;
    conn.execute(
        "INSERT INTO router_settings (account_id, router_type, ip, username_enc, password_enc, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(account_id, ip) DO UPDATE SET \
            router_type = excluded.router_type, \
            username_enc = excluded.username_enc, \
            password_enc = excluded.password_enc",
        params![
            account_id,
            config.router_type.as_str(),
            config.ip,
            username_enc,
            password_enc,
            now_text(),
        ],
    )
    .context("Failed to save router settings")?;
    Ok(conn.last_insert_rowid())
}

/// Load and decrypt every router configured for an account. Rows whose
/// credentials no longer decrypt (registry copied across machines) are
/// skipped with a warning.
pub fn list_routers(conn: &Connection, account_id: &str) -> Result<Vec<RouterConfig>> {
    let mut stmt = conn
        .prepare(
            "SELECT router_type, ip, username_enc, password_enc \
             FROM router_settings WHERE account_id = ?1 ORDER BY id",
        )
        .context("Failed to prepare router settings query")?;
    let rows = stmt
        .query_map(params![account_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .context("Failed to list router settings")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read router settings rows")?;

    let mut configs = Vec::with_capacity(rows.len());
    for (router_type, ip, username_enc, password_enc) in rows {
        let Ok(router_type) = RouterType::from_str(&router_type) else {
            tracing::warn!("Skipping router {} with unknown type {}", ip, router_type);
            continue;
        };
        let credentials = encryption::decrypt_secret(&username_enc)
            .and_then(|username| Ok((username, encryption::decrypt_secret(&password_enc)?)));
        match credentials {
            Ok((username, password)) => configs.push(RouterConfig {
                router_type,
                ip,
                username,
                password,
            }),
            Err(e) => tracing::warn!("Skipping router {}: credential decrypt failed: {}", ip, e),
        }
    }
    Ok(configs)
}

pub fn delete_router(conn: &Connection, account_id: &str, ip: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "DELETE FROM router_settings WHERE account_id = ?1 AND ip = ?2",
            params![account_id, ip],
        )
        .context("Failed to delete router settings")?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Database;

    fn test_insert<'a>(mac: &'a str) -> DeviceInsert<'a> {
        DeviceInsert {
            account_id: "acct-1",
            ip: "192.168.1.50",
            mac,
            hostname: Some("laptop"),
            device_type: Some("Dell Laptop"),
            vendor: Some("Dell"),
            is_online: true,
            risk_score: 20,
            risk_level: RiskLevel::Low,
            router_type: Some(RouterType::Huawei),
            router_ip: Some("192.168.1.1"),
            signal: None,
            bandwidth: None,
        }
    }

    #[test]
    fn create_and_fetch_device_round_trips() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let id = create_device(&conn, &test_insert("AA:BB:CC:DD:EE:FF"), HistoryEventKind::Connected, None)
            .expect("create");
        let fetched = get_device_by_mac(&conn, "acct-1", "AA:BB:CC:DD:EE:FF")
            .expect("query")
            .expect("device exists");
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.risk_score, 20);
        assert_eq!(fetched.risk_level, RiskLevel::Low);
        assert_eq!(fetched.router_type, Some(RouterType::Huawei));
        assert!(fetched.is_online);
        assert!(!fetched.is_blocked);

        let history = list_history(&conn, id, 10).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_kind, HistoryEventKind::Connected);
    }

    #[test]
    fn duplicate_mac_insert_fails_and_leaves_no_history() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let id = create_device(&conn, &test_insert("AA:BB:CC:DD:EE:FF"), HistoryEventKind::Connected, None)
            .expect("create");
        assert!(
            create_device(&conn, &test_insert("AA:BB:CC:DD:EE:FF"), HistoryEventKind::Connected, None)
                .is_err()
        );
        // Savepoint rollback: only the first device's event remains
        let history = list_history(&conn, id, 10).expect("history");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn account_scoping_hides_other_accounts() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        create_device(&conn, &test_insert("AA:BB:CC:DD:EE:FF"), HistoryEventKind::Connected, None)
            .expect("create");
        assert!(get_device_by_mac(&conn, "acct-2", "AA:BB:CC:DD:EE:FF")
            .expect("query")
            .is_none());
        assert!(list_devices(&conn, "acct-2").expect("list").is_empty());
    }

    #[test]
    fn seen_and_offline_transitions_update_state() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let id = create_device(&conn, &test_insert("AA:BB:CC:DD:EE:FF"), HistoryEventKind::Connected, None)
            .expect("create");
        mark_offline(&conn, id).expect("offline");
        let device = get_device_by_id(&conn, id).expect("query").expect("exists");
        assert!(!device.is_online);

        mark_seen(&conn, id, "192.168.1.99").expect("seen");
        let device = get_device_by_id(&conn, id).expect("query").expect("exists");
        assert!(device.is_online);
        assert_eq!(device.ip, "192.168.1.99");
    }

    #[test]
    fn churn_counts_respect_the_window() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let id = create_device(&conn, &test_insert("AA:BB:CC:DD:EE:FF"), HistoryEventKind::Connected, None)
            .expect("create");
        for _ in 0..5 {
            append_history(&conn, id, HistoryEventKind::Connected, None).expect("event");
            append_history(&conn, id, HistoryEventKind::Disconnected, None).expect("event");
        }
        let (connected, disconnected) = history_churn_counts(&conn, id, 100).expect("counts");
        assert_eq!(connected, 6);
        assert_eq!(disconnected, 5);

        // A window of 2 only sees the most recent pair
        let (connected, disconnected) = history_churn_counts(&conn, id, 2).expect("counts");
        assert_eq!(connected, 1);
        assert_eq!(disconnected, 1);
    }

    #[test]
    fn alert_dedupe_suppresses_repeats_until_resolved() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let insert = AlertInsert {
            account_id: "acct-1",
            device_id: None,
            alert_type: AlertType::HighRiskDevice,
            severity: AlertSeverity::High,
            title: "t",
            message: "m",
            dedupe_key: Some("AA:BB:CC:DD:EE:FF/high_risk_device"),
        };
        let first = insert_alert(&conn, &insert).expect("insert");
        assert!(first.is_some());
        assert!(insert_alert(&conn, &insert).expect("insert").is_none());

        let id = first.expect("id");
        assert!(resolve_alert(&conn, "acct-1", id).expect("resolve"));
        assert!(insert_alert(&conn, &insert).expect("insert").is_some());
    }

    #[test]
    fn resolve_records_resolution_timestamp() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let insert = AlertInsert {
            account_id: "acct-1",
            device_id: None,
            alert_type: AlertType::AnomalyDetected,
            severity: AlertSeverity::Medium,
            title: "t",
            message: "m",
            dedupe_key: None,
        };
        let id = insert_alert(&conn, &insert).expect("insert").expect("id");

        let open = list_alerts(&conn, "acct-1", true).expect("list");
        assert!(!open[0].resolved);
        assert!(open[0].resolved_at.is_none());

        assert!(resolve_alert(&conn, "acct-1", id).expect("resolve"));
        let resolved = list_alerts(&conn, "acct-1", true).expect("list");
        assert!(resolved[0].resolved);
        let resolved_at = resolved[0].resolved_at.expect("timestamp recorded");
        assert!(resolved_at >= resolved[0].created_at);
    }

    #[test]
    fn resolve_checks_account_ownership() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let insert = AlertInsert {
            account_id: "acct-1",
            device_id: None,
            alert_type: AlertType::NewDevice,
            severity: AlertSeverity::Low,
            title: "t",
            message: "m",
            dedupe_key: None,
        };
        let id = insert_alert(&conn, &insert).expect("insert").expect("id");
        assert!(!resolve_alert(&conn, "acct-2", id).expect("resolve"));
        assert!(resolve_alert(&conn, "acct-1", id).expect("resolve"));
    }

    #[test]
    fn router_settings_round_trip_encrypted() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let config = RouterConfig {
            router_type: RouterType::Rain101,
            ip: "192.168.0.1".to_string(),
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        save_router(&conn, "acct-1", &config).expect("save");

        // Stored ciphertext never contains the plaintext
        let stored: String = conn
            .query_row(
                "SELECT password_enc FROM router_settings WHERE ip = '192.168.0.1'",
                [],
                |row| row.get(0),
            )
            .expect("stored row");
        assert!(!stored.contains("hunter2"));

        let configs = list_routers(&conn, "acct-1").expect("list");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].username, "admin");
        assert_eq!(configs[0].password, "hunter2");
        assert_eq!(configs[0].router_type, RouterType::Rain101);

        assert!(delete_router(&conn, "acct-1", "192.168.0.1").expect("delete"));
        assert!(list_routers(&conn, "acct-1").expect("list").is_empty());
    }

    #[test]
    fn save_router_upserts_per_account_and_ip() {
        let db = Database::in_memory().expect("db");
        let conn = db.connection();
        let conn = conn.lock().expect("lock");

        let mut config = RouterConfig {
            router_type: RouterType::Huawei,
            ip: "192.168.8.1".to_string(),
            username: "admin".to_string(),
            password: "old".to_string(),
        };
        save_router(&conn, "acct-1", &config).expect("save");
        config.password = "new".to_string();
        save_router(&conn, "acct-1", &config).expect("save again");

        let configs = list_routers(&conn, "acct-1").expect("list");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].password, "new");
    }
}
