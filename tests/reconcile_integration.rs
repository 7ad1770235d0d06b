use chrono::Utc;
use netguard_core::registry::queries;
use netguard_core::{reconcile, Database, HistoryEventKind, RouterType, UnifiedDevice};

fn observed(ip: &str, mac: &str) -> UnifiedDevice {
    UnifiedDevice {
        ip: ip.to_string(),
        mac: mac.to_string(),
        hostname: Some("test-host".to_string()),
        device_type: None,
        vendor: None,
        is_online: true,
        last_seen: Utc::now(),
        router_type: RouterType::Huawei,
        router_ip: "192.168.1.1".to_string(),
        signal: None,
        bandwidth: None,
    }
}

#[test]
fn first_scan_registers_devices_with_connected_history() {
    let db = Database::in_memory().expect("db");
    let batch = vec![
        observed("192.168.1.10", "F0:18:98:01:02:03"),
        observed("192.168.1.11", "AA:BB:CC:DD:EE:FF"),
    ];

    let summary = reconcile(&db, "acct-1", &batch).expect("reconcile");
    assert_eq!(summary.new_count, 2);
    assert_eq!(summary.updated_count, 0);
    assert_eq!(summary.went_offline_count, 0);

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let devices = queries::list_devices(&conn, "acct-1").expect("list");
    assert_eq!(devices.len(), 2);

    let macbook = queries::get_device_by_mac(&conn, "acct-1", "F0:18:98:01:02:03")
        .expect("query")
        .expect("device exists");
    assert_eq!(macbook.vendor.as_deref(), Some("Apple"));
    assert!(macbook.is_online);
    assert!(macbook.risk_score > 0, "new devices start with a risk score");

    let history = queries::list_history(&conn, macbook.id, 10).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_kind, HistoryEventKind::Connected);
    assert_eq!(
        history[0].details.as_deref(),
        Some("New device discovered via huawei router")
    );
}

#[test]
fn repeated_scan_updates_without_new_history() {
    let db = Database::in_memory().expect("db");
    let batch = vec![observed("192.168.1.10", "AA:BB:CC:DD:EE:FF")];
    reconcile(&db, "acct-1", &batch).expect("first scan");

    // Same device shows up again with a new DHCP lease
    let batch = vec![observed("192.168.1.42", "AA:BB:CC:DD:EE:FF")];
    let summary = reconcile(&db, "acct-1", &batch).expect("second scan");
    assert_eq!(summary.new_count, 0);
    assert_eq!(summary.updated_count, 1);

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let device = queries::get_device_by_mac(&conn, "acct-1", "AA:BB:CC:DD:EE:FF")
        .expect("query")
        .expect("device exists");
    assert_eq!(device.ip, "192.168.1.42");

    let history = queries::list_history(&conn, device.id, 10).expect("history");
    assert_eq!(history.len(), 1, "a reconnect is not a history event");
}

#[test]
fn missing_device_goes_offline_with_disconnect_history() {
    let db = Database::in_memory().expect("db");
    reconcile(
        &db,
        "acct-1",
        &[
            observed("192.168.1.10", "AA:BB:CC:DD:EE:01"),
            observed("192.168.1.11", "AA:BB:CC:DD:EE:02"),
        ],
    )
    .expect("first scan");

    let summary = reconcile(&db, "acct-1", &[observed("192.168.1.10", "AA:BB:CC:DD:EE:01")])
        .expect("second scan");
    assert_eq!(summary.went_offline_count, 1);

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let gone = queries::get_device_by_mac(&conn, "acct-1", "AA:BB:CC:DD:EE:02")
        .expect("query")
        .expect("device exists");
    assert!(!gone.is_online);

    let history = queries::list_history(&conn, gone.id, 10).expect("history");
    assert_eq!(history[0].event_kind, HistoryEventKind::Disconnected);
}

#[test]
fn router_reported_offline_device_gets_disconnect_history() {
    let db = Database::in_memory().expect("db");
    reconcile(&db, "acct-1", &[observed("192.168.1.10", "AA:BB:CC:DD:EE:01")]).expect("scan 1");

    // The router still lists the device but reports it as offline
    let mut offline = observed("192.168.1.10", "AA:BB:CC:DD:EE:01");
    offline.is_online = false;
    let summary = reconcile(&db, "acct-1", &[offline.clone()]).expect("scan 2");
    assert_eq!(summary.went_offline_count, 1);

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let device = queries::get_device_by_mac(&conn, "acct-1", "AA:BB:CC:DD:EE:01")
        .expect("query")
        .expect("device exists");
    assert!(!device.is_online);

    let history = queries::list_history(&conn, device.id, 10).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].event_kind, HistoryEventKind::Disconnected);
    drop(conn);

    // Stays offline on the next scan without another disconnect event
    let summary = reconcile(&db, "acct-1", &[offline]).expect("scan 3");
    assert_eq!(summary.went_offline_count, 0);
    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let history = queries::list_history(&conn, device.id, 10).expect("history");
    assert_eq!(history.len(), 2);
}

#[test]
fn device_returning_online_is_an_update_not_a_creation() {
    let db = Database::in_memory().expect("db");
    reconcile(&db, "acct-1", &[observed("192.168.1.10", "AA:BB:CC:DD:EE:01")]).expect("scan 1");
    reconcile(&db, "acct-1", &[]).expect("scan 2");

    let summary =
        reconcile(&db, "acct-1", &[observed("192.168.1.10", "AA:BB:CC:DD:EE:01")]).expect("scan 3");
    assert_eq!(summary.new_count, 0);
    assert_eq!(summary.updated_count, 1);

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let device = queries::get_device_by_mac(&conn, "acct-1", "AA:BB:CC:DD:EE:01")
        .expect("query")
        .expect("device exists");
    assert!(device.is_online);
    assert_eq!(queries::list_devices(&conn, "acct-1").expect("list").len(), 1);
}

#[test]
fn duplicate_mac_across_routers_is_recorded_once() {
    let db = Database::in_memory().expect("db");
    let mut second = observed("10.0.0.5", "AA:BB:CC:DD:EE:01");
    second.router_type = RouterType::Rain101;
    second.router_ip = "10.0.0.1".to_string();

    let summary = reconcile(
        &db,
        "acct-1",
        &[observed("192.168.1.10", "AA:BB:CC:DD:EE:01"), second],
    )
    .expect("reconcile");
    assert_eq!(summary.new_count, 1);

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let devices = queries::list_devices(&conn, "acct-1").expect("list");
    assert_eq!(devices.len(), 1);
    // First observation wins
    assert_eq!(devices[0].ip, "192.168.1.10");
}

#[test]
fn accounts_are_isolated() {
    let db = Database::in_memory().expect("db");
    reconcile(&db, "acct-1", &[observed("192.168.1.10", "AA:BB:CC:DD:EE:01")]).expect("acct-1");
    reconcile(&db, "acct-2", &[observed("192.168.1.10", "AA:BB:CC:DD:EE:02")]).expect("acct-2");

    let conn = db.connection();
    let conn = conn.lock().unwrap();
    let first = queries::list_devices(&conn, "acct-1").expect("list");
    let second = queries::list_devices(&conn, "acct-2").expect("list");
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first[0].mac, second[0].mac);
}
