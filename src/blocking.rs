//! Manual device blocking
//!
//! Applies a block or unblock on the router first, then records the outcome
//! in the registry. The registry is only updated after a router acknowledges
//! the action, so the stored flag never runs ahead of the network.

use anyhow::{anyhow, Context, Result};

use crate::notify::{Notification, Notifier};
use crate::registry::{queries, AlertInsert, Database, DeviceRecord, HistoryEventKind};
use crate::router::RouterManager;

pub async fn block_device(
    db: &Database,
    manager: &RouterManager,
    notifier: &dyn Notifier,
    account_id: &str,
    mac: &str,
) -> Result<DeviceRecord> {
    apply(db, manager, notifier, account_id, mac, true).await
}

pub async fn unblock_device(
    db: &Database,
    manager: &RouterManager,
    notifier: &dyn Notifier,
    account_id: &str,
    mac: &str,
) -> Result<DeviceRecord> {
    apply(db, manager, notifier, account_id, mac, false).await
}

async fn apply(
    db: &Database,
    manager: &RouterManager,
    notifier: &dyn Notifier,
    account_id: &str,
    mac: &str,
    blocked: bool,
) -> Result<DeviceRecord> {
    let mac = mac.to_uppercase();
    let device = {
        let conn = db.connection();
        let conn = conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;
        queries::get_device_by_mac(&conn, account_id, &mac)?
            .ok_or_else(|| anyhow!("No known device with MAC {}", mac))?
    };

    if device.is_blocked == blocked {
        tracing::info!(
            "Device {} is already {}",
            mac,
            if blocked { "blocked" } else { "unblocked" }
        );
        return Ok(device);
    }

    let acknowledged = if blocked {
        manager.block_device(&mac).await
    } else {
        manager.unblock_device(&mac).await
    };
    if !acknowledged {
        return Err(anyhow!(
            "No router acknowledged the {} request for {}",
            if blocked { "block" } else { "unblock" },
            mac
        ));
    }

    let updated = {
        let conn = db.connection();
        let conn = conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;
        queries::set_blocked(&conn, device.id, blocked)?;
        let (kind, details) = if blocked {
            (HistoryEventKind::Blocked, "Blocked manually")
        } else {
            (HistoryEventKind::Unblocked, "Unblocked manually")
        };
        queries::append_history(&conn, device.id, kind, Some(details))?;

        if blocked {
            let notification =
                Notification::device_blocked(&mac, &device.display_name(), false);
            let dedupe_key = format!("{}/{}", mac, notification.alert_type.as_str());
            queries::insert_alert(
                &conn,
                &AlertInsert {
                    account_id,
                    device_id: Some(device.id),
                    alert_type: notification.alert_type,
                    severity: notification.severity,
                    title: &notification.title,
                    message: &notification.body,
                    dedupe_key: Some(&dedupe_key),
                },
            )?;
        }

        queries::get_device_by_id(&conn, device.id)?
            .context("Device disappeared while updating blocked flag")?
    };

    if blocked {
        notifier
            .notify(&Notification::device_blocked(
                &mac,
                &updated.display_name(),
                false,
            ))
            .await;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::CapturingNotifier;
    use crate::registry::queries::DeviceInsert;
    use crate::risk::RiskLevel;
    use crate::router::RouterType;

    fn seed_device(db: &Database, mac: &str) -> i64 {
        let conn = db.connection();
        let conn = conn.lock().unwrap();
        queries::create_device(
            &conn,
            &DeviceInsert {
                account_id: "acct-1",
                ip: "192.168.1.50",
                mac,
                hostname: Some("laptop"),
                device_type: Some("computer"),
                vendor: Some("Dell"),
                is_online: true,
                risk_score: 10,
                risk_level: RiskLevel::Low,
                router_type: Some(RouterType::Huawei),
                router_ip: Some("192.168.1.1"),
                signal: None,
                bandwidth: None,
            },
            HistoryEventKind::Connected,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn block_unknown_mac_errors() {
        let db = Database::in_memory().unwrap();
        let manager = RouterManager::new(Vec::new());
        let notifier = CapturingNotifier::default();
        let err = block_device(&db, &manager, &notifier, "acct-1", "AA:BB:CC:DD:EE:FF")
            .await
            .expect_err("unknown device should be rejected");
        assert!(err.to_string().contains("No known device"));
    }

    #[tokio::test]
    async fn block_without_router_ack_leaves_registry_untouched() {
        let db = Database::in_memory().unwrap();
        let device_id = seed_device(&db, "AA:BB:CC:DD:EE:FF");
        // No routers configured, so the action can never be acknowledged
        let manager = RouterManager::new(Vec::new());
        let notifier = CapturingNotifier::default();

        let err = block_device(&db, &manager, &notifier, "acct-1", "aa:bb:cc:dd:ee:ff")
            .await
            .expect_err("unacknowledged block should fail");
        assert!(err.to_string().contains("No router acknowledged"));

        let conn = db.connection();
        let conn = conn.lock().unwrap();
        let device = queries::get_device_by_id(&conn, device_id).unwrap().unwrap();
        assert!(!device.is_blocked);
        assert!(notifier.captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unblock_of_already_unblocked_device_is_a_noop() {
        let db = Database::in_memory().unwrap();
        seed_device(&db, "AA:BB:CC:DD:EE:FF");
        let manager = RouterManager::new(Vec::new());
        let notifier = CapturingNotifier::default();

        let device = unblock_device(&db, &manager, &notifier, "acct-1", "AA:BB:CC:DD:EE:FF")
            .await
            .expect("noop unblock should succeed");
        assert!(!device.is_blocked);
    }
}
