//! Registry schema
//!
//! Creates and migrates the SQLite tables

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all registry tables
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Devices table: unique devices by MAC address, scoped per account
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            mac TEXT UNIQUE NOT NULL,
            ip TEXT NOT NULL,
            hostname TEXT,
            custom_name TEXT,
            device_type TEXT,
            vendor TEXT,
            is_online INTEGER NOT NULL DEFAULT 1,
            is_blocked INTEGER NOT NULL DEFAULT 0,
            risk_score INTEGER NOT NULL DEFAULT 0,
            risk_level TEXT NOT NULL DEFAULT 'low',
            router_type TEXT,
            router_ip TEXT,
            signal INTEGER,
            bandwidth INTEGER,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        );

        -- Device history: append-only lifecycle events
        CREATE TABLE IF NOT EXISTS device_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL,
            event_kind TEXT NOT NULL,
            details TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE CASCADE
        );

        -- Security alerts raised by scan cycles
        CREATE TABLE IF NOT EXISTS security_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            device_id INTEGER,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL DEFAULT 'low',
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            dedupe_key TEXT,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE SET NULL
        );

        -- Router credentials, one row per managed router per account
        CREATE TABLE IF NOT EXISTS router_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            router_type TEXT NOT NULL,
            ip TEXT NOT NULL,
            username_enc TEXT NOT NULL,
            password_enc TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(account_id, ip)
        );

        -- Indexes for performance
        CREATE INDEX IF NOT EXISTS idx_devices_account ON devices(account_id);
        CREATE INDEX IF NOT EXISTS idx_devices_mac ON devices(mac);
        CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON devices(last_seen);
        CREATE INDEX IF NOT EXISTS idx_history_device ON device_history(device_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_account ON security_alerts(account_id);
        CREATE INDEX IF NOT EXISTS idx_alerts_unresolved ON security_alerts(resolved) WHERE resolved = 0;
        "#,
    )
    .context("Failed to create registry tables")?;

    // Databases created before mobile-router support lack the signal and
    // bandwidth columns.
    if !column_exists(conn, "devices", "signal")? {
        conn.execute_batch(
            "ALTER TABLE devices ADD COLUMN signal INTEGER;
             ALTER TABLE devices ADD COLUMN bandwidth INTEGER;",
        )
        .context("Failed to migrate devices table")?;
        tracing::info!("Migrated devices table: added signal and bandwidth columns");
    }

    // Alerts created before resolution tracking only carry the flag.
    if !column_exists(conn, "security_alerts", "resolved_at")? {
        conn.execute_batch("ALTER TABLE security_alerts ADD COLUMN resolved_at TEXT;")
            .context("Failed to migrate security_alerts table")?;
        tracing::info!("Migrated security_alerts table: added resolved_at column");
    }

    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .context("Failed to inspect table schema")?;
    let mut rows = stmt.query([]).context("Failed to query table schema")?;
    while let Some(row) = rows.next().context("Failed to read schema row")? {
        let name: String = row.get(1).context("Failed to read column name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().expect("connection");
        create_tables(&conn).expect("first create");
        create_tables(&conn).expect("second create");
    }

    #[test]
    fn column_check_sees_existing_columns() {
        let conn = Connection::open_in_memory().expect("connection");
        create_tables(&conn).expect("create");
        assert!(column_exists(&conn, "devices", "mac").expect("check"));
        assert!(!column_exists(&conn, "devices", "no_such_column").expect("check"));
    }
}
