//! Device registry storage
//!
//! SQLite-backed persistence for devices, their event history, security
//! alerts, and per-account router credentials.

pub mod encryption;
pub mod models;
pub mod queries;
pub mod schema;

pub use models::{
    AlertRecord, AlertSeverity, AlertType, DeviceRecord, HistoryEventKind, HistoryRecord,
};
pub use queries::{AlertInsert, DeviceInsert};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Database wrapper with thread-safe connection
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the registry database at `path`
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };
        db.initialize()?;
        Ok(db)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned during initialization"))?;
        schema::create_tables(&conn)
    }

    /// Get a reference to the connection
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Default registry path under the platform data directory
    pub fn default_path() -> PathBuf {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("NetGuard").join("registry.db")
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            path: self.path.clone(),
        }
    }
}
