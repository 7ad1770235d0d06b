//! Periodic scan scheduling
//!
//! One scheduler per account drives the scan cycle: router fan-out (subnet
//! sweep when every router fails), reconciliation, then per-device risk and
//! threat processing. Cycles are single-flight and every failure lands in
//! the state snapshot instead of killing the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ANOMALY_HISTORY_LIMIT, MAX_SCAN_INTERVAL, MIN_SCAN_INTERVAL};
use crate::models::UnifiedDevice;
use crate::notify::{Notification, Notifier};
use crate::probe::sweep_subnet;
use crate::reconcile::{reconcile, ReconcileSummary};
use crate::registry::{
    queries, AlertInsert, Database, DeviceRecord, HistoryEventKind, HistoryRecord,
};
use crate::risk::{self, RiskLevel};
use crate::router::RouterManager;
use crate::threat::{self, ClassifierSettings, DeviceDigest};

/// Read-only snapshot of scheduler progress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanState {
    pub is_scanning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scan_time: Option<DateTime<Utc>>,
    pub devices_found: usize,
    pub new_devices: usize,
    pub offline_devices: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ScanScheduler {
    account_id: String,
    db: Database,
    manager: Arc<RouterManager>,
    notifier: Arc<dyn Notifier>,
    classifier: ClassifierSettings,
    interval: Duration,
    is_running: Arc<AtomicBool>,
    is_scanning: Arc<AtomicBool>,
    state: Arc<Mutex<ScanState>>,
}

impl ScanScheduler {
    pub fn new(
        account_id: &str,
        db: Database,
        manager: Arc<RouterManager>,
        notifier: Arc<dyn Notifier>,
        interval_secs: u64,
    ) -> Self {
        let interval_secs = interval_secs.clamp(MIN_SCAN_INTERVAL, MAX_SCAN_INTERVAL);
        Self {
            account_id: account_id.to_string(),
            db,
            manager,
            notifier,
            classifier: ClassifierSettings::from_env(),
            interval: Duration::from_secs(interval_secs),
            is_running: Arc::new(AtomicBool::new(false)),
            is_scanning: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ScanState::default())),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval.as_secs()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Current snapshot. Lock poisoning degrades to a default snapshot
    /// rather than panicking a caller.
    pub fn state(&self) -> ScanState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Start the interval loop. Idempotent: a second start is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Scheduler for {} already running", self.account_id);
            return;
        }
        tracing::info!(
            "Starting scan scheduler for {} (every {}s)",
            self.account_id,
            self.interval.as_secs()
        );

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            while scheduler.is_running.load(Ordering::SeqCst) {
                scheduler.run_cycle().await;

                // Sleep in 1s steps so stop() takes effect quickly
                let mut remaining = scheduler.interval;
                while !remaining.is_zero() && scheduler.is_running.load(Ordering::SeqCst) {
                    let step = remaining.min(Duration::from_secs(1));
                    tokio::time::sleep(step).await;
                    remaining = remaining.saturating_sub(step);
                }
            }
            tracing::info!("Scan scheduler for {} stopped", scheduler.account_id);
        });
    }

    /// Stop the loop. An in-flight cycle is allowed to finish.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    /// Run one cycle immediately. A no-op while a cycle is in flight.
    pub async fn force_scan(&self) {
        self.run_cycle().await;
    }

    async fn run_cycle(&self) {
        if self.is_scanning.swap(true, Ordering::SeqCst) {
            tracing::info!("Scan already in progress for {}, skipping", self.account_id);
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.is_scanning = true;
        }

        let outcome = self.scan_once().await;

        if let Ok(mut state) = self.state.lock() {
            state.is_scanning = false;
            let now = Utc::now();
            state.last_scan_time = Some(now);
            state.next_scan_time = Some(now + chrono::Duration::seconds(self.interval.as_secs() as i64));
            match outcome {
                Ok((observed, summary)) => {
                    state.devices_found = observed;
                    state.new_devices = summary.new_count;
                    state.offline_devices = summary.went_offline_count;
                    state.error = None;
                }
                Err(e) => {
                    tracing::warn!("Scan cycle for {} failed: {}", self.account_id, e);
                    state.error = Some(e.to_string());
                }
            }
        }
        self.is_scanning.store(false, Ordering::SeqCst);
    }

    async fn scan_once(&self) -> anyhow::Result<(usize, ReconcileSummary)> {
        let observed = self.discover().await?;

        let known_macs = self.known_macs()?;
        let summary = reconcile(&self.db, &self.account_id, &observed)?;

        let observed_macs: HashSet<String> =
            observed.iter().map(|d| d.mac.to_uppercase()).collect();
        let new_macs: HashSet<String> = observed_macs
            .iter()
            .filter(|mac| !known_macs.contains(*mac))
            .cloned()
            .collect();

        self.process_devices(&observed_macs, &new_macs).await?;

        Ok((observed.len(), summary))
    }

    async fn discover(&self) -> anyhow::Result<Vec<UnifiedDevice>> {
        if !self.manager.has_routers() {
            anyhow::bail!("No routers configured for account {}", self.account_id);
        }

        let results = self.manager.scan_all().await;
        let mut devices = Vec::new();
        let mut any_success = false;
        let mut last_error = None;
        for result in results {
            if result.success {
                any_success = true;
                devices.extend(result.devices);
            } else {
                last_error = result.error;
            }
        }
        if any_success {
            return Ok(devices);
        }

        // Every router refused; fall back to sweeping the first router's /24
        tracing::warn!(
            "All router scans failed for {} ({}), falling back to subnet sweep",
            self.account_id,
            last_error.as_deref().unwrap_or("unknown error")
        );
        let config = &self.manager.configs()[0];
        let hosts = sweep_subnet(&config.ip).await?;
        Ok(hosts
            .into_iter()
            .map(|host| UnifiedDevice {
                ip: host.ip,
                mac: host.mac,
                hostname: None,
                device_type: None,
                vendor: None,
                is_online: true,
                last_seen: host.discovered_at,
                router_type: config.router_type,
                router_ip: config.ip.clone(),
                signal: None,
                bandwidth: None,
            })
            .collect())
    }

    fn known_macs(&self) -> anyhow::Result<HashSet<String>> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
        Ok(queries::list_devices(&conn, &self.account_id)?
            .into_iter()
            .map(|d| d.mac)
            .collect())
    }

    /// Risk, anomaly, and threat processing for every device seen this cycle.
    async fn process_devices(
        &self,
        observed_macs: &HashSet<String>,
        new_macs: &HashSet<String>,
    ) -> anyhow::Result<()> {
        let staged = self.stage_device_data(observed_macs)?;

        for (record, history, (connected, disconnected)) in staged {
            if new_macs.contains(&record.mac) {
                self.raise_alert(
                    &record,
                    Notification::new_device(&record.mac, &record.display_name(), &record.ip),
                )
                .await?;
            }

            let digest = DeviceDigest {
                ip: record.ip.clone(),
                mac: record.mac.clone(),
                vendor: record.vendor.clone(),
                device_type: record.device_type.clone(),
                risk_score: record.risk_score,
                is_online: record.is_online,
            };
            let assessment = threat::assess(&self.classifier, &digest, &history).await;

            let score = assessment.risk_score;
            if score != record.risk_score {
                self.record_risk_change(&record, score)?;
            }

            let anomaly =
                risk::detect_anomaly(record.device_type.as_deref(), score, connected, disconnected);
            if anomaly.is_anomaly {
                self.raise_alert(
                    &record,
                    Notification::anomaly(&record.mac, &record.display_name(), &anomaly.reason),
                )
                .await?;
            }

            let level = RiskLevel::from_score(score);
            if level >= RiskLevel::High {
                self.raise_alert(
                    &record,
                    Notification::high_risk(&record.mac, &record.display_name(), score, level.as_str()),
                )
                .await?;
            }

            if assessment.should_block && !record.is_blocked {
                self.auto_block(&record, &assessment.summary).await?;
            }
        }
        Ok(())
    }

    /// Collect everything the async processing needs while the connection
    /// lock is held, then release it before any await point.
    #[allow(clippy::type_complexity)]
    fn stage_device_data(
        &self,
        observed_macs: &HashSet<String>,
    ) -> anyhow::Result<Vec<(DeviceRecord, Vec<HistoryRecord>, (i64, i64))>> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;

        let mut staged = Vec::new();
        for record in queries::list_devices(&conn, &self.account_id)? {
            if !observed_macs.contains(&record.mac) {
                continue;
            }
            let history = queries::list_history(&conn, record.id, ANOMALY_HISTORY_LIMIT)?;
            let churn = queries::history_churn_counts(&conn, record.id, ANOMALY_HISTORY_LIMIT)?;
            staged.push((record, history, churn));
        }
        Ok(staged)
    }

    fn record_risk_change(&self, record: &DeviceRecord, score: u8) -> anyhow::Result<()> {
        let conn = self.db.connection();
        let conn = conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
        let level = RiskLevel::from_score(score);
        queries::update_risk(&conn, record.id, score, level)?;
        let details = format!("Risk score {} -> {}", record.risk_score, score);
        queries::append_history(&conn, record.id, HistoryEventKind::RiskUpdated, Some(&details))?;
        Ok(())
    }

    /// Persist an alert and deliver the notification. The dedupe key
    /// suppresses repeats while an identical alert is still unresolved.
    async fn raise_alert(
        &self,
        record: &DeviceRecord,
        notification: Notification,
    ) -> anyhow::Result<()> {
        let inserted = {
            let conn = self.db.connection();
            let conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
            let dedupe_key = format!("{}/{}", record.mac, notification.alert_type.as_str());
            queries::insert_alert(
                &conn,
                &AlertInsert {
                    account_id: &self.account_id,
                    device_id: Some(record.id),
                    alert_type: notification.alert_type,
                    severity: notification.severity,
                    title: &notification.title,
                    message: &notification.body,
                    dedupe_key: Some(&dedupe_key),
                },
            )?
        };
        if inserted.is_some() {
            self.notifier.notify(&notification).await;
        }
        Ok(())
    }

    async fn auto_block(&self, record: &DeviceRecord, summary: &str) -> anyhow::Result<()> {
        tracing::warn!(
            "Threat classifier recommends blocking {}: {}",
            record.mac,
            summary
        );
        if !self.manager.block_device(&record.mac).await {
            tracing::warn!("Auto-block of {} was not acknowledged by any router", record.mac);
            return Ok(());
        }

        {
            let conn = self.db.connection();
            let conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))?;
            queries::set_blocked(&conn, record.id, true)?;
            queries::append_history(
                &conn,
                record.id,
                HistoryEventKind::Blocked,
                Some("Blocked automatically after threat analysis"),
            )?;
        }
        self.raise_alert(
            record,
            Notification::device_blocked(&record.mac, &record.display_name(), true),
        )
        .await
    }
}

/// Live schedulers, one per account
pub struct SchedulerRegistry {
    schedulers: Mutex<HashMap<String, Arc<ScanScheduler>>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self {
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    /// Register and start a scheduler. Replaces (and stops) any scheduler
    /// already running for the account.
    pub fn start(&self, scheduler: Arc<ScanScheduler>) {
        let account_id = scheduler.account_id().to_string();
        let previous = {
            let mut schedulers = match self.schedulers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            schedulers.insert(account_id.clone(), Arc::clone(&scheduler))
        };
        if let Some(previous) = previous {
            tracing::info!("Replacing running scheduler for {}", account_id);
            previous.stop();
        }
        scheduler.start();
    }

    pub fn get(&self, account_id: &str) -> Option<Arc<ScanScheduler>> {
        let schedulers = match self.schedulers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        schedulers.get(account_id).cloned()
    }

    /// Stop and remove the account's scheduler. True when one existed.
    pub fn stop(&self, account_id: &str) -> bool {
        let removed = {
            let mut schedulers = match self.schedulers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            schedulers.remove(account_id)
        };
        match removed {
            Some(scheduler) => {
                scheduler.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<_> = {
            let mut schedulers = match self.schedulers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            schedulers.drain().collect()
        };
        for (account_id, scheduler) in drained {
            tracing::info!("Stopping scheduler for {}", account_id);
            scheduler.stop();
        }
    }
}

impl Default for SchedulerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
