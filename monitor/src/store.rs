//! Storage seam between the HTTP handlers and the database.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::model::{
    AlertFilter, AlertRecord, HeartbeatApplied, HeartbeatUpdate, NewAlert, Tablet, TabletStatus,
};

#[async_trait]
pub trait TabletStore: Send + Sync {
    /// Applies a heartbeat to an existing tablet.
    ///
    /// Reads the current state, demotes it to the `previous_*` columns and
    /// writes the new values, marking the tablet online. Returns `None`
    /// without writing anything when the tablet is not registered.
    async fn apply_heartbeat(&self, update: &HeartbeatUpdate) -> Result<Option<HeartbeatApplied>>;

    async fn log_alert(&self, alert: &NewAlert) -> Result<()>;

    /// All tablets, ordered by name.
    async fn list_tablets(&self) -> Result<Vec<Tablet>>;

    async fn get_tablet(&self, device_id: &str) -> Result<Option<Tablet>>;

    /// Alert history, newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>>;

    /// Registers an offline tablet. Fails with `Error::DuplicateDevice` if
    /// the id is taken.
    async fn register_tablet(&self, device_id: &str, device_name: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    tablets: HashMap<String, Tablet>,
    alerts: Vec<AlertRecord>,
    next_alert_id: i64,
}

/// In-process store, used by the test suite and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryTabletStore {
    state: Mutex<MemoryState>,
}

impl MemoryTabletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutates a stored tablet in place, the way an outside process editing
    /// the table would. Returns false if the tablet does not exist.
    pub fn edit_tablet(&self, device_id: &str, edit: impl FnOnce(&mut Tablet)) -> bool {
        let mut state = self.state.lock();
        match state.tablets.get_mut(device_id) {
            Some(tablet) => {
                edit(tablet);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TabletStore for MemoryTabletStore {
    async fn apply_heartbeat(&self, update: &HeartbeatUpdate) -> Result<Option<HeartbeatApplied>> {
        let mut state = self.state.lock();
        let Some(tablet) = state.tablets.get_mut(&update.device_id) else {
            return Ok(None);
        };

        let prior = tablet.prior_state();
        tablet.previous_is_charging = Some(tablet.is_charging);
        tablet.previous_battery_level = Some(tablet.battery_level);
        tablet.last_seen = Some(update.seen_at);
        tablet.battery_level = update.battery_level;
        tablet.is_charging = update.is_charging;
        tablet.status = TabletStatus::Online;
        tablet.updated_at = Utc::now();

        Ok(Some(HeartbeatApplied { prior, changes: 1 }))
    }

    async fn log_alert(&self, alert: &NewAlert) -> Result<()> {
        let mut state = self.state.lock();
        state.next_alert_id += 1;
        let record = AlertRecord {
            id: state.next_alert_id,
            device_id: alert.device_id.clone(),
            alert_type: alert.alert_type.clone(),
            message: alert.message.clone(),
            battery_level: alert.battery_level,
            created_at: Utc::now(),
            device_name: None,
        };
        state.alerts.push(record);
        Ok(())
    }

    async fn list_tablets(&self) -> Result<Vec<Tablet>> {
        let state = self.state.lock();
        let mut tablets: Vec<Tablet> = state.tablets.values().cloned().collect();
        tablets.sort_by(|a, b| {
            a.device_name
                .cmp(&b.device_name)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(tablets)
    }

    async fn get_tablet(&self, device_id: &str) -> Result<Option<Tablet>> {
        Ok(self.state.lock().tablets.get(device_id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>> {
        let state = self.state.lock();
        let mut alerts: Vec<AlertRecord> = state
            .alerts
            .iter()
            .filter(|a| filter.device_id.as_ref().map_or(true, |id| &a.device_id == id))
            .map(|a| AlertRecord {
                device_name: state.tablets.get(&a.device_id).map(|t| t.device_name.clone()),
                ..a.clone()
            })
            .collect();

        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        alerts.truncate(usize::try_from(filter.limit).unwrap_or(0));
        Ok(alerts)
    }

    async fn register_tablet(&self, device_id: &str, device_name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.tablets.contains_key(device_id) {
            return Err(Error::DuplicateDevice(device_id.to_string()));
        }
        state.tablets.insert(
            device_id.to_string(),
            Tablet::registered(device_id.to_string(), device_name.to_string(), Utc::now()),
        );
        Ok(())
    }
}
