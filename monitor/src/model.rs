use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::classify::CriticalEvent;
use crate::validate::{BatteryReading, ChargingIndicator};

/// Connectivity status of a tablet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tablet_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TabletStatus {
    Online,
    Offline,
}

/// Last-known state of one monitored tablet
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tablet {
    pub device_id: String,
    pub device_name: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub battery_level: i32,
    pub is_charging: bool,
    pub previous_battery_level: Option<i32>,
    pub previous_is_charging: Option<bool>,
    pub last_battery_alert_level: i32,
    /// Managed by the external alerting workflow, never written here.
    pub alert_sent: bool,
    pub alert_type: Option<String>,
    pub alert_timestamp: Option<DateTime<Utc>>,
    pub status: TabletStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tablet {
    /// A freshly registered tablet, before any heartbeat.
    pub fn registered(device_id: String, device_name: String, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            device_name,
            last_seen: None,
            battery_level: 100,
            is_charging: false,
            previous_battery_level: None,
            previous_is_charging: None,
            last_battery_alert_level: 100,
            alert_sent: false,
            alert_type: None,
            alert_timestamp: None,
            status: TabletStatus::Offline,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn prior_state(&self) -> PriorState {
        PriorState {
            device_name: self.device_name.clone(),
            battery_level: self.battery_level,
            is_charging: self.is_charging,
            last_battery_alert_level: self.last_battery_alert_level,
            alert_sent: self.alert_sent,
        }
    }
}

/// Stored state read just before a heartbeat overwrites it
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PriorState {
    pub device_name: String,
    pub battery_level: i32,
    pub is_charging: bool,
    pub last_battery_alert_level: i32,
    pub alert_sent: bool,
}

/// Normalized heartbeat, ready to be written
#[derive(Debug, Clone)]
pub struct HeartbeatUpdate {
    pub device_id: String,
    pub battery_level: i32,
    pub is_charging: bool,
    pub seen_at: DateTime<Utc>,
}

/// Result of applying a heartbeat to an existing tablet
#[derive(Debug, Clone)]
pub struct HeartbeatApplied {
    pub prior: PriorState,
    pub changes: u64,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub device_id: String,
    pub alert_type: String,
    pub message: Option<String>,
    pub battery_level: Option<i32>,
}

/// Alert history row joined with the tablet name
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub device_id: String,
    pub alert_type: String,
    pub message: Option<String>,
    pub battery_level: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub device_id: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub device_id: Option<String>,
    pub battery_level: Option<BatteryReading>,
    pub is_charging: Option<ChargingIndicator>,
}

#[derive(Debug, Deserialize)]
pub struct AlertRequest {
    pub device_id: Option<String>,
    pub alert_type: Option<String>,
    pub message: Option<String>,
    pub battery_level: Option<BatteryReading>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterTabletRequest {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<i64>,
    pub device_id: Option<String>,
}

/// `?limit=` arrives as an empty string and means the same as no limit.
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)?.as_deref() {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
    pub changes: u64,
    pub device_id: String,
    pub critical_event: Option<CriticalEvent>,
    pub webhook_triggered: bool,
}

#[derive(Debug, Serialize)]
pub struct AlertLoggedResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterTabletResponse {
    pub success: bool,
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
}
