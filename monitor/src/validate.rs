use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::model::{
    AlertRequest, HeartbeatRequest, HeartbeatUpdate, NewAlert, RegisterTabletRequest,
};

/// Battery level assumed when a heartbeat omits it.
pub const DEFAULT_BATTERY_LEVEL: i32 = 100;

/// Charging state as sent by the automation agent.
///
/// Agents report it as a JSON bool, as `0`/`1`, or as strings like
/// `"On"`/`"Off"`. Anything that is not recognized counts as not charging.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChargingIndicator {
    Flag(bool),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl ChargingIndicator {
    pub fn is_charging(&self) -> bool {
        match self {
            ChargingIndicator::Flag(flag) => *flag,
            ChargingIndicator::Number(n) => *n == 1.0,
            ChargingIndicator::Text(text) => {
                text.eq_ignore_ascii_case("on") || text.eq_ignore_ascii_case("true") || text == "1"
            }
            ChargingIndicator::Other(_) => false,
        }
    }
}

/// Battery level as sent by the automation agent: a JSON number or a
/// numeric string. Fractional values are rounded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BatteryReading {
    Number(f64),
    Text(String),
}

impl BatteryReading {
    pub fn level(&self) -> Option<i32> {
        let value = match self {
            BatteryReading::Number(n) => *n,
            BatteryReading::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then(|| value.round() as i32)
    }
}

/// Normalizes an optional battery reading. Absent, null and `""` all mean
/// no reading; anything else that is not numeric is rejected.
pub fn parse_battery(reading: Option<BatteryReading>) -> Result<Option<i32>> {
    match reading {
        None => Ok(None),
        Some(BatteryReading::Text(text)) if text.is_empty() => Ok(None),
        Some(reading) => reading
            .level()
            .map(Some)
            .ok_or_else(|| Error::Validation("battery_level must be a number".to_string())),
    }
}

/// Normalizes an optional charging indicator, absent meaning not charging
pub fn parse_charging(indicator: Option<&ChargingIndicator>) -> bool {
    indicator.is_some_and(ChargingIndicator::is_charging)
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Validates a heartbeat body and applies the defaults
pub fn validate_heartbeat(
    request: HeartbeatRequest,
    seen_at: DateTime<Utc>,
) -> Result<HeartbeatUpdate> {
    let device_id = present(request.device_id)
        .ok_or_else(|| Error::Validation("device_id is required".to_string()))?;

    Ok(HeartbeatUpdate {
        device_id,
        battery_level: parse_battery(request.battery_level)?.unwrap_or(DEFAULT_BATTERY_LEVEL),
        is_charging: parse_charging(request.is_charging.as_ref()),
        seen_at,
    })
}

/// Validates an alert log body
pub fn validate_alert(request: AlertRequest) -> Result<NewAlert> {
    match (present(request.device_id), present(request.alert_type)) {
        (Some(device_id), Some(alert_type)) => Ok(NewAlert {
            device_id,
            alert_type,
            message: present(request.message),
            battery_level: parse_battery(request.battery_level)?,
        }),
        _ => Err(Error::Validation(
            "device_id and alert_type are required".to_string(),
        )),
    }
}

/// Validates a registration body, returning `(device_id, device_name)`
pub fn validate_registration(request: RegisterTabletRequest) -> Result<(String, String)> {
    match (present(request.device_id), present(request.device_name)) {
        (Some(device_id), Some(device_name)) => Ok((device_id, device_name)),
        _ => Err(Error::Validation(
            "device_id and device_name are required".to_string(),
        )),
    }
}
