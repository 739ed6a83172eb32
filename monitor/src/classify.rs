use serde::Serialize;
use std::fmt;

use crate::model::{HeartbeatUpdate, PriorState};

/// Battery percentage below which an unplugged tablet is critical.
pub const CRITICAL_BATTERY_THRESHOLD: i32 = 5;

/// Urgent condition derived from the previous and the new tablet state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalEvent {
    PowerLost,
    CriticalBattery,
}

impl CriticalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalEvent::PowerLost => "power_lost",
            CriticalEvent::CriticalBattery => "critical_battery",
        }
    }
}

impl fmt::Display for CriticalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a heartbeat against the state stored before it.
///
/// Power loss takes precedence: a tablet that was charging and no longer is
/// reports `PowerLost` whatever its battery level. Otherwise an unplugged
/// tablet under the threshold reports `CriticalBattery`, unless the last
/// low-battery alert was already issued at or below the threshold.
pub fn classify(prior: &PriorState, update: &HeartbeatUpdate) -> Option<CriticalEvent> {
    if prior.is_charging && !update.is_charging {
        Some(CriticalEvent::PowerLost)
    } else if update.battery_level < CRITICAL_BATTERY_THRESHOLD
        && !update.is_charging
        && prior.last_battery_alert_level > CRITICAL_BATTERY_THRESHOLD
    {
        Some(CriticalEvent::CriticalBattery)
    } else {
        None
    }
}

/// Whether a classified event should be pushed to the webhook.
///
/// `alert_sent` is owned by the external alerting workflow; this service
/// only reads it.
pub fn should_notify(prior: &PriorState, event: Option<CriticalEvent>) -> bool {
    event.is_some() && !prior.alert_sent
}
