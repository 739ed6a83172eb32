use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::classify::CriticalEvent;
use crate::errors::Result;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref HEARTBEATS_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "monitor_heartbeats_total",
        "Total heartbeats applied to registered tablets"
    ))
    .expect("valid heartbeat counter");
    pub static ref UNKNOWN_DEVICE_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "monitor_unknown_device_total",
        "Total heartbeats rejected for unregistered tablets"
    ))
    .expect("valid unknown device counter");
    pub static ref CRITICAL_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "monitor_critical_events_total",
            "Total critical events detected, by event"
        ),
        &["event"]
    )
    .expect("valid critical event counter");
    pub static ref WEBHOOK_FAILURES_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "monitor_webhook_failures_total",
        "Total webhook notifications that could not be delivered"
    ))
    .expect("valid webhook failure counter");
    pub static ref ALERTS_LOGGED_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "monitor_alerts_logged_total",
        "Total alert history entries written"
    ))
    .expect("valid alert counter");
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(HEARTBEATS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNKNOWN_DEVICE_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CRITICAL_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WEBHOOK_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_LOGGED_TOTAL.clone()))?;
    Ok(())
}

pub fn record_critical_event(event: CriticalEvent) {
    CRITICAL_EVENTS_TOTAL
        .with_label_values(&[event.as_str()])
        .inc();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
