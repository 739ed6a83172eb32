//! Heartbeat and alert service for a fleet of wall-mounted tablets.
//!
//! Tablets report battery and charging state through `POST /api/heartbeat`.
//! Each heartbeat is compared with the stored state to detect power loss and
//! critically low battery, and those events are pushed to an alerting webhook.

pub mod classify;
pub mod config;
pub mod db;
pub mod errors;
pub mod extract;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod rest;
pub mod store;
pub mod validate;
