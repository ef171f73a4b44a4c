use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Current state of one unit in the host device store.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnitState {
    pub name: String,
    /// Status code, 0 = normal
    pub n_value: i32,
    /// Last written value string
    pub s_value: String,
    pub last_update: Option<DateTime<Utc>>,
    /// Every value ever written, keyed by the timestamp field of the value
    /// string. A later write for the same slot replaces the earlier one.
    pub history: BTreeMap<String, String>,
}

impl UnitState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            n_value: 0,
            s_value: String::new(),
            last_update: None,
            history: BTreeMap::new(),
        }
    }
}

/// A single write request handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub device: String,
    pub unit: u8,
    pub n_value: i32,
    pub s_value: String,
    pub always_update: bool,
    pub name: Option<String>,
}

impl DeviceUpdate {
    pub fn new(device: impl Into<String>, unit: u8, n_value: i32, s_value: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            unit,
            n_value,
            s_value: s_value.into(),
            always_update: false,
            name: None,
        }
    }
}

/// Outcome of a sink write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

// ─── REST API response types ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceSummary {
    pub device_id: String,
    pub units: BTreeMap<u8, UnitState>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdapterStatus {
    pub location: crate::models::forecast::Location,
    pub panel: crate::models::forecast::PanelConfig,
    pub debug_mode: bool,
    /// True when the adapter runs without an API token
    pub degraded: bool,
    pub polled_today: bool,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_written: usize,
    pub last_skipped: usize,
    pub last_error: Option<String>,
}
