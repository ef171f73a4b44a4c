use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use crate::errors::{SinkError, SinkResult};
use crate::models::device::{DeviceSummary, DeviceUpdate, UnitState, WriteOutcome};

/// Where corrected forecast values end up. Writes only go through when the
/// value differs from the stored one or the update is forced; a unit that
/// does not exist is an error, never created implicitly.
pub trait DeviceSink {
    /// Current `(n_value, s_value)` of a unit.
    fn current(&self, device: &str, unit: u8) -> SinkResult<(i32, String)>;

    fn update(&self, update: &DeviceUpdate) -> SinkResult<WriteOutcome>;

    /// Creates a unit if it is missing. Returns true when it was created.
    fn ensure_unit(&self, device: &str, unit: u8, name: &str) -> SinkResult<bool>;
}

/// A write that went through, forwarded to the MQTT mirror.
#[derive(Debug, Clone)]
pub struct MirroredWrite {
    pub device: String,
    pub unit: u8,
    pub n_value: i32,
    pub s_value: String,
    pub timestamp: DateTime<Utc>,
}

/// In-process device store standing in for the host's device database.
#[derive(Clone, Debug, Default)]
pub struct DeviceStore {
    devices: Arc<RwLock<BTreeMap<String, BTreeMap<u8, UnitState>>>>,
    mirror: Option<UnboundedSender<MirroredWrite>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mirror(mut self, tx: UnboundedSender<MirroredWrite>) -> Self {
        self.mirror = Some(tx);
        self
    }

    pub fn get_unit(&self, device: &str, unit: u8) -> SinkResult<UnitState> {
        let map = self.devices.read().map_err(|_| SinkError::Poisoned)?;
        map.get(device)
            .and_then(|units| units.get(&unit))
            .cloned()
            .ok_or_else(|| SinkError::UnitNotFound { device: device.to_string(), unit })
    }

    pub fn get_all(&self) -> SinkResult<Vec<DeviceSummary>> {
        let map = self.devices.read().map_err(|_| SinkError::Poisoned)?;
        Ok(map
            .iter()
            .map(|(id, units)| DeviceSummary { device_id: id.clone(), units: units.clone() })
            .collect())
    }
}

/// History key of a value string: its trailing timestamp field.
fn history_key(s_value: &str) -> &str {
    s_value.rsplit(';').next().unwrap_or(s_value)
}

impl DeviceSink for DeviceStore {
    fn ensure_unit(&self, device: &str, unit: u8, name: &str) -> SinkResult<bool> {
        let mut map = self.devices.write().map_err(|_| SinkError::Poisoned)?;
        let units = map.entry(device.to_string()).or_default();
        if units.contains_key(&unit) {
            return Ok(false);
        }
        units.insert(unit, UnitState::new(name));
        debug!("[STORE] created unit {} '{}' on device '{}'", unit, name, device);
        Ok(true)
    }

    fn current(&self, device: &str, unit: u8) -> SinkResult<(i32, String)> {
        self.get_unit(device, unit).map(|u| (u.n_value, u.s_value))
    }

    fn update(&self, update: &DeviceUpdate) -> SinkResult<WriteOutcome> {
        let mut map = self.devices.write().map_err(|_| SinkError::Poisoned)?;
        let Some(state) = map.get_mut(&update.device).and_then(|units| units.get_mut(&update.unit)) else {
            error!(
                "[STORE] trying to update non-existent unit {} of device '{}'",
                update.unit, update.device
            );
            return Err(SinkError::UnitNotFound { device: update.device.clone(), unit: update.unit });
        };

        if state.n_value == update.n_value && state.s_value == update.s_value && !update.always_update {
            return Ok(WriteOutcome::Unchanged);
        }

        debug!(
            "[STORE] updating '{}' from '{}' to '{}'",
            state.name, state.s_value, update.s_value
        );
        let now = Utc::now();
        state.n_value = update.n_value;
        state.s_value = update.s_value.clone();
        state.last_update = Some(now);
        state
            .history
            .insert(history_key(&update.s_value).to_string(), update.s_value.clone());
        if let Some(name) = &update.name {
            state.name = name.clone();
        }

        if let Some(tx) = &self.mirror {
            let write = MirroredWrite {
                device: update.device.clone(),
                unit: update.unit,
                n_value: update.n_value,
                s_value: update.s_value.clone(),
                timestamp: now,
            };
            if tx.send(write).is_err() {
                warn!("[STORE] mirror channel closed");
            }
        }
        Ok(WriteOutcome::Written)
    }
}
