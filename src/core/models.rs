use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CHARGING_STATUSES: [&str; 2] = ["charging", "dc_charging"];
const ENGINE_RUNNING: &str = "engine_running";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub remaining_percent: Option<f64>,
    pub range_km: Option<f64>,
    pub charging_status: Option<String>,
    /// Amperes; negative while discharging on some firmware.
    pub charging_current: Option<f64>,
    /// Kilowatts.
    pub charging_power: Option<f64>,
}

impl Battery {
    pub fn is_charging(&self) -> bool {
        self.charging_status
            .as_deref()
            .is_some_and(|status| CHARGING_STATUSES.contains(&status))
    }

    pub fn is_current_flowing(&self) -> bool {
        self.charging_current.is_some_and(|current| current != 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climate {
    pub pre_climate_active: bool,
    pub interior_temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vin: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub battery: Option<Battery>,
    #[serde(default)]
    pub engine_state: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub climate: Option<Climate>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn is_charging_current_flowing(&self) -> bool {
        self.battery.as_ref().is_some_and(Battery::is_current_flowing)
    }

    pub fn is_engine_running(&self) -> bool {
        self.engine_state.as_deref() == Some(ENGINE_RUNNING)
    }
}

/// Everything one fetch returned, keyed by VIN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleCollection {
    pub vehicles: BTreeMap<String, Vehicle>,
    pub fetched_at: DateTime<Utc>,
}

impl VehicleCollection {
    pub fn new(vehicles: impl IntoIterator<Item = Vehicle>) -> Self {
        Self {
            vehicles: vehicles
                .into_iter()
                .map(|vehicle| (vehicle.vin.clone(), vehicle))
                .collect(),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn any_charging(&self) -> bool {
        self.vehicles
            .values()
            .any(Vehicle::is_charging_current_flowing)
    }

    pub fn any_driving(&self) -> bool {
        self.vehicles.values().any(Vehicle::is_engine_running)
    }
}
