use crate::cli::call_daemon;
use crate::client::{SmartClient, VehicleClient};
use crate::core::models::{Vehicle, VehicleCollection};
use crate::core::settings::Settings;
use crate::daemon::DaemonSnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
struct StatusOutput {
    vehicles: Vec<VehicleStatus>,
    #[serde(with = "chrono::serde::ts_seconds")]
    fetched_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct VehicleStatus {
    vin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    battery_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_km: Option<f64>,
    charging: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    charging_power_kw: Option<f64>,
    engine_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    climate_active: Option<bool>,
    updated: String,
}

pub async fn run(json: bool, vin_filter: Option<String>, from_daemon: bool) -> Result<()> {
    let collection = if from_daemon {
        let body: String = call_daemon("Snapshot", &()).await?;
        let reply: DaemonSnapshot =
            serde_json::from_str(&body).context("Daemon returned an invalid snapshot")?;
        available_collection(reply)?
    } else {
        fetch_direct().await?
    };

    if collection.is_empty() {
        anyhow::bail!("No vehicles found on this account");
    }

    let statuses = build_statuses(&collection, vin_filter.as_deref());
    if statuses.is_empty() {
        anyhow::bail!("Unknown vehicle: {}", vin_filter.unwrap_or_default());
    }

    if json {
        let output = StatusOutput {
            vehicles: statuses,
            fetched_at: collection.fetched_at,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text_output(&statuses);
    }

    Ok(())
}

/// Stale data from a failed daemon cycle is reported as an error, not shown.
fn available_collection(reply: DaemonSnapshot) -> Result<VehicleCollection> {
    if !reply.available {
        anyhow::bail!(
            "Vehicle data unavailable: {}",
            reply.error.as_deref().unwrap_or("last poll failed")
        );
    }
    Ok(reply.collection)
}

async fn fetch_direct() -> Result<VehicleCollection> {
    let settings = Settings::load()?;
    settings.validate()?;

    if !settings.account.has_credentials() {
        anyhow::bail!(
            "No credentials configured. Set account.username and account.password in {}",
            Settings::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        );
    }

    let client = SmartClient::new(&settings.account)?;
    let timeout = settings.polling.fetch_timeout();
    match tokio::time::timeout(timeout, client.fetch_vehicles()).await {
        Ok(result) => Ok(result?),
        Err(_) => anyhow::bail!("Timed out after {:?} waiting for vehicle data", timeout),
    }
}

fn build_statuses(collection: &VehicleCollection, vin_filter: Option<&str>) -> Vec<VehicleStatus> {
    collection
        .vehicles
        .values()
        .filter(|v| vin_filter.map_or(true, |vin| v.vin.eq_ignore_ascii_case(vin)))
        .map(vehicle_to_status)
        .collect()
}

fn vehicle_to_status(vehicle: &Vehicle) -> VehicleStatus {
    let battery = vehicle.battery.as_ref();
    VehicleStatus {
        vin: vehicle.vin.clone(),
        model: vehicle.model.clone(),
        battery_percent: battery.and_then(|b| b.remaining_percent),
        range_km: battery.and_then(|b| b.range_km),
        charging: battery.is_some_and(|b| b.is_charging()),
        charging_power_kw: battery
            .and_then(|b| b.charging_power)
            .filter(|power| *power != 0.0),
        engine_running: vehicle.is_engine_running(),
        position: vehicle.position.as_ref().map(|p| (p.latitude, p.longitude)),
        climate_active: vehicle.climate.as_ref().map(|c| c.pre_climate_active),
        updated: format_age(vehicle.updated_at, Utc::now()),
    }
}

fn format_age(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(updated_at);

    if age.num_seconds() < 60 {
        return "just now".to_string();
    }

    let total_minutes = age.num_minutes();
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{}d {}h ago", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m ago", hours, minutes)
    } else {
        format!("{}m ago", minutes)
    }
}

fn print_text_output(statuses: &[VehicleStatus]) {
    for (i, status) in statuses.iter().enumerate() {
        if i > 0 {
            println!();
        }

        match &status.model {
            Some(model) => println!("{} ({})", model, status.vin),
            None => println!("{}", status.vin),
        }

        if let Some(percent) = status.battery_percent {
            let range = status
                .range_km
                .map(|r| format!(", {:.0} km range", r))
                .unwrap_or_default();
            println!("  {:<10} {:>5.1}%{}", "Battery:", percent, range);
        }

        if status.charging {
            let power = status
                .charging_power_kw
                .map(|p| format!(" at {:.1} kW", p))
                .unwrap_or_default();
            println!("  {:<10} charging{}", "Charging:", power);
        }

        println!(
            "  {:<10} {}",
            "Engine:",
            if status.engine_running { "running" } else { "off" }
        );

        if let Some((lat, lon)) = status.position {
            println!("  {:<10} {:.5}, {:.5}", "Position:", lat, lon);
        }

        if status.climate_active == Some(true) {
            println!("  {:<10} pre-conditioning", "Climate:");
        }

        println!("  {:<10} {}", "Updated:", status.updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Battery, Position};
    use chrono::{Duration, TimeZone};

    fn vehicle(vin: &str) -> Vehicle {
        Vehicle {
            vin: vin.to_string(),
            model: Some("#3".to_string()),
            battery: Some(Battery {
                remaining_percent: Some(62.0),
                range_km: Some(280.0),
                charging_status: Some("dc_charging".to_string()),
                charging_current: Some(120.0),
                charging_power: Some(-0.0),
            }),
            engine_state: Some("engine_off".to_string()),
            position: Some(Position {
                latitude: 1.3521,
                longitude: 103.8198,
            }),
            climate: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_age() {
        let now = Utc.with_ymd_and_hms(2026, 1, 18, 12, 0, 0).unwrap();
        assert_eq!(format_age(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_age(now - Duration::minutes(7), now), "7m ago");
        assert_eq!(format_age(now - Duration::minutes(125), now), "2h 05m ago");
        assert_eq!(format_age(now - Duration::hours(50), now), "2d 2h ago");
    }

    #[test]
    fn test_status_mapping() {
        let status = vehicle_to_status(&vehicle("VIN1"));
        assert!(status.charging);
        assert!(!status.engine_running);
        assert_eq!(status.battery_percent, Some(62.0));
        assert_eq!(status.charging_power_kw, None);
        assert_eq!(status.position, Some((1.3521, 103.8198)));
    }

    #[test]
    fn test_vin_filter_is_case_insensitive() {
        let collection = VehicleCollection::new([vehicle("VIN1"), vehicle("VIN2")]);

        assert_eq!(build_statuses(&collection, None).len(), 2);
        let filtered = build_statuses(&collection, Some("vin2"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].vin, "VIN2");
        assert!(build_statuses(&collection, Some("VIN3")).is_empty());
    }

    #[test]
    fn test_unavailable_daemon_snapshot_is_error() {
        let reply = DaemonSnapshot {
            available: false,
            error: Some("authentication failed: token expired".to_string()),
            collection: VehicleCollection::new([vehicle("VIN1")]),
        };
        let err = available_collection(reply).unwrap_err();
        assert!(err.to_string().contains("token expired"));

        let reply = DaemonSnapshot {
            available: true,
            error: None,
            collection: VehicleCollection::new([vehicle("VIN1")]),
        };
        assert!(available_collection(reply).unwrap().vehicles.contains_key("VIN1"));
    }
}
