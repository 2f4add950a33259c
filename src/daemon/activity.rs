use crate::core::coordinator::FetchCoordinator;
use crate::core::models::VehicleCollection;
use crate::core::settings::PollingSettings;
use crate::core::store::CoordinatorUpdate;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const CHARGING: &str = "charging";
pub const DRIVING: &str = "driving";

struct ActivityRule {
    key: &'static str,
    interval: Duration,
    detect: fn(&VehicleCollection) -> bool,
}

/// Requests a faster poll interval while a vehicle is charging or driving,
/// and releases it once the condition ends.
pub struct ActivityMonitor {
    rules: Vec<ActivityRule>,
    active: HashSet<&'static str>,
}

impl ActivityMonitor {
    pub fn new(polling: &PollingSettings) -> Self {
        Self {
            rules: vec![
                ActivityRule {
                    key: CHARGING,
                    interval: polling.charging_interval(),
                    detect: VehicleCollection::any_charging,
                },
                ActivityRule {
                    key: DRIVING,
                    interval: polling.driving_interval(),
                    detect: VehicleCollection::any_driving,
                },
            ],
            active: HashSet::new(),
        }
    }

    /// Applies interval requests for `snapshot`. Returns true if an activity just started.
    pub fn observe(&mut self, coordinator: &FetchCoordinator, snapshot: &VehicleCollection) -> bool {
        let mut started = false;

        for rule in &self.rules {
            if (rule.detect)(snapshot) {
                if self.active.insert(rule.key) {
                    coordinator.request_interval(rule.key, rule.interval);
                    started = true;
                }
            } else if self.active.remove(rule.key) {
                coordinator.release_interval(rule.key);
            }
        }

        started
    }

    #[cfg(test)]
    fn is_active(&self, key: &str) -> bool {
        self.active.contains(key)
    }
}

/// `updates` must be subscribed before the first poll so the initial snapshot is seen.
pub async fn run_activity_monitor(
    coordinator: Arc<FetchCoordinator>,
    mut updates: watch::Receiver<CoordinatorUpdate>,
    polling: PollingSettings,
) {
    let mut monitor = ActivityMonitor::new(&polling);

    while updates.changed().await.is_ok() {
        let update = updates.borrow_and_update().clone();
        if !update.available {
            continue;
        }
        let Some(snapshot) = update.snapshot else {
            continue;
        };

        if monitor.observe(&coordinator, &snapshot) {
            coordinator.trigger_refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::tests::{Script, ScriptedClient};
    use crate::core::coordinator::CoordinatorConfig;
    use crate::core::models::{Battery, Vehicle};
    use chrono::Utc;

    fn vehicle(current: f64, engine: &str) -> VehicleCollection {
        VehicleCollection::new([Vehicle {
            vin: "VIN1".to_string(),
            model: None,
            battery: Some(Battery {
                remaining_percent: Some(50.0),
                range_km: None,
                charging_status: None,
                charging_current: Some(current),
                charging_power: None,
            }),
            engine_state: Some(engine.to_string()),
            position: None,
            climate: None,
            updated_at: Utc::now(),
        }])
    }

    fn coordinator() -> FetchCoordinator {
        FetchCoordinator::new(ScriptedClient::new(Vec::new()), CoordinatorConfig::default())
    }

    #[test]
    fn test_charging_requests_and_releases_interval() {
        let coordinator = coordinator();
        let mut monitor = ActivityMonitor::new(&PollingSettings::default());

        assert!(monitor.observe(&coordinator, &vehicle(16.0, "engine_off")));
        assert!(monitor.is_active(CHARGING));
        assert_eq!(coordinator.current_interval(), Duration::from_secs(30));

        // Still charging: no new start, interval unchanged.
        assert!(!monitor.observe(&coordinator, &vehicle(15.5, "engine_off")));
        assert_eq!(coordinator.current_interval(), Duration::from_secs(30));

        assert!(!monitor.observe(&coordinator, &vehicle(0.0, "engine_off")));
        assert!(!monitor.is_active(CHARGING));
        assert_eq!(coordinator.current_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_driving_and_charging_pick_minimum() {
        let coordinator = coordinator();
        let mut monitor = ActivityMonitor::new(&PollingSettings::default());

        monitor.observe(&coordinator, &vehicle(0.0, "engine_running"));
        assert_eq!(coordinator.current_interval(), Duration::from_secs(60));

        monitor.observe(&coordinator, &vehicle(-3.0, "engine_running"));
        assert_eq!(coordinator.current_interval(), Duration::from_secs(30));

        monitor.observe(&coordinator, &vehicle(-3.0, "engine_off"));
        assert!(!monitor.is_active(DRIVING));
        assert_eq!(coordinator.current_interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_monitor_reacts_to_published_snapshots() {
        let client = ScriptedClient::new([Script::Charging("VIN1")]);
        let coordinator = Arc::new(FetchCoordinator::new(client, CoordinatorConfig::default()));
        let updates = coordinator.subscribe();
        let handle = tokio::spawn(run_activity_monitor(
            Arc::clone(&coordinator),
            updates,
            PollingSettings::default(),
        ));

        coordinator.poll().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.current_interval(), Duration::from_secs(30));

        // Newly started activity asks for an immediate refresh.
        tokio::time::timeout(Duration::from_secs(1), coordinator.refresh_requested())
            .await
            .unwrap();

        coordinator.poll().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.current_interval(), Duration::from_secs(300));
        handle.abort();
    }
}
