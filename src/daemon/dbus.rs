use crate::core::coordinator::FetchCoordinator;
use crate::daemon::{ActiveCoordinator, DaemonSnapshot, DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use zbus::{fdo, interface};

pub struct PollerService {
    active: ActiveCoordinator,
}

impl PollerService {
    pub fn new(active: ActiveCoordinator) -> Self {
        Self { active }
    }

    async fn coordinator(&self) -> fdo::Result<Arc<FetchCoordinator>> {
        self.active
            .read()
            .await
            .clone()
            .ok_or_else(|| fdo::Error::Failed("Coordinator is not running".to_string()))
    }
}

#[interface(name = "org.vehiclepoller.Daemon")]
impl PollerService {
    async fn refresh(&self) -> fdo::Result<()> {
        tracing::info!("D-Bus Refresh called");
        self.coordinator().await?.trigger_refresh();
        Ok(())
    }

    /// Returns the effective interval in seconds after the request.
    async fn request_interval(&self, key: &str, seconds: u64) -> fdo::Result<u64> {
        if key.is_empty() || seconds == 0 {
            return Err(fdo::Error::InvalidArgs(
                "key must be non-empty and seconds positive".to_string(),
            ));
        }
        let coordinator = self.coordinator().await?;
        Ok(coordinator
            .request_interval(key, Duration::from_secs(seconds))
            .as_secs())
    }

    async fn release_interval(&self, key: &str) -> fdo::Result<u64> {
        let coordinator = self.coordinator().await?;
        Ok(coordinator.release_interval(key).as_secs())
    }

    /// Last accepted snapshot as JSON, tagged with whether it is still available.
    async fn snapshot(&self) -> fdo::Result<String> {
        let update = self.coordinator().await?.current_update();
        let collection = update
            .snapshot
            .ok_or_else(|| fdo::Error::Failed("No vehicle data yet".to_string()))?;

        let reply = DaemonSnapshot {
            available: update.available,
            error: update.error,
            collection: collection.as_ref().clone(),
        };
        serde_json::to_string(&reply).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    #[zbus(property)]
    async fn available(&self) -> bool {
        match self.active.read().await.as_ref() {
            Some(coordinator) => coordinator.current_update().available,
            None => false,
        }
    }

    #[zbus(property)]
    async fn current_interval(&self) -> u64 {
        match self.active.read().await.as_ref() {
            Some(coordinator) => coordinator.current_interval().as_secs(),
            None => 0,
        }
    }

    #[zbus(property)]
    async fn consecutive_failures(&self) -> u32 {
        match self.active.read().await.as_ref() {
            Some(coordinator) => coordinator.consecutive_failures(),
            None => 0,
        }
    }
}

pub async fn start_dbus_server(active: ActiveCoordinator) -> Result<zbus::Connection> {
    let connection = zbus::connection::Builder::session()
        .context("Failed to connect to session D-Bus")?
        .name(DBUS_NAME)?
        .serve_at(DBUS_PATH, PollerService::new(active))?
        .build()
        .await
        .context("Failed to register D-Bus service")?;

    tracing::info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus service registered");
    Ok(connection)
}
