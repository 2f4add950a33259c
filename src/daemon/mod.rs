mod activity;
mod app;
mod dbus;
mod polling;

use crate::core::coordinator::FetchCoordinator;
use crate::core::models::VehicleCollection;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DBUS_NAME: &str = "org.vehiclepoller.Daemon";
pub const DBUS_PATH: &str = "/org/vehiclepoller/Daemon";

/// The coordinator of the currently loaded config, shared with the D-Bus service.
pub type ActiveCoordinator = Arc<RwLock<Option<Arc<FetchCoordinator>>>>;

/// JSON body of the D-Bus `Snapshot()` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSnapshot {
    /// False once a cycle has failed; `collection` is then the last good data.
    pub available: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub collection: VehicleCollection,
}

pub async fn run() -> Result<()> {
    tracing::info!("Starting vehicle-poller daemon");
    app::run().await
}
