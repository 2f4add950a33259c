use crate::client::{SmartClient, VehicleClient};
use crate::core::coordinator::{CoordinatorConfig, FetchCoordinator};
use crate::core::settings::{Settings, SettingsWatcher};
use crate::daemon::activity::run_activity_monitor;
use crate::daemon::dbus::start_dbus_server;
use crate::daemon::polling::{run_polling_loop, PollingOptions};
use crate::daemon::ActiveCoordinator;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub async fn run() -> Result<()> {
    let mut settings_watcher = SettingsWatcher::new()?;
    let mut settings = settings_watcher.get().await;
    settings_watcher.start_watching()?;
    let mut settings_rx = settings_watcher.subscribe();

    let active: ActiveCoordinator = Arc::new(RwLock::new(None));

    let _dbus_connection = match start_dbus_server(Arc::clone(&active)).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus unavailable, remote refresh disabled");
            None
        }
    };

    loop {
        let session = Session::start(&settings, &active).await?;

        tokio::select! {
            changed = settings_rx.recv() => {
                session.stop(&active).await;
                match changed {
                    Ok(new_settings) => settings = new_settings,
                    Err(RecvError::Lagged(_)) => settings = settings_watcher.get().await,
                    Err(RecvError::Closed) => return Ok(()),
                }
                tracing::info!("Reloading coordinator with new settings");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                session.stop(&active).await;
                return Ok(());
            }
        }
    }
}

/// One coordinator and its tasks, rebuilt from scratch on every config change.
struct Session {
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    async fn start(settings: &Settings, active: &ActiveCoordinator) -> Result<Self> {
        let client: Arc<dyn VehicleClient> = Arc::new(SmartClient::new(&settings.account)?);
        let client_name = client.name();
        let coordinator = Arc::new(FetchCoordinator::new(
            client,
            CoordinatorConfig::from(&settings.polling),
        ));

        *active.write().await = Some(Arc::clone(&coordinator));

        // Subscribe before the first poll so the activity monitor sees it.
        let updates = coordinator.subscribe();
        let tasks = vec![
            tokio::spawn(run_activity_monitor(
                Arc::clone(&coordinator),
                updates,
                settings.polling.clone(),
            )),
            tokio::spawn(run_polling_loop(
                Arc::clone(&coordinator),
                PollingOptions::from(settings),
            )),
        ];

        tracing::info!(
            client = client_name,
            region = ?settings.account.region,
            interval_secs = settings.polling.scan_interval,
            max_failures = settings.polling.max_consecutive_failures,
            "Coordinator started"
        );

        Ok(Self { tasks })
    }

    async fn stop(self, active: &ActiveCoordinator) {
        for task in &self.tasks {
            task.abort();
        }
        active.write().await.take();
    }
}
