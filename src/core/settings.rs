use anyhow::{Context, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};

pub const MIN_SCAN_INTERVAL: u64 = 10;

const EU_BASE_URL: &str = "https://api.ecloudeu.com";
const INTL_BASE_URL: &str = "https://sg-app-api.smart.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub account: AccountSettings,
    pub polling: PollingSettings,
    pub notifications: NotificationSettings,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account: AccountSettings::default(),
            polling: PollingSettings::default(),
            notifications: NotificationSettings::default(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Eu,
    Intl,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub username: String,
    pub password: String,
    pub region: Region,
    pub api_base_url: Option<String>,
    pub vin: Option<String>,
}

impl AccountSettings {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Custom regions without a URL fall back to the EU endpoint.
    pub fn base_url(&self) -> &str {
        match self.region {
            Region::Eu => EU_BASE_URL,
            Region::Intl => INTL_BASE_URL,
            Region::Custom => self
                .api_base_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .unwrap_or(EU_BASE_URL),
        }
    }
}

/// Interval values are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub scan_interval: u64,
    pub charging_interval: u64,
    pub driving_interval: u64,
    pub fast_interval: u64,
    pub max_consecutive_failures: u32,
    pub fetch_timeout: u64,
    pub refresh_cooldown: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            scan_interval: 300,
            charging_interval: 30,
            driving_interval: 60,
            fast_interval: 5,
            max_consecutive_failures: 10,
            fetch_timeout: 10,
            refresh_cooldown: 5,
        }
    }
}

impl PollingSettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn charging_interval(&self) -> Duration {
        Duration::from_secs(self.charging_interval)
    }

    pub fn driving_interval(&self) -> Duration {
        Duration::from_secs(self.driving_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.refresh_cooldown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vehicle-poller").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path().context("Could not determine config directory")?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let polling = &self.polling;
        for (name, value) in [
            ("scan_interval", polling.scan_interval),
            ("charging_interval", polling.charging_interval),
            ("driving_interval", polling.driving_interval),
        ] {
            if value < MIN_SCAN_INTERVAL {
                anyhow::bail!(
                    "polling.{} must be at least {} seconds, got {}",
                    name,
                    MIN_SCAN_INTERVAL,
                    value
                );
            }
        }
        if polling.fast_interval == 0 {
            anyhow::bail!("polling.fast_interval must be at least 1 second");
        }
        if polling.max_consecutive_failures == 0 {
            anyhow::bail!("polling.max_consecutive_failures must be at least 1");
        }
        if polling.fetch_timeout == 0 {
            anyhow::bail!("polling.fetch_timeout must be at least 1 second");
        }
        if self.account.region == Region::Custom
            && self
                .account
                .api_base_url
                .as_deref()
                .map_or(true, str::is_empty)
        {
            anyhow::bail!("account.api_base_url is required when account.region = \"custom\"");
        }
        Ok(())
    }
}

/// Holds the live settings and broadcasts every valid change to the config file.
pub struct SettingsWatcher {
    path: PathBuf,
    current: Arc<RwLock<Settings>>,
    tx: broadcast::Sender<Settings>,
    watcher: Option<RecommendedWatcher>,
}

impl SettingsWatcher {
    pub fn new() -> Result<Self> {
        let path = Settings::config_path().context("Could not determine config directory")?;
        Self::with_path(path)
    }

    pub fn with_path(path: PathBuf) -> Result<Self> {
        let settings = Settings::load_from(&path)?;
        settings.validate()?;

        let (tx, _) = broadcast::channel(8);
        Ok(Self {
            path,
            current: Arc::new(RwLock::new(settings)),
            tx,
            watcher: None,
        })
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn start_watching(&mut self) -> Result<()> {
        let (Some(parent), Some(filename)) = (self.path.parent(), self.path.file_name()) else {
            anyhow::bail!("Invalid config path: {}", self.path.display());
        };
        if !parent.exists() {
            tracing::warn!(?parent, "Config directory does not exist, skipping watch");
            return Ok(());
        }

        let filename = filename.to_os_string();
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else { return };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(filename.as_os_str()))
                {
                    let _ = notify_tx.send(());
                }
            },
            Config::default(),
        )?;

        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;
        tracing::info!(?parent, "Watching config directory");

        let path = self.path.clone();
        let current = Arc::clone(&self.current);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            while notify_rx.recv().await.is_some() {
                // Editors write in bursts; settle before re-reading.
                tokio::time::sleep(Duration::from_millis(200)).await;
                while notify_rx.try_recv().is_ok() {}

                let reloaded = Settings::load_from(&path).and_then(|s| s.validate().map(|_| s));
                match reloaded {
                    Ok(settings) => {
                        let mut guard = current.write().await;
                        if *guard == settings {
                            continue;
                        }
                        *guard = settings.clone();
                        drop(guard);
                        tracing::info!("Config changed on disk");
                        let _ = tx.send(settings);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring invalid config change");
                    }
                }
            }
        });

        self.watcher = Some(watcher);
        Ok(())
    }
}
