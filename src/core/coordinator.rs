//! One poll cycle: fetch, classify the outcome, and decide between serving
//! fresh data, re-serving the cached snapshot, or failing the cycle.

use crate::client::{FailureClass, FetchError, VehicleClient};
use crate::core::models::VehicleCollection;
use crate::core::settings::PollingSettings;
use crate::core::store::{CoordinatorStore, CoordinatorUpdate, TransientVerdict};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};

/// Classified result of one call into the vehicle client.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(VehicleCollection),
    AuthFailure(FetchError),
    RemoteServiceFailure(FetchError),
    TransientFailure(FetchError),
    UnexpectedFailure(FetchError),
}

impl From<Result<VehicleCollection, FetchError>> for FetchOutcome {
    fn from(result: Result<VehicleCollection, FetchError>) -> Self {
        match result {
            Ok(snapshot) => Self::Success(snapshot),
            Err(e) => match e.classify() {
                FailureClass::Auth => Self::AuthFailure(e),
                FailureClass::RemoteService => Self::RemoteServiceFailure(e),
                FailureClass::Transient => Self::TransientFailure(e),
                FailureClass::Unexpected => Self::UnexpectedFailure(e),
            },
        }
    }
}

/// Non-fatal end states of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Accepted,
    Degraded { consecutive_failures: u32 },
}

/// A failed cycle; dependent entities are unavailable until the next success.
#[derive(Debug, Error)]
pub enum UpdateFailed {
    #[error("re-authentication required: {0}")]
    AuthFailed(FetchError),

    #[error("remote service failure: {0}")]
    RemoteService(FetchError),

    #[error("no cached data to fall back on: {0}")]
    NoCachedData(FetchError),

    #[error("{failures} consecutive failures, last: {last}")]
    TooManyFailures { failures: u32, last: FetchError },

    #[error("unexpected error: {0}")]
    Unexpected(FetchError),
}

impl UpdateFailed {
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub default_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_failures: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&PollingSettings::default())
    }
}

impl From<&PollingSettings> for CoordinatorConfig {
    fn from(polling: &PollingSettings) -> Self {
        Self {
            default_interval: polling.scan_interval(),
            fetch_timeout: polling.fetch_timeout(),
            max_failures: polling.max_consecutive_failures,
        }
    }
}

/// Callers must not run [`FetchCoordinator::poll`] concurrently; the polling
/// loop is the single driver and on-demand refreshes go through it.
pub struct FetchCoordinator {
    client: Arc<dyn VehicleClient>,
    fetch_timeout: Duration,
    store: CoordinatorStore,
    refresh: Notify,
}

impl FetchCoordinator {
    pub fn new(client: Arc<dyn VehicleClient>, config: CoordinatorConfig) -> Self {
        Self {
            client,
            fetch_timeout: config.fetch_timeout,
            store: CoordinatorStore::new(config.default_interval, config.max_failures),
            refresh: Notify::new(),
        }
    }

    pub async fn poll(&self) -> Result<CycleStatus, UpdateFailed> {
        let started = Instant::now();
        let outcome = self.fetch().await;
        tracing::debug!(
            client = self.client.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetch finished"
        );
        self.apply(outcome)
    }

    async fn fetch(&self) -> FetchOutcome {
        let result = match tokio::time::timeout(self.fetch_timeout, self.client.fetch_vehicles()).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };
        FetchOutcome::from(result)
    }

    fn apply(&self, outcome: FetchOutcome) -> Result<CycleStatus, UpdateFailed> {
        match outcome {
            FetchOutcome::Success(snapshot) => {
                let vehicles = snapshot.vehicles.len();
                if let Some(failures) = self.store.accept(snapshot) {
                    tracing::info!(failures, "Vehicle data recovered after consecutive failures");
                }
                tracing::debug!(vehicles, "Accepted vehicle snapshot");
                Ok(CycleStatus::Accepted)
            }
            FetchOutcome::AuthFailure(e) => {
                tracing::error!(error = %e, "Authentication failed, credentials must be updated");
                self.store.record_fatal(&e.to_string(), true);
                Err(UpdateFailed::AuthFailed(e))
            }
            FetchOutcome::RemoteServiceFailure(e) => {
                tracing::warn!(error = %e, "Remote service failure");
                self.store.record_fatal(&e.to_string(), false);
                Err(UpdateFailed::RemoteService(e))
            }
            FetchOutcome::TransientFailure(e) => self.apply_transient(e),
            FetchOutcome::UnexpectedFailure(e) => {
                let failures = self.store.record_unexpected(&e.to_string());
                tracing::error!(
                    error = ?e,
                    consecutive_failures = failures,
                    "Unexpected error while fetching vehicle data"
                );
                Err(UpdateFailed::Unexpected(e))
            }
        }
    }

    fn apply_transient(&self, e: FetchError) -> Result<CycleStatus, UpdateFailed> {
        let message = e.to_string();
        match self.store.absorb_transient(&message) {
            TransientVerdict::Degraded { failures, log } => {
                if log {
                    tracing::warn!(
                        error = %message,
                        consecutive_failures = failures,
                        "Fetch failed, serving cached vehicle data"
                    );
                } else {
                    tracing::debug!(
                        error = %message,
                        consecutive_failures = failures,
                        "Fetch failed again, serving cached vehicle data"
                    );
                }
                Ok(CycleStatus::Degraded {
                    consecutive_failures: failures,
                })
            }
            TransientVerdict::NoCachedData { failures } => {
                tracing::warn!(
                    error = %message,
                    consecutive_failures = failures,
                    "Fetch failed and no cached data is available"
                );
                Err(UpdateFailed::NoCachedData(e))
            }
            TransientVerdict::ThresholdExceeded { failures } => {
                tracing::error!(
                    error = %message,
                    consecutive_failures = failures,
                    "Too many consecutive failures, marking vehicle data unavailable"
                );
                Err(UpdateFailed::TooManyFailures { failures, last: e })
            }
        }
    }

    pub fn current_snapshot(&self) -> Option<Arc<VehicleCollection>> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorUpdate> {
        self.store.subscribe()
    }

    /// Latest published update, including whether the data is still available.
    pub fn current_update(&self) -> CoordinatorUpdate {
        self.store.current_update()
    }

    pub fn request_interval(&self, activity: &str, interval: Duration) -> Duration {
        tracing::info!(
            activity,
            interval_secs = interval.as_secs(),
            "Poll interval requested"
        );
        self.store.set_interval(activity, interval)
    }

    pub fn release_interval(&self, activity: &str) -> Duration {
        if self.store.requested_interval(activity).is_some() {
            tracing::info!(activity, "Poll interval released");
        }
        self.store.reset_interval(activity)
    }

    pub fn current_interval(&self) -> Duration {
        self.store.current_interval()
    }

    pub fn watch_interval(&self) -> watch::Receiver<Duration> {
        self.store.watch_interval()
    }

    /// Asks the polling loop for an out-of-band cycle. Requests made while a
    /// cycle is in flight collapse into a single follow-up cycle.
    pub fn trigger_refresh(&self) {
        tracing::debug!("Refresh requested");
        self.refresh.notify_one();
    }

    pub async fn refresh_requested(&self) {
        self.refresh.notified().await;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.store.consecutive_failures()
    }

    pub fn needs_reauth(&self) -> bool {
        self.store.needs_reauth()
    }

    pub fn last_cycle(&self) -> Option<Instant> {
        self.store.last_cycle()
    }
}
