use crate::core::models::VehicleCollection;
use crate::core::retry::RetryState;
use crate::core::scheduler::PollingScheduler;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// What entities see after each poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorUpdate {
    pub snapshot: Option<Arc<VehicleCollection>>,
    pub available: bool,
    pub error: Option<String>,
}

/// Result of absorbing one transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientVerdict {
    /// Cached snapshot re-served; `log` is false for repeated messages.
    Degraded { failures: u32, log: bool },
    NoCachedData { failures: u32 },
    ThresholdExceeded { failures: u32 },
}

struct StoreInner {
    snapshot: Option<Arc<VehicleCollection>>,
    retry: RetryState,
    scheduler: PollingScheduler,
    needs_reauth: bool,
    last_cycle: Option<Instant>,
}

/// Coordinator state behind one mutex. Never held across an await.
pub struct CoordinatorStore {
    inner: Arc<Mutex<StoreInner>>,
    updates: watch::Sender<CoordinatorUpdate>,
    interval: watch::Sender<Duration>,
}

impl CoordinatorStore {
    pub fn new(default_interval: Duration, max_failures: u32) -> Self {
        let (updates, _) = watch::channel(CoordinatorUpdate::default());
        let (interval, _) = watch::channel(default_interval);

        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                snapshot: None,
                retry: RetryState::new(max_failures),
                scheduler: PollingScheduler::new(default_interval),
                needs_reauth: false,
                last_cycle: None,
            })),
            updates,
            interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Every critical section leaves the state consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Option<Arc<VehicleCollection>> {
        self.lock().snapshot.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().retry.consecutive_failures()
    }

    pub fn needs_reauth(&self) -> bool {
        self.lock().needs_reauth
    }

    pub fn last_cycle(&self) -> Option<Instant> {
        self.lock().last_cycle
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorUpdate> {
        self.updates.subscribe()
    }

    pub fn current_update(&self) -> CoordinatorUpdate {
        self.updates.borrow().clone()
    }

    pub fn watch_interval(&self) -> watch::Receiver<Duration> {
        self.interval.subscribe()
    }

    pub fn current_interval(&self) -> Duration {
        self.lock().scheduler.current_interval()
    }

    pub fn set_interval(&self, activity: &str, interval: Duration) -> Duration {
        let mut inner = self.lock();
        let current = inner.scheduler.set_interval(activity, interval);
        // Publish under the lock so concurrent callers cannot reorder sends.
        self.publish_interval(current);
        current
    }

    pub fn reset_interval(&self, activity: &str) -> Duration {
        let mut inner = self.lock();
        let current = inner.scheduler.reset_interval(activity);
        self.publish_interval(current);
        current
    }

    pub fn requested_interval(&self, activity: &str) -> Option<Duration> {
        self.lock().scheduler.requested(activity)
    }

    fn publish_interval(&self, current: Duration) {
        self.interval.send_if_modified(|published| {
            if *published == current {
                return false;
            }
            tracing::info!(interval_secs = current.as_secs(), "Poll interval changed");
            *published = current;
            true
        });
    }

    /// Replaces the snapshot and clears failures. Returns the failure count it recovered from.
    pub fn accept(&self, snapshot: VehicleCollection) -> Option<u32> {
        let snapshot = Arc::new(snapshot);
        let recovered = {
            let mut inner = self.lock();
            inner.snapshot = Some(Arc::clone(&snapshot));
            inner.needs_reauth = false;
            inner.last_cycle = Some(Instant::now());
            inner.retry.record_success()
        };

        self.updates.send_replace(CoordinatorUpdate {
            snapshot: Some(snapshot),
            available: true,
            error: None,
        });
        recovered
    }

    pub fn absorb_transient(&self, message: &str) -> TransientVerdict {
        let (verdict, snapshot) = {
            let mut inner = self.lock();
            inner.last_cycle = Some(Instant::now());
            let failures = inner.retry.record_failure();

            let verdict = if inner.snapshot.is_none() {
                TransientVerdict::NoCachedData { failures }
            } else if !inner.retry.within_threshold() {
                TransientVerdict::ThresholdExceeded { failures }
            } else {
                TransientVerdict::Degraded {
                    failures,
                    log: inner.retry.should_log(message),
                }
            };
            (verdict, inner.snapshot.clone())
        };

        match verdict {
            TransientVerdict::Degraded { .. } => {
                self.updates.send_replace(CoordinatorUpdate {
                    snapshot,
                    available: true,
                    error: Some(message.to_string()),
                });
            }
            _ => self.publish_unavailable(snapshot, message),
        }
        verdict
    }

    /// Counts the failure without offering the cache.
    pub fn record_unexpected(&self, message: &str) -> u32 {
        let (failures, snapshot) = {
            let mut inner = self.lock();
            inner.last_cycle = Some(Instant::now());
            (inner.retry.record_failure(), inner.snapshot.clone())
        };
        self.publish_unavailable(snapshot, message);
        failures
    }

    /// Fatal failure that leaves the counter untouched.
    pub fn record_fatal(&self, message: &str, needs_reauth: bool) {
        let snapshot = {
            let mut inner = self.lock();
            inner.last_cycle = Some(Instant::now());
            inner.needs_reauth |= needs_reauth;
            inner.snapshot.clone()
        };
        self.publish_unavailable(snapshot, message);
    }

    fn publish_unavailable(&self, snapshot: Option<Arc<VehicleCollection>>, message: &str) {
        self.updates.send_replace(CoordinatorUpdate {
            snapshot,
            available: false,
            error: Some(message.to_string()),
        });
    }
}
