use crate::core::coordinator::{CycleStatus, FetchCoordinator};
use crate::core::notifications::send_reauth_notification;
use crate::core::settings::Settings;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct PollingOptions {
    pub refresh_cooldown: Duration,
    pub notify_reauth: bool,
}

impl From<&Settings> for PollingOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            refresh_cooldown: settings.polling.refresh_cooldown(),
            notify_reauth: settings.notifications.enabled,
        }
    }
}

/// Drives the coordinator: one cycle at startup, then one per elapsed
/// interval or on-demand refresh. This loop is the only caller of `poll`.
pub async fn run_polling_loop(coordinator: Arc<FetchCoordinator>, options: PollingOptions) {
    let mut interval_rx = coordinator.watch_interval();

    run_cycle(&coordinator, &options).await;

    loop {
        if coordinator.needs_reauth() {
            tracing::warn!("Scheduled polling paused until credentials are updated");
            coordinator.refresh_requested().await;
            run_cycle(&coordinator, &options).await;
            continue;
        }

        let interval = *interval_rx.borrow_and_update();
        let deadline = deadline_after(coordinator.last_cycle(), interval);

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
            _ = coordinator.refresh_requested() => {
                let earliest = deadline_after(coordinator.last_cycle(), options.refresh_cooldown);
                tokio::time::sleep_until(earliest).await;
            }
        }

        run_cycle(&coordinator, &options).await;
    }
}

fn deadline_after(last: Option<Instant>, wait: Duration) -> tokio::time::Instant {
    let start = last.unwrap_or_else(Instant::now);
    match start.checked_add(wait) {
        Some(deadline) => tokio::time::Instant::from_std(deadline),
        None => tokio::time::Instant::now() + FAR_FUTURE,
    }
}

async fn run_cycle(coordinator: &FetchCoordinator, options: &PollingOptions) {
    match coordinator.poll().await {
        Ok(CycleStatus::Accepted) => {
            tracing::debug!(
                next_poll_secs = coordinator.current_interval().as_secs(),
                "Poll cycle accepted"
            );
        }
        Ok(CycleStatus::Degraded {
            consecutive_failures,
        }) => {
            tracing::debug!(consecutive_failures, "Poll cycle degraded");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Poll cycle failed, vehicle data unavailable");
            if e.needs_reauth() && options.notify_reauth {
                if let Err(err) = send_reauth_notification(&e.to_string()) {
                    tracing::warn!(error = %err, "Failed to send notification");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::tests::{Script, ScriptedClient};
    use crate::core::coordinator::CoordinatorConfig;

    fn options() -> PollingOptions {
        PollingOptions {
            refresh_cooldown: Duration::ZERO,
            notify_reauth: false,
        }
    }

    fn coordinator(client: Arc<ScriptedClient>, interval: Duration) -> Arc<FetchCoordinator> {
        Arc::new(FetchCoordinator::new(
            client,
            CoordinatorConfig {
                default_interval: interval,
                fetch_timeout: Duration::from_millis(50),
                max_failures: 10,
            },
        ))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[test]
    fn test_deadline_after_last_cycle() {
        let last = Instant::now();
        let deadline = deadline_after(Some(last), Duration::from_secs(30));
        assert_eq!(
            deadline,
            tokio::time::Instant::from_std(last + Duration::from_secs(30))
        );
    }

    #[test]
    fn test_deadline_overflow_is_far_future() {
        let deadline = deadline_after(Some(Instant::now()), Duration::MAX);
        assert!(deadline > tokio::time::Instant::now() + Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_first_cycle_runs_immediately() {
        let client = ScriptedClient::new(Vec::new());
        let coordinator = coordinator(client.clone(), Duration::from_secs(300));

        let handle = tokio::spawn(run_polling_loop(Arc::clone(&coordinator), options()));
        settle().await;

        assert_eq!(client.calls(), 1);
        assert!(coordinator.current_snapshot().is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn test_trigger_refresh_runs_extra_cycle() {
        let client = ScriptedClient::new(Vec::new());
        let coordinator = coordinator(client.clone(), Duration::from_secs(300));

        let handle = tokio::spawn(run_polling_loop(Arc::clone(&coordinator), options()));
        settle().await;
        coordinator.trigger_refresh();
        settle().await;

        assert_eq!(client.calls(), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_shorter_interval_takes_effect_without_waiting() {
        let client = ScriptedClient::new(Vec::new());
        let coordinator = coordinator(client.clone(), Duration::from_secs(300));

        let handle = tokio::spawn(run_polling_loop(Arc::clone(&coordinator), options()));
        settle().await;
        coordinator.request_interval("charging", Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(client.calls() >= 3, "got {} calls", client.calls());
        handle.abort();
    }

    #[tokio::test]
    async fn test_auth_failure_pauses_scheduled_polling() {
        let client = ScriptedClient::new([Script::Auth]);
        let coordinator = coordinator(client.clone(), Duration::from_millis(10));

        let handle = tokio::spawn(run_polling_loop(Arc::clone(&coordinator), options()));
        settle().await;
        assert_eq!(client.calls(), 1);
        assert!(coordinator.needs_reauth());

        coordinator.trigger_refresh();
        settle().await;
        assert!(client.calls() >= 2);
        assert!(!coordinator.needs_reauth());
        handle.abort();
    }
}
