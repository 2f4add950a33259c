use std::collections::HashMap;
use std::time::Duration;

/// Tracks per-activity poll interval requests and resolves them to the
/// interval that should currently drive polling.
#[derive(Debug, Clone)]
pub struct PollingScheduler {
    default_interval: Duration,
    requests: HashMap<String, Duration>,
    current: Duration,
}

impl PollingScheduler {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            requests: HashMap::new(),
            current: default_interval,
        }
    }

    /// Inserts or overwrites the request for `activity`. Values are taken as given.
    pub fn set_interval(&mut self, activity: impl Into<String>, interval: Duration) -> Duration {
        self.requests.insert(activity.into(), interval);
        self.recompute()
    }

    /// Drops the request for `activity`; absent keys are a no-op.
    pub fn reset_interval(&mut self, activity: &str) -> Duration {
        self.requests.remove(activity);
        self.recompute()
    }

    pub fn current_interval(&self) -> Duration {
        self.current
    }

    pub fn requested(&self, activity: &str) -> Option<Duration> {
        self.requests.get(activity).copied()
    }

    fn recompute(&mut self) -> Duration {
        self.current = self
            .requests
            .values()
            .copied()
            .min()
            .unwrap_or(self.default_interval);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(300);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_starts_at_default() {
        let scheduler = PollingScheduler::new(DEFAULT);
        assert_eq!(scheduler.current_interval(), DEFAULT);
        assert_eq!(scheduler.requested("charging"), None);
    }

    #[test]
    fn test_charging_then_driving_scenario() {
        let mut scheduler = PollingScheduler::new(DEFAULT);

        scheduler.set_interval("charging", secs(30));
        scheduler.set_interval("driving", secs(60));
        assert_eq!(scheduler.current_interval(), secs(30));

        scheduler.reset_interval("charging");
        assert_eq!(scheduler.current_interval(), secs(60));

        scheduler.reset_interval("driving");
        assert_eq!(scheduler.current_interval(), DEFAULT);
    }

    #[test]
    fn test_overwrite_same_key() {
        let mut scheduler = PollingScheduler::new(DEFAULT);

        scheduler.set_interval("climate", secs(5));
        assert_eq!(scheduler.current_interval(), secs(5));

        scheduler.set_interval("climate", secs(120));
        assert_eq!(scheduler.current_interval(), secs(120));
        assert_eq!(scheduler.requested("climate"), Some(secs(120)));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut scheduler = PollingScheduler::new(DEFAULT);
        scheduler.set_interval("charging", secs(30));
        scheduler.set_interval("driving", secs(60));

        scheduler.reset_interval("driving");
        let once = scheduler.current_interval();
        scheduler.reset_interval("driving");
        assert_eq!(scheduler.current_interval(), once);
        assert_eq!(scheduler.requested("charging"), Some(secs(30)));
    }

    #[test]
    fn test_reset_unknown_key_is_noop() {
        let mut scheduler = PollingScheduler::new(DEFAULT);
        assert_eq!(scheduler.reset_interval("never-set"), DEFAULT);

        scheduler.set_interval("charging", secs(30));
        assert_eq!(scheduler.reset_interval("never-set"), secs(30));
    }

    #[test]
    fn test_removing_non_minimum_keeps_minimum() {
        let mut scheduler = PollingScheduler::new(DEFAULT);
        scheduler.set_interval("charging", secs(30));
        scheduler.set_interval("driving", secs(60));

        scheduler.reset_interval("driving");
        assert_eq!(scheduler.current_interval(), secs(30));
    }

    #[test]
    fn test_request_longer_than_default_wins_when_alone() {
        let mut scheduler = PollingScheduler::new(DEFAULT);
        scheduler.set_interval("slow", secs(900));
        assert_eq!(scheduler.current_interval(), secs(900));
    }

    #[test]
    fn test_zero_interval_accepted_as_given() {
        let mut scheduler = PollingScheduler::new(DEFAULT);
        scheduler.set_interval("burst", Duration::ZERO);
        assert_eq!(scheduler.current_interval(), Duration::ZERO);
    }

    #[test]
    fn test_always_minimum_of_registered() {
        let mut scheduler = PollingScheduler::new(DEFAULT);
        let ops: [(&str, Option<u64>); 8] = [
            ("a", Some(50)),
            ("b", Some(20)),
            ("c", Some(20)),
            ("b", None),
            ("a", Some(10)),
            ("c", None),
            ("a", None),
            ("c", None),
        ];
        let mut expected: HashMap<&str, u64> = HashMap::new();

        for (key, value) in ops {
            match value {
                Some(v) => {
                    scheduler.set_interval(key, secs(v));
                    expected.insert(key, v);
                }
                None => {
                    scheduler.reset_interval(key);
                    expected.remove(key);
                }
            }
            let want = expected.values().min().map_or(DEFAULT, |v| secs(*v));
            assert_eq!(scheduler.current_interval(), want);
        }
    }
}
