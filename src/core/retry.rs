pub const DEFAULT_MAX_FAILURES: u32 = 10;

/// Consecutive transient failure counter with duplicate-log suppression.
#[derive(Debug, Clone)]
pub struct RetryState {
    consecutive_failures: u32,
    max_failures: u32,
    last_error: Option<String>,
}

impl RetryState {
    pub fn new(max_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures,
            last_error: None,
        }
    }

    /// Resets the counter, returning how many failures preceded this success.
    pub fn record_success(&mut self) -> Option<u32> {
        let previous = self.consecutive_failures;
        self.consecutive_failures = 0;
        self.last_error = None;
        (previous > 0).then_some(previous)
    }

    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// True while the cached snapshot may still be served.
    pub fn within_threshold(&self) -> bool {
        self.consecutive_failures < self.max_failures
    }

    /// Remembers `message` and reports whether it differs from the last one seen.
    pub fn should_log(&mut self, message: &str) -> bool {
        if self.last_error.as_deref() == Some(message) {
            return false;
        }
        self.last_error = Some(message.to_string());
        true
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = RetryState::default();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.max_failures, 10);
        assert!(state.within_threshold());
    }

    #[test]
    fn test_threshold_reached_at_max() {
        let mut state = RetryState::new(3);

        assert_eq!(state.record_failure(), 1);
        assert!(state.within_threshold());
        assert_eq!(state.record_failure(), 2);
        assert!(state.within_threshold());
        assert_eq!(state.record_failure(), 3);
        assert!(!state.within_threshold());
    }

    #[test]
    fn test_success_resets_and_reports_previous() {
        let mut state = RetryState::new(10);
        assert_eq!(state.record_success(), None);

        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures(), 2);

        assert_eq!(state.record_success(), Some(2));
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.within_threshold());
        assert_eq!(state.record_success(), None);
    }

    #[test]
    fn test_duplicate_messages_suppressed() {
        let mut state = RetryState::default();

        assert!(state.should_log("timeout"));
        assert!(!state.should_log("timeout"));
        assert!(state.should_log("connection refused"));
        assert!(state.should_log("timeout"));
    }

    #[test]
    fn test_success_clears_last_message() {
        let mut state = RetryState::default();
        assert!(state.should_log("timeout"));

        state.record_success();
        assert!(state.should_log("timeout"));
    }

    #[test]
    fn test_failure_count_saturates() {
        let mut state = RetryState::new(u32::MAX);
        state.consecutive_failures = u32::MAX - 1;

        assert_eq!(state.record_failure(), u32::MAX);
        assert_eq!(state.record_failure(), u32::MAX);
    }
}
