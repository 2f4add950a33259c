use crate::cli::call_daemon;
use crate::core::settings::{PollingSettings, Settings};
use anyhow::Result;

pub async fn set(key: &str, seconds: Option<u64>) -> Result<()> {
    let seconds = match seconds {
        Some(seconds) => seconds,
        None => fast_interval_secs(&Settings::load()?.polling),
    };

    let effective: u64 = call_daemon("RequestInterval", &(key, seconds)).await?;
    println!(
        "Interval for {} set to {}s (polling every {}s)",
        key, seconds, effective
    );
    Ok(())
}

pub async fn reset(key: &str) -> Result<()> {
    let effective: u64 = call_daemon("ReleaseInterval", &(key,)).await?;
    println!("Interval for {} released (polling every {}s)", key, effective);
    Ok(())
}

/// Control commands (climate, charging switch) poll at the fast interval.
fn fast_interval_secs(polling: &PollingSettings) -> u64 {
    polling.fast_interval.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request_uses_fast_interval() {
        let polling = PollingSettings {
            fast_interval: 7,
            ..PollingSettings::default()
        };
        assert_eq!(fast_interval_secs(&polling), 7);
        assert_eq!(fast_interval_secs(&PollingSettings::default()), 5);
    }
}
