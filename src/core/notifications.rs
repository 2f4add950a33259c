use anyhow::Result;
use notify_rust::Notification;

pub fn send_reauth_notification(reason: &str) -> Result<()> {
    Notification::new()
        .summary("Vehicle login required")
        .body(&format!(
            "Vehicle data is unavailable: {}. Update the credentials in your vehicle-poller config.",
            reason
        ))
        .appname("vehicle-poller")
        .timeout(notify_rust::Timeout::Milliseconds(10000))
        .show()?;

    tracing::info!("Sent re-authentication notification");

    Ok(())
}
