pub mod interval;
pub mod refresh;
pub mod status;

use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use zbus::zvariant::{DynamicType, Type};

/// Calls `method` on the running daemon's D-Bus service.
pub async fn call_daemon<B, R>(method: &str, body: &B) -> Result<R>
where
    B: Serialize + DynamicType,
    R: DeserializeOwned + Type,
{
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to session D-Bus")?;

    connection
        .call_method(Some(DBUS_NAME), DBUS_PATH, Some(DBUS_NAME), method, body)
        .await
        .with_context(|| format!("Failed to call {} - is the daemon running?", method))?
        .body()
        .deserialize()
        .context("Failed to deserialize response")
}
