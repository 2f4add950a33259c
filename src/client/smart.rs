use crate::client::{FetchError, VehicleClient};
use crate::core::models::{Battery, Climate, Position, Vehicle, VehicleCollection};
use crate::core::settings::AccountSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const LOGIN_PATH: &str = "/auth/account/session";
const VEHICLES_PATH: &str = "/remote-control/vehicle/status";
const USER_AGENT: &str = concat!("vehicle-poller/", env!("CARGO_PKG_VERSION"));

const SUCCESS_CODE: &str = "1000";
const AUTH_CODES: [&str; 2] = ["1401", "1402"];
const REMOTE_SERVICE_PREFIX: char = '8';

/// `data` stays untyped until `code` says the call succeeded; error replies
/// carry arbitrary payloads there.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct VehiclesData {
    vehicles: Vec<WireVehicle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVehicle {
    vin: String,
    model_name: Option<String>,
    battery: Option<WireBattery>,
    engine_state: Option<String>,
    position: Option<WirePosition>,
    climate: Option<WireClimate>,
    /// Milliseconds since the epoch.
    update_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBattery {
    remaining_percent: Option<f64>,
    range_km: Option<f64>,
    charging_status: Option<String>,
    charging_current: Option<f64>,
    charging_power: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireClimate {
    pre_climate_active: bool,
    interior_temperature: Option<f64>,
}

impl From<WireVehicle> for Vehicle {
    fn from(wire: WireVehicle) -> Self {
        let updated_at = wire
            .update_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Vehicle {
            vin: wire.vin,
            model: wire.model_name,
            battery: wire.battery.map(|b| Battery {
                remaining_percent: b.remaining_percent,
                range_km: b.range_km,
                charging_status: b.charging_status,
                charging_current: b.charging_current,
                charging_power: b.charging_power,
            }),
            engine_state: wire.engine_state,
            position: wire.position.map(|p| Position {
                latitude: p.latitude,
                longitude: p.longitude,
            }),
            climate: wire.climate.map(|c| Climate {
                pre_climate_active: c.pre_climate_active,
                interior_temperature: c.interior_temperature,
            }),
            updated_at,
        }
    }
}

/// Cloud client for the vehicle manufacturer's remote-control API.
pub struct SmartClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    vin: Option<String>,
    token: Mutex<Option<String>>,
}

impl SmartClient {
    pub fn new(account: &AccountSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: account.base_url().trim_end_matches('/').to_string(),
            username: account.username.clone(),
            password: account.password.clone(),
            vin: account.vin.clone(),
            token: Mutex::new(None),
        })
    }

    async fn login(&self) -> Result<String, FetchError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(FetchError::Auth("no credentials configured".to_string()));
        }

        tracing::debug!(base_url = %self.base_url, "Logging in");
        let response = self
            .http
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let login: LoginData = read_envelope(response).await?;
        Ok(login.access_token)
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = self.login().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }

    async fn request_vehicles(&self, token: &str) -> Result<Vec<WireVehicle>, FetchError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, VEHICLES_PATH))
            .bearer_auth(token)
            .send()
            .await?;

        let data: VehiclesData = read_envelope(response).await?;
        Ok(data.vehicles)
    }
}

#[async_trait]
impl VehicleClient for SmartClient {
    fn name(&self) -> &'static str {
        "Smart"
    }

    async fn fetch_vehicles(&self) -> Result<VehicleCollection, FetchError> {
        let token = self.access_token().await?;

        let vehicles = match self.request_vehicles(&token).await {
            Err(FetchError::Auth(reason)) => {
                tracing::debug!(%reason, "Session rejected, logging in again");
                self.invalidate_token().await;
                let token = self.access_token().await?;
                self.request_vehicles(&token).await?
            }
            other => other?,
        };

        Ok(VehicleCollection::new(
            vehicles
                .into_iter()
                .filter(|v| self.vin.as_deref().map_or(true, |vin| v.vin == vin))
                .map(Vehicle::from),
        ))
    }
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Auth(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response.text().await?;
    parse_envelope(&body)
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let code = match &envelope.code {
        serde_json::Value::String(code) => code.clone(),
        other => other.to_string(),
    };
    let message = envelope.message.unwrap_or_default();

    if AUTH_CODES.contains(&code.as_str()) {
        return Err(FetchError::Auth(message));
    }
    if code.starts_with(REMOTE_SERVICE_PREFIX) {
        return Err(FetchError::RemoteService(format!("{}: {}", code, message)));
    }
    if code != SUCCESS_CODE {
        return Err(FetchError::api(code, message));
    }

    let data = envelope
        .data
        .filter(|data| !data.is_null())
        .ok_or_else(|| FetchError::Decode("response has no data".to_string()))?;
    serde_json::from_value(data).map_err(|e| FetchError::Decode(e.to_string()))
}
