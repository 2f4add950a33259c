use std::time::Duration;
use thiserror::Error;

/// How a fetch failure is treated by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Auth,
    RemoteService,
    Transient,
    Unexpected,
}

/// Errors raised by a [`VehicleClient`](super::VehicleClient) fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Credentials rejected or session no longer valid
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider-side structural failure
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// Informational error code returned inside a successful HTTP response
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl FetchError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Auth(_) => FailureClass::Auth,
            Self::RemoteService(_) => FailureClass::RemoteService,
            Self::Api { .. } | Self::Timeout(_) | Self::Status(_) => FailureClass::Transient,
            Self::Http(e) if e.is_decode() || e.is_builder() => FailureClass::Unexpected,
            Self::Http(_) => FailureClass::Transient,
            Self::Decode(_) | Self::Unexpected(_) => FailureClass::Unexpected,
        }
    }
}
