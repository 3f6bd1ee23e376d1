//! Relay errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use vtalk_core::VtalkError;

/// Upstream service names used in errors and logs
pub const TTS_SERVICE: &str = "tts";
pub const CHAT_SERVICE: &str = "chat";

/// Errors returned by relay handlers
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Upstream {service} failed: {message}")]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Upstream {service} timed out")]
    Timeout { service: &'static str },

    #[error("Upstream {service} returned an unusable response: {message}")]
    BadUpstreamResponse {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Core(#[from] VtalkError),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Classify a transport-level failure talking to `service`
    pub fn upstream(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return RelayError::Timeout { service };
        }
        RelayError::Upstream {
            service,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// HTTP status reported to the client
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream { .. } | RelayError::BadUpstreamResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Core(err) => match err {
                VtalkError::InvalidFrameRate(_) => StatusCode::BAD_REQUEST,
                // Synthesized audio the engine sent back
                VtalkError::AudioDecode(_) | VtalkError::UnsupportedAudio(_) => {
                    StatusCode::BAD_GATEWAY
                }
                VtalkError::NoActiveSession
                | VtalkError::FrameLoop(_)
                | VtalkError::Config(_)
                | VtalkError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "relay request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "relay request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
