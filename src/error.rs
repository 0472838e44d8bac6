// Error taxonomy for the gateway and for single downstream calls

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

// Outcome of one outbound call that did not succeed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("bad response: {status} - {message}")]
    BadResponse { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }

    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(timeout)
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::BadResponse {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            // connect refused, reset, dns: the peer is not answering at all
            UpstreamError::Unavailable(err.to_string())
        }
    }
}

// Errors surfaced by the purchase flow
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{service} timed out after {}ms", .after.as_millis())]
    UpstreamTimeout {
        service: &'static str,
        after: Duration,
    },

    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} returned a bad response: {message}")]
    UpstreamBadResponse {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("no fallback available: {0}")]
    ExhaustedFallback(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn upstream(service: &'static str, err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(after) => GatewayError::UpstreamTimeout { service, after },
            UpstreamError::Unavailable(reason) => {
                GatewayError::UpstreamUnavailable { service, reason }
            }
            UpstreamError::BadResponse { status, message } => GatewayError::UpstreamBadResponse {
                service,
                status: Some(status),
                message,
            },
            UpstreamError::Decode(message) => GatewayError::UpstreamBadResponse {
                service,
                status: None,
                message,
            },
        }
    }

    // Lookup failures are never a gateway timeout; only the sale call gets 504
    pub fn lookup(service: &'static str, err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(after) => GatewayError::UpstreamUnavailable {
                service,
                reason: format!("no answer within {}ms", after.as_millis()),
            },
            other => GatewayError::upstream(service, other),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnavailable { .. }
            | GatewayError::UpstreamBadResponse { .. }
            | GatewayError::ExhaustedFallback(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Message safe to hand back to the caller
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "internal error while processing the purchase".to_string(),
            GatewayError::UpstreamTimeout { service, .. } => {
                format!("{service} did not answer in time, the purchase was not completed")
            }
            GatewayError::UpstreamUnavailable { service, .. } => {
                format!("{service} is unavailable, the purchase was not completed")
            }
            GatewayError::UpstreamBadResponse { service, .. } => {
                format!("{service} rejected the request, the purchase was not completed")
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "purchase failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "purchase rejected");
        }

        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
