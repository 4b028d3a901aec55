// Error handling module
// Defines the gateway error taxonomy and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while serving a request
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Authentication failed: bad credentials or exhausted refresh fallback
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// HTTP-level failure from the fleet API (non-2xx status)
    #[error("Upstream API error: {status} - {message}")]
    Upstream { status: u16, message: String },

    /// Application-level error embedded in a successful HTTP response.
    /// The fleet APIs can return 200 with an `error`/`errors` field in
    /// the body; this is distinct from an HTTP-level failure.
    #[error("Fleet API error: {0}")]
    Api(String),

    /// Request validation error (malformed caller input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            GatewayError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            GatewayError::Upstream { status, message } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status_code, message)
            }
            GatewayError::Api(msg) => (StatusCode::BAD_GATEWAY, msg),
            GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            GatewayError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
