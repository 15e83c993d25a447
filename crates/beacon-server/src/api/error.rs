//! API error types and response handling.
//!
//! Handlers return [`ApiError`], which renders as a JSON [`ErrorResponse`]
//! with the matching HTTP status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beacon_core::ParseAddressError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "invalid_bluetooth_address",
    "message": "invalid Bluetooth address 'nope', expected format AA:BB:CC:DD:EE:FF"
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "invalid_bluetooth_address")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "invalid Bluetooth address 'nope', expected format AA:BB:CC:DD:EE:FF")]
    pub message: String,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (Self::BadRequest { error_code, message } | Self::NotFound { error_code, message }) =
            self;
        tracing::debug!(status = status.as_u16(), error_code = %error_code, "Request rejected");

        (
            status,
            Json(ErrorResponse {
                error: error_code,
                message,
            }),
        )
            .into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ParseAddressError> for ApiError {
    fn from(err: ParseAddressError) -> Self {
        Self::BadRequest {
            error_code: "invalid_bluetooth_address".to_string(),
            message: err.to_string(),
        }
    }
}
