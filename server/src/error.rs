use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use ryft_claims::ClaimError;
use serde_json::json;

/// Unified error type that renders as a JSON `{"error": "..."}` response
/// with an appropriate HTTP status code.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ClaimError> for AppError {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::NotFound(msg) => AppError::not_found(format!("{} not found", msg)),
            ClaimError::AlreadyProcessed(msg)
            | ClaimError::InvalidArgument(msg) => AppError::bad_request(msg),
            ClaimError::EmailMismatch => AppError::bad_request(e.to_string()),
            ClaimError::ServiceUnavailable(msg) => AppError::bad_gateway(msg),
            ClaimError::Upstream(_) | ClaimError::Http(_) => {
                tracing::warn!(error = %e, "upstream failure");
                AppError::bad_gateway("Upstream service unavailable")
            }
            ClaimError::Config(_) | ClaimError::Json(_) => {
                tracing::error!(error = %e, "internal failure");
                AppError::internal("Internal server error")
            }
        }
    }
}
