use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not eligible: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "SUBSCRIPTION_NOT_ELIGIBLE"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
            ApiError::MalformedResponse(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_RESPONSE")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Generic message used when debug detail is disabled. Raw detail can
    /// carry upstream bodies or operator mistakes (key paths), so it is
    /// gated behind the debug flag instead of being returned by default.
    fn public_message(&self) -> &'static str {
        match self {
            ApiError::Database(_) => "An internal database error occurred",
            ApiError::Configuration(_) => "Service is misconfigured",
            ApiError::Validation(_) => "Invalid request",
            ApiError::Unauthorized(_) => "Authentication required",
            ApiError::Forbidden(_) => "User is not eligible for subscriptions",
            ApiError::NotFound(_) => "Resource not found",
            ApiError::Upstream(_) => "Subscription provider is unavailable",
            ApiError::MalformedResponse(_) => "Subscription provider returned an invalid response",
            ApiError::Internal(_) => "An internal error occurred",
        }
    }

    /// Render with or without raw detail. Routed through a response
    /// extension so `IntoResponse` (which has no access to state) stays
    /// usable in extractors and middleware.
    pub fn into_response_with_debug(self, debug_errors: bool) -> Response {
        let (status, code) = self.status_and_code();

        match &self {
            ApiError::Database(e) => tracing::error!("Database error: {:?}", e),
            ApiError::Configuration(msg) => tracing::error!("Configuration error: {}", msg),
            ApiError::Upstream(msg) => tracing::error!("Upstream error: {}", msg),
            ApiError::MalformedResponse(msg) => {
                // Alert-worthy: indicates upstream contract drift.
                tracing::error!("Malformed upstream response: {}", msg)
            }
            ApiError::Internal(e) => tracing::error!("Internal error: {:?}", e),
            _ => {}
        }

        let message = if debug_errors {
            self.to_string()
        } else {
            self.public_message().to_string()
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Safe default path (no debug detail) for middleware and extractors.
        self.into_response_with_debug(false)
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
