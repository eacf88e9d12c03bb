use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors raised by quota collaborators.
///
/// The pipeline never creates these itself; it only forwards whatever the
/// resolver, engine or handler returned.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Policy resolution failed: {0}")]
    Policy(String),

    #[error("Identifier resolution failed: {0}")]
    Identifier(String),

    #[error("Quota engine unavailable: {0}")]
    Engine(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, QuotaError>;

impl QuotaError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QuotaError::Policy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuotaError::Identifier(_) => StatusCode::BAD_REQUEST,
            QuotaError::Engine(_) | QuotaError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            QuotaError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuotaError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuotaError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<validator::ValidationErrors> for QuotaError {
    fn from(err: validator::ValidationErrors) -> Self {
        QuotaError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &QuotaError) -> Self {
        let code = err.status_code().as_u16();
        let error = match err {
            QuotaError::Policy(_) => "policy_error",
            QuotaError::Identifier(_) => "bad_request",
            QuotaError::Engine(_) | QuotaError::Redis(_) => "service_unavailable",
            QuotaError::Handler(_) => "internal_error",
            QuotaError::Configuration(_) => "configuration_error",
            QuotaError::Validation(_) => "validation_error",
        };
        Self::new(error, &err.to_string(), code)
    }
}

impl IntoResponse for QuotaError {
    fn into_response(self) -> Response {
        tracing::error!(target: "quota_gate::error", error = %self, "Request failed");
        (self.status_code(), Json(ErrorResponse::from_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failures_map_to_service_unavailable() {
        let err = QuotaError::Engine("connection refused".to_string());
        let body = ErrorResponse::from_error(&err);
        assert_eq!(body.code, 503);
        assert_eq!(body.error, "service_unavailable");
        assert!(body.message.contains("connection refused"));
    }

    #[test]
    fn test_identifier_failures_are_client_errors() {
        let err = QuotaError::Identifier("missing x-api-key header".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_into_response_uses_error_status() {
        let response = QuotaError::Validation("limit must be positive".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
