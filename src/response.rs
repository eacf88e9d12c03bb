use crate::error::Result;
use crate::identifier::client_ip;
use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Produces the response for requests that exceeded their quota.
///
/// Whatever status the handler sets is replaced with 429 by the pipeline.
#[async_trait]
pub trait LimitExceededHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Result<Response>;
}

#[derive(Debug, Serialize)]
pub struct LimitExceededBody {
    pub error: String,
    pub message: String,
    pub path: String,
}

/// Default handler answering with a JSON error body.
#[derive(Debug, Clone)]
pub struct JsonLimitExceeded {
    message: String,
}

impl JsonLimitExceeded {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for JsonLimitExceeded {
    fn default() -> Self {
        Self::new("Request rate limit exceeded")
    }
}

#[async_trait]
impl LimitExceededHandler for JsonLimitExceeded {
    async fn handle(&self, request: Request) -> Result<Response> {
        tracing::debug!(
            target: "quota_gate::response",
            client_ip = %client_ip(&request),
            path = request.uri().path(),
            "Rendering limit exceeded response"
        );

        let body = LimitExceededBody {
            error: "rate_limit_exceeded".to_string(),
            message: self.message.clone(),
            path: request.uri().path().to_string(),
        };
        Ok((StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response())
    }
}
