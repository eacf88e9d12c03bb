use axum::{extract::Request, response::IntoResponse, Json};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::identifier::client_ip;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub client_ip: String,
    pub method: String,
    pub path: String,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Echo back what the service knows about the caller
pub async fn whoami(request: Request) -> impl IntoResponse {
    Json(WhoamiResponse {
        client_ip: client_ip(&request),
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
    })
}
