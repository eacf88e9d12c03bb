use crate::error::QuotaError;
use crate::identifier::client_ip;
use crate::pipeline::RateLimitPipeline;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::info;

/// Quota enforcement middleware, installed with
/// `axum::middleware::from_fn_with_state(pipeline, rate_limit)`.
///
/// Errors from the pipeline are rendered through `QuotaError`'s
/// `IntoResponse` impl.
pub async fn rate_limit(
    State(pipeline): State<RateLimitPipeline>,
    request: Request,
    next: Next,
) -> Result<Response, QuotaError> {
    pipeline
        .process(request, |request| async move { Ok(next.run(request).await) })
        .await
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_ip(&request);

    info!(
        target: "quota_gate::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "quota_gate::middleware",
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}
