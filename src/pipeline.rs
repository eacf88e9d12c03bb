//! Per-request quota decision pipeline.
//!
//! ```text
//! START -> policy? -- no  --> forward unmetered ------------------> DONE
//!                  \- yes --> check quota -> exceeded? -- yes -> deny (429) -> DONE
//!                                                     \- no  -> forward     -> DONE
//! ```

use crate::engine::QuotaEngine;
use crate::error::Result;
use crate::identifier::IdentifierResolver;
use crate::policy::QuotaPolicyResolver;
use crate::response::LimitExceededHandler;
use crate::status::Status;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Orchestrates policy selection, identity resolution and the quota check
/// for each request.
///
/// Holds only shared, immutable collaborators, so one pipeline can serve any
/// number of concurrent requests.
#[derive(Clone)]
pub struct RateLimitPipeline {
    engine: Arc<dyn QuotaEngine>,
    policies: Arc<dyn QuotaPolicyResolver>,
    identifiers: Arc<dyn IdentifierResolver>,
    exceeded: Arc<dyn LimitExceededHandler>,
}

impl RateLimitPipeline {
    pub fn new(
        engine: impl QuotaEngine + 'static,
        policies: impl QuotaPolicyResolver + 'static,
        identifiers: impl IdentifierResolver + 'static,
        exceeded: impl LimitExceededHandler + 'static,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            policies: Arc::new(policies),
            identifiers: Arc::new(identifiers),
            exceeded: Arc::new(exceeded),
        }
    }

    /// Run the quota decision for `request`, forwarding to `downstream` when
    /// the request is unmetered or within quota.
    ///
    /// Collaborator errors are returned as-is.
    pub async fn process<F, Fut>(&self, request: Request, downstream: F) -> Result<Response>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let Some(policy) = self.policies.for_request(&request)? else {
            debug!(
                target: "quota_gate::pipeline",
                uri = %request.uri(),
                "Unmetered request"
            );
            return downstream(request).await;
        };

        let identifier = self.identifiers.from_request(&request)?;
        let status = self.engine.check(&identifier, &policy).await?;

        if status.quota_exceeded() {
            warn!(
                target: "quota_gate::pipeline",
                identifier = %identifier,
                quota = status.quota(),
                reset = status.reset_timestamp(),
                "Quota exceeded"
            );
            let response = self.exceeded.handle(request).await?;
            let mut response = decorate(response, &status);
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            return Ok(response);
        }

        debug!(
            target: "quota_gate::pipeline",
            identifier = %identifier,
            quota = status.quota(),
            remaining = status.remaining_attempts(),
            "Quota check passed"
        );
        let response = downstream(request).await?;
        Ok(decorate(response, &status))
    }
}

/// Attach quota headers for `status` to `response`.
///
/// Existing quota headers are replaced, so decorating twice with the same
/// status yields the same headers.
pub fn decorate(mut response: Response, status: &Status) -> Response {
    let headers = response.headers_mut();
    headers.insert(HEADER_LIMIT, HeaderValue::from(status.quota()));
    headers.insert(HEADER_REMAINING, HeaderValue::from(status.remaining_attempts()));
    headers.insert(HEADER_RESET, HeaderValue::from(status.reset_timestamp()));
    response
}
