//! Quota policies and the resolvers that select them per request.

use crate::error::{QuotaError, Result};
use axum::extract::Request;
use axum::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Maximum number of operations permitted within a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotaPolicy {
    limit: u64,
    window: Duration,
}

impl QuotaPolicy {
    pub fn custom(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn per_second(limit: u64) -> Self {
        Self::custom(limit, Duration::from_secs(1))
    }

    pub fn per_minute(limit: u64) -> Self {
        Self::custom(limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u64) -> Self {
        Self::custom(limit, Duration::from_secs(3600))
    }

    pub fn per_day(limit: u64) -> Self {
        Self::custom(limit, Duration::from_secs(86400))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Selects the quota policy that applies to a request.
///
/// Returning `Ok(None)` marks the request as unmetered. Implementations must
/// be side-effect free.
pub trait QuotaPolicyResolver: Send + Sync {
    fn for_request(&self, request: &Request) -> Result<Option<QuotaPolicy>>;
}

impl<F> QuotaPolicyResolver for F
where
    F: Fn(&Request) -> Result<Option<QuotaPolicy>> + Send + Sync,
{
    fn for_request(&self, request: &Request) -> Result<Option<QuotaPolicy>> {
        self(request)
    }
}

/// Applies the same policy to every request.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub QuotaPolicy);

impl QuotaPolicyResolver for FixedPolicy {
    fn for_request(&self, _request: &Request) -> Result<Option<QuotaPolicy>> {
        Ok(Some(self.0))
    }
}

/// A single route rule as written in a policy file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RoutePolicy {
    /// Regular expression matched against the request path
    #[validate(length(min = 1))]
    pub pattern: String,

    /// HTTP methods the rule applies to; empty means all methods
    #[serde(default)]
    pub methods: Vec<String>,

    #[validate(range(min = 1))]
    pub limit: u64,

    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_window"))]
    pub window: Duration,
}

/// Longest window a route rule may declare.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 86400);

fn validate_window(window: &Duration) -> std::result::Result<(), ValidationError> {
    if window.is_zero() {
        return Err(ValidationError::new("window_must_be_positive"));
    }
    if *window > MAX_WINDOW {
        return Err(ValidationError::new("window_too_long"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    pattern: Regex,
    methods: Vec<Method>,
    policy: QuotaPolicy,
}

impl CompiledRoute {
    fn matches(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.pattern.is_match(path)
    }
}

/// Ordered route table. The first matching rule wins; requests matching no
/// rule are unmetered.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicies {
    routes: Vec<CompiledRoute>,
}

impl RoutePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and validate a list of route rules.
    pub fn from_rules(rules: Vec<RoutePolicy>) -> Result<Self> {
        let mut policies = Self::new();
        for rule in rules {
            rule.validate()?;
            let methods = rule
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_uppercase().as_bytes())
                        .map_err(|_| QuotaError::Validation(format!("Invalid HTTP method '{}'", m)))
                })
                .collect::<Result<Vec<_>>>()?;
            policies = policies.route_with_methods(
                &rule.pattern,
                methods,
                QuotaPolicy::custom(rule.limit, rule.window),
            )?;
        }
        Ok(policies)
    }

    /// Parse a JSON array of route rules.
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<RoutePolicy> = serde_json::from_str(json)
            .map_err(|e| QuotaError::Configuration(format!("Invalid policy file: {}", e)))?;
        Self::from_rules(rules)
    }

    /// Add a rule matching every method.
    pub fn route(self, pattern: &str, policy: QuotaPolicy) -> Result<Self> {
        self.route_with_methods(pattern, Vec::new(), policy)
    }

    pub fn route_with_methods(
        mut self,
        pattern: &str,
        methods: Vec<Method>,
        policy: QuotaPolicy,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| QuotaError::Validation(format!("Invalid route pattern '{}': {}", pattern, e)))?;
        self.routes.push(CompiledRoute {
            pattern,
            methods,
            policy,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl QuotaPolicyResolver for RoutePolicies {
    fn for_request(&self, request: &Request) -> Result<Option<QuotaPolicy>> {
        let path = request.uri().path();
        Ok(self
            .routes
            .iter()
            .find(|route| route.matches(request.method(), path))
            .map(|route| route.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(method: Method, path: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_policy_constructors() {
        assert_eq!(QuotaPolicy::per_second(5).window(), Duration::from_secs(1));
        assert_eq!(QuotaPolicy::per_minute(10).window(), Duration::from_secs(60));
        assert_eq!(QuotaPolicy::per_hour(10).window(), Duration::from_secs(3600));
        assert_eq!(QuotaPolicy::per_day(10).limit(), 10);
    }

    #[test]
    fn test_fixed_policy_meters_everything() {
        let resolver = FixedPolicy(QuotaPolicy::per_minute(10));
        let policy = resolver.for_request(&request(Method::GET, "/anything")).unwrap();
        assert_eq!(policy, Some(QuotaPolicy::per_minute(10)));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |req: &Request| -> Result<Option<QuotaPolicy>> {
            Ok(req.uri().path().starts_with("/api").then(|| QuotaPolicy::per_second(1)))
        };
        assert!(resolver.for_request(&request(Method::GET, "/api/x")).unwrap().is_some());
        assert!(resolver.for_request(&request(Method::GET, "/health")).unwrap().is_none());
    }

    #[test]
    fn test_route_policies_first_match_wins() {
        let policies = RoutePolicies::new()
            .route("^/api/login", QuotaPolicy::per_minute(5))
            .unwrap()
            .route("^/api/", QuotaPolicy::per_minute(100))
            .unwrap();

        let login = policies.for_request(&request(Method::POST, "/api/login")).unwrap();
        assert_eq!(login, Some(QuotaPolicy::per_minute(5)));

        let other = policies.for_request(&request(Method::GET, "/api/items")).unwrap();
        assert_eq!(other, Some(QuotaPolicy::per_minute(100)));

        let unmetered = policies.for_request(&request(Method::GET, "/health")).unwrap();
        assert_eq!(unmetered, None);
    }

    #[test]
    fn test_route_policies_method_filter() {
        let policies = RoutePolicies::new()
            .route_with_methods("^/api/", vec![Method::POST], QuotaPolicy::per_minute(3))
            .unwrap();

        assert!(policies.for_request(&request(Method::POST, "/api/items")).unwrap().is_some());
        assert!(policies.for_request(&request(Method::GET, "/api/items")).unwrap().is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"pattern": "^/api/login", "methods": ["post"], "limit": 5, "window": "1m"},
            {"pattern": "^/api/", "limit": 100, "window": "1h"}
        ]"#;
        let policies = RoutePolicies::from_json(json).unwrap();
        assert_eq!(policies.len(), 2);

        let login = policies.for_request(&request(Method::POST, "/api/login")).unwrap();
        assert_eq!(login, Some(QuotaPolicy::custom(5, Duration::from_secs(60))));
    }

    #[test]
    fn test_from_json_rejects_invalid_rules() {
        let zero_limit = r#"[{"pattern": "^/api/", "limit": 0, "window": "1m"}]"#;
        assert!(matches!(
            RoutePolicies::from_json(zero_limit),
            Err(QuotaError::Validation(_))
        ));

        let zero_window = r#"[{"pattern": "^/api/", "limit": 1, "window": "0s"}]"#;
        assert!(RoutePolicies::from_json(zero_window).is_err());

        let huge_window = r#"[{"pattern": "^/api/", "limit": 1, "window": "400days"}]"#;
        assert!(matches!(
            RoutePolicies::from_json(huge_window),
            Err(QuotaError::Validation(_))
        ));

        let bad_regex = r#"[{"pattern": "(", "limit": 1, "window": "1s"}]"#;
        assert!(RoutePolicies::from_json(bad_regex).is_err());

        assert!(matches!(
            RoutePolicies::from_json("not json"),
            Err(QuotaError::Configuration(_))
        ));
    }
}
