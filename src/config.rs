use crate::error::{QuotaError, Result};
use crate::identifier::KeyStrategy;
use crate::policy::{QuotaPolicy, RoutePolicies, MAX_WINDOW};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which request attribute identifies the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdentifyBy {
    Ip,
    ApiKey,
    User,
}

impl From<IdentifyBy> for KeyStrategy {
    fn from(value: IdentifyBy) -> Self {
        match value {
            IdentifyBy::Ip => KeyStrategy::IpAddress,
            IdentifyBy::ApiKey => KeyStrategy::ApiKey,
            IdentifyBy::User => KeyStrategy::UserId,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "quota-gate", version, about = "Per-identifier request quota gateway")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; the in-memory engine is used when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Log level for the quota_gate target
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// JSON file with route quota rules
    #[arg(long, env = "POLICY_FILE")]
    pub policy_file: Option<PathBuf>,

    /// Requests allowed per window on /api routes when no policy file is given
    #[arg(long, env = "DEFAULT_LIMIT", default_value_t = 100)]
    pub default_limit: u64,

    /// Window for the default policy, e.g. "60s" or "1h"
    #[arg(long, env = "DEFAULT_WINDOW", default_value = "60s", value_parser = humantime::parse_duration)]
    pub default_window: Duration,

    /// Caller identification strategy
    #[arg(long, env = "IDENTIFY_BY", value_enum, default_value_t = IdentifyBy::Ip)]
    pub identify_by: IdentifyBy,

    /// Interval between purges of expired in-memory windows
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    pub cleanup_interval: Duration,
}

impl Config {
    /// Load configuration from the command line and environment
    pub fn from_env() -> Self {
        Config::parse()
    }

    /// Build the route table, from the policy file when one is configured.
    pub fn route_policies(&self) -> Result<RoutePolicies> {
        match &self.policy_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    QuotaError::Configuration(format!(
                        "Failed to read policy file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                RoutePolicies::from_json(&contents)
            }
            None => {
                if self.default_limit == 0 {
                    return Err(QuotaError::Validation(
                        "Default limit must be greater than 0".to_string(),
                    ));
                }
                if self.default_window.is_zero() || self.default_window > MAX_WINDOW {
                    return Err(QuotaError::Validation(format!(
                        "Default window must be between 1ms and {:?}",
                        MAX_WINDOW
                    )));
                }
                RoutePolicies::new().route(
                    "^/api/",
                    QuotaPolicy::custom(self.default_limit, self.default_window),
                )
            }
        }
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.identify_by.into()
    }
}
