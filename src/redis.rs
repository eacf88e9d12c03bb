use crate::engine::{effective_window, window_key, QuotaEngine};
use crate::error::{QuotaError, Result};
use crate::identifier::Identifier;
use crate::policy::QuotaPolicy;
use crate::status::Status;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use std::time::{Duration, SystemTime};

// Increments the window counter, starting the expiry on the first hit, and
// returns the new count with the remaining TTL in milliseconds.
const FIXED_WINDOW_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {current, ttl}
"#;

/// Fixed-window quota engine backed by Redis.
///
/// The count-and-expire step runs as one Lua script, so concurrent checks
/// from any number of processes are serialized by Redis.
#[derive(Clone)]
pub struct RedisEngine {
    connection: MultiplexedConnection,
    script: Script,
    prefix: String,
}

impl RedisEngine {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| QuotaError::Configuration(format!("Failed to create Redis client: {}", e)))?;
        let connection = client.get_multiplexed_async_connection().await?;

        tracing::info!(target: "quota_gate::redis", "Connected to Redis");

        Ok(Self {
            connection,
            script: Script::new(FIXED_WINDOW_SCRIPT),
            prefix: "quota".to_string(),
        })
    }

    /// Namespace all keys written by this engine.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Round-trip a PING to confirm the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn key(&self, identifier: &Identifier, policy: &QuotaPolicy) -> String {
        format!("{}:{}", self.prefix, window_key(identifier, policy))
    }
}

#[async_trait]
impl QuotaEngine for RedisEngine {
    async fn check(&self, identifier: &Identifier, policy: &QuotaPolicy) -> Result<Status> {
        let out_of_range = || {
            QuotaError::Validation(format!(
                "Quota window of {:?} is out of range",
                policy.window()
            ))
        };
        let window_ms = u64::try_from(effective_window(policy).as_millis()).map_err(|_| out_of_range())?;
        let mut conn = self.connection.clone();

        let (current, ttl_ms): (u64, i64) = self
            .script
            .key(self.key(identifier, policy))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        let reset_at = SystemTime::now()
            .checked_add(Duration::from_millis(ttl_ms.max(0) as u64))
            .ok_or_else(out_of_range)?;
        Ok(Status::from_usage(policy.limit(), current, reset_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_redis_engine_counts_and_exceeds() {
        let engine = RedisEngine::connect(REDIS_URL)
            .await
            .unwrap()
            .with_prefix(format!("quota-test-{}", std::process::id()));
        let policy = QuotaPolicy::per_minute(2);
        let caller = Identifier::new("ip:10.0.0.1").unwrap();

        let first = engine.check(&caller, &policy).await.unwrap();
        assert_eq!(first.remaining_attempts(), 1);
        assert!(!first.quota_exceeded());

        engine.check(&caller, &policy).await.unwrap();
        let third = engine.check(&caller, &policy).await.unwrap();
        assert!(third.quota_exceeded());
        assert!(third.reset_at() > SystemTime::now());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_redis_engine_ping() {
        let engine = RedisEngine::connect(REDIS_URL).await.unwrap();
        engine.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisEngine::connect("not-a-url").await;
        assert!(matches!(result, Err(QuotaError::Configuration(_))));
    }
}
