//! Redis-backed token buckets for multi-instance deployments.
//!
//! Runs the same refill-then-consume protocol as the in-memory limiter, but
//! as a single Lua script per check, so the read-modify-write is atomic on
//! the Redis side and every server instance shares one bucket per key.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use forno_core::ports::{RateLimitDecision, RateLimitError, RateLimitKey, RateLimiter};

use super::config::RateLimitSettings;

/// Redis rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Key prefix for bucket hashes.
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisRateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Shared token-bucket limiter backed by Redis.
pub struct RedisTokenBucketLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    settings: RateLimitSettings,
    /// Lua script running the atomic refill-then-consume step.
    script: Script,
}

impl RedisTokenBucketLimiter {
    pub async fn new(
        config: RedisRateLimitConfig,
        settings: RateLimitSettings,
    ) -> Result<Self, RateLimitError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| RateLimitError::Backend("Connection timed out".to_string()))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Bucket state is a hash {tokens, ts}; the script refills from the
        // elapsed server time, consumes one token if available, and reports
        // [allowed, remaining, retry_after_secs].
        let script = Script::new(
            r#"
            redis.replicate_commands()
            local key = KEYS[1]
            local capacity = tonumber(ARGV[1])
            local rate = tonumber(ARGV[2])
            local ttl = tonumber(ARGV[3])

            local t = redis.call('TIME')
            local now = tonumber(t[1]) + tonumber(t[2]) / 1000000

            local state = redis.call('HMGET', key, 'tokens', 'ts')
            local tokens = tonumber(state[1])
            local ts = tonumber(state[2])
            if tokens == nil then
                tokens = capacity
                ts = now
            end

            tokens = math.min(capacity, tokens + (now - ts) * rate)

            local allowed = 0
            local retry = 0
            if tokens >= 1 then
                tokens = tokens - 1
                allowed = 1
            elseif rate > 0 then
                retry = math.ceil((1 - tokens) / rate)
            else
                retry = ttl
            end

            redis.call('HMSET', key, 'tokens', tokens, 'ts', now)
            redis.call('EXPIRE', key, ttl)
            return {allowed, math.floor(tokens), retry}
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            settings,
            script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RedisRateLimitConfig::from_env(), RateLimitSettings::from_env()).await
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    fn make_key(&self, key: &RateLimitKey, prefix: &str) -> String {
        if prefix.is_empty() {
            format!("{}:{}", self.config.key_prefix, key)
        } else {
            format!("{}:{}|{}", self.config.key_prefix, key, prefix)
        }
    }
}

#[async_trait]
impl RateLimiter for RedisTokenBucketLimiter {
    async fn check(
        &self,
        key: &RateLimitKey,
        path: &str,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let (prefix, bucket) = self.settings.resolve(path);
        let redis_key = self.make_key(key, prefix);
        let mut conn = self.conn.clone();

        // Idle buckets expire after several refill periods to bound memory.
        let ttl = (bucket.refill_period.as_secs() * self.settings.idle_multiple.max(1) as u64)
            .max(1);

        let result: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(bucket.capacity)
            .arg(bucket.refill_rate())
            .arg(ttl)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let allowed = result.first().copied().unwrap_or(0) == 1;
        let remaining = result.get(1).copied().unwrap_or(0).max(0) as u32;
        let retry_secs = result.get(2).copied().unwrap_or(0).max(0) as u64;

        Ok(RateLimitDecision {
            allowed,
            remaining,
            retry_after: Duration::from_secs(retry_secs),
        })
    }
}
