//! In-memory keyed token buckets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use forno_core::ports::{RateLimitDecision, RateLimitError, RateLimitKey, RateLimiter};

use super::config::{BucketConfig, RateLimitSettings};

/// Mutable per-key bucket state. Refill and consumption happen under the
/// bucket's own mutex, so no two concurrent checks for the same key can
/// both observe pre-refill state.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    config: BucketConfig,
}

impl Bucket {
    /// New buckets start at full capacity.
    fn new(config: BucketConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity as f64,
            last_refill: now,
            config,
        }
    }

    /// Refill for elapsed time, then try to consume one token.
    fn check(&mut self, now: Instant) -> RateLimitDecision {
        let rate = self.config.refill_rate();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(self.config.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                remaining: self.tokens.floor() as u32,
                retry_after: Duration::ZERO,
            }
        } else {
            let retry_secs = if rate > 0.0 {
                ((1.0 - self.tokens) / rate).ceil()
            } else {
                // Misconfigured bucket (no refill): report the period, or a
                // second at minimum, so clients still get a usable header.
                self.config.refill_period.as_secs_f64().max(1.0)
            };
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after: Duration::from_secs(retry_secs as u64),
            }
        }
    }
}

/// In-memory, per-process token-bucket limiter.
///
/// The map is keyed by caller identity plus the matched endpoint prefix, so
/// an endpoint-specific budget is tracked separately from the default one.
/// Distinct keys only share the map's read lock; the write lock is taken
/// once per key, on first access.
pub struct TokenBucketLimiter {
    settings: RateLimitSettings,
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
}

impl TokenBucketLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(RateLimitSettings::from_env())
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Get or atomically create the bucket for a storage key. Exactly one
    /// bucket ever exists per key: creation is double-checked under the
    /// write lock.
    async fn bucket_for(&self, storage_key: &str, config: BucketConfig) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().await.get(storage_key) {
            return bucket.clone();
        }

        let mut buckets = self.buckets.write().await;
        buckets
            .entry(storage_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(config, Instant::now()))))
            .clone()
    }

    /// The whole check against an explicit clock, for deterministic tests.
    pub(crate) async fn check_at(
        &self,
        key: &RateLimitKey,
        path: &str,
        now: Instant,
    ) -> RateLimitDecision {
        let (prefix, config) = self.settings.resolve(path);
        let storage_key = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{key}|{prefix}")
        };

        let bucket = self.bucket_for(&storage_key, config).await;
        let mut state = bucket.lock().expect("bucket mutex poisoned");
        state.check(now)
    }

    /// Drop buckets idle for longer than `idle_multiple` refill periods.
    ///
    /// A bucket whose mutex is currently held is skipped, and an idle bucket
    /// has refilled back to capacity anyway, so eviction never loses
    /// in-flight consumption. Returns the number of buckets removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_multiple = self.settings.idle_multiple.max(1);
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();

        buckets.retain(|_, bucket| match bucket.try_lock() {
            Ok(state) => {
                let idle_limit = state.config.refill_period * idle_multiple;
                now.saturating_duration_since(state.last_refill) < idle_limit
            }
            Err(_) => true,
        });

        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = buckets.len(), "Swept idle rate-limit buckets");
        }
        removed
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn check(
        &self,
        key: &RateLimitKey,
        path: &str,
    ) -> Result<RateLimitDecision, RateLimitError> {
        Ok(self.check_at(key, path, Instant::now()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn limiter(capacity: u32, refill_tokens: u32, period: Duration) -> TokenBucketLimiter {
        TokenBucketLimiter::new(RateLimitSettings {
            default_bucket: BucketConfig::new(capacity, refill_tokens, period),
            ..RateLimitSettings::default()
        })
    }

    fn ip(addr: &str) -> RateLimitKey {
        RateLimitKey::Ip(addr.to_string())
    }

    #[tokio::test]
    async fn test_burst_then_deny_then_refill() {
        // capacity=2, refill=1 token/second
        let limiter = limiter(2, 1, Duration::from_secs(1));
        let key = ip("10.0.0.1");
        let t0 = Instant::now();

        let first = limiter.check_at(&key, "/api/orders", t0).await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.check_at(&key, "/api/orders", t0).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check_at(&key, "/api/orders", t0).await;
        assert!(!third.allowed);
        assert_eq!(third.retry_after, Duration::from_secs(1));

        let later = limiter
            .check_at(&key, "/api/orders", t0 + Duration::from_secs(1))
            .await;
        assert!(later.allowed);
    }

    #[tokio::test]
    async fn test_refill_caps_at_capacity() {
        let limiter = limiter(2, 1, Duration::from_secs(1));
        let key = ip("10.0.0.2");
        let t0 = Instant::now();

        // A long idle period must not bank more than `capacity` tokens.
        let _ = limiter.check_at(&key, "/", t0).await;
        let after_hour = limiter
            .check_at(&key, "/", t0 + Duration::from_secs(3600))
            .await;
        assert!(after_hour.allowed);
        assert_eq!(after_hour.remaining, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, 1, Duration::from_secs(60));
        let t0 = Instant::now();

        let a = ip("10.0.0.3");
        let b = RateLimitKey::User(Uuid::new_v4());

        assert!(limiter.check_at(&a, "/", t0).await.allowed);
        assert!(!limiter.check_at(&a, "/", t0).await.allowed);

        // Exhausting A leaves B untouched.
        assert!(limiter.check_at(&b, "/", t0).await.allowed);
    }

    #[tokio::test]
    async fn test_zero_capacity_always_denies() {
        let limiter = limiter(0, 1, Duration::from_secs(1));
        let key = ip("10.0.0.4");
        let t0 = Instant::now();

        for i in 0..3u64 {
            let decision = limiter
                .check_at(&key, "/", t0 + Duration::from_secs(i * 10))
                .await;
            assert!(!decision.allowed);
        }
    }

    #[tokio::test]
    async fn test_endpoint_override_uses_its_own_bucket() {
        let settings = RateLimitSettings::default().with_override(
            "/api/auth",
            BucketConfig::new(1, 1, Duration::from_secs(60)),
        );
        let limiter = TokenBucketLimiter::new(settings);
        let key = ip("10.0.0.5");
        let t0 = Instant::now();

        assert!(limiter.check_at(&key, "/api/auth/login", t0).await.allowed);
        assert!(!limiter.check_at(&key, "/api/auth/login", t0).await.allowed);

        // The default budget for the same caller is separate and generous.
        assert!(limiter.check_at(&key, "/api/orders", t0).await.allowed);
    }

    #[tokio::test]
    async fn test_no_over_admission_under_concurrency() {
        let limiter = Arc::new(limiter(10, 1, Duration::from_secs(3600)));
        let key = ip("10.0.0.6");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                limiter.check(&key, "/").await.unwrap().allowed
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        // Refill over the test's runtime is < 1 token, so exactly the burst.
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_idle_buckets() {
        let settings = RateLimitSettings {
            default_bucket: BucketConfig::new(5, 5, Duration::from_millis(1)),
            idle_multiple: 1,
            ..RateLimitSettings::default()
        };
        let limiter = TokenBucketLimiter::new(settings);
        let key = ip("10.0.0.7");

        limiter.check(&key, "/").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let removed = limiter.sweep().await;
        assert_eq!(removed, 1);

        // A freshly used bucket survives the sweep.
        limiter.check(&key, "/").await.unwrap();
        assert_eq!(limiter.sweep().await, 0);
    }
}
