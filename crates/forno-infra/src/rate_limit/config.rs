//! Bucket configuration and policy settings.

use std::env;
use std::time::Duration;

/// Immutable token-bucket parameters. Loaded once at process start.
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    /// Burst size - the bucket never holds more than this.
    pub capacity: u32,
    /// Tokens added per `refill_period`.
    pub refill_tokens: u32,
    pub refill_period: Duration,
}

impl BucketConfig {
    pub fn new(capacity: u32, refill_tokens: u32, refill_period: Duration) -> Self {
        Self {
            capacity,
            refill_tokens,
            refill_period,
        }
    }

    /// Steady-state refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        let secs = self.refill_period.as_secs_f64();
        if secs > 0.0 {
            self.refill_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_tokens: 100,
            refill_period: Duration::from_secs(60),
        }
    }
}

/// What to do when the rate-limit backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPolicy {
    /// Let the request through (availability over strictness).
    Open,
    /// Reject the request (strictness over availability).
    Closed,
}

/// Admission-control settings: the default bucket, per-endpoint overrides,
/// exempt paths, and the outage policy.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub default_bucket: BucketConfig,
    /// `(path prefix, config)` pairs; the longest matching prefix wins.
    pub overrides: Vec<(String, BucketConfig)>,
    pub exempt_prefixes: Vec<String>,
    pub fail_policy: FailPolicy,
    /// Buckets idle longer than this multiple of their refill period are
    /// eligible for eviction.
    pub idle_multiple: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_bucket: BucketConfig::default(),
            overrides: Vec::new(),
            exempt_prefixes: vec!["/api/health".to_string()],
            fail_policy: FailPolicy::Open,
            idle_multiple: 10,
        }
    }
}

impl RateLimitSettings {
    pub fn with_override(mut self, prefix: impl Into<String>, config: BucketConfig) -> Self {
        self.overrides.push((prefix.into(), config));
        self
    }

    /// Pick the effective config for a request path. The longest registered
    /// prefix wins; no match means the default. Returns the matched prefix
    /// (empty for the default) so callers can scope bucket state per
    /// endpoint budget.
    pub fn resolve(&self, path: &str) -> (&str, BucketConfig) {
        self.overrides
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, config)| (prefix.as_str(), *config))
            .unwrap_or(("", self.default_bucket))
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes.iter().any(|p| path.starts_with(p))
    }

    /// Load settings from environment variables.
    ///
    /// Overrides use `RATE_LIMIT_OVERRIDE_<NAME>=<prefix>,<capacity>,<refill_tokens>,<refill_secs>`,
    /// e.g. `RATE_LIMIT_OVERRIDE_AUTH=/api/auth,10,10,60`.
    pub fn from_env() -> Self {
        let mut settings = Self {
            enabled: env::var("RATE_LIMIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            default_bucket: BucketConfig {
                capacity: parse_env("RATE_LIMIT_CAPACITY", 100),
                refill_tokens: parse_env("RATE_LIMIT_REFILL_TOKENS", 100),
                refill_period: Duration::from_secs(parse_env("RATE_LIMIT_REFILL_SECS", 60)),
            },
            overrides: Vec::new(),
            exempt_prefixes: env::var("RATE_LIMIT_EXEMPT")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["/api/health".to_string()]),
            fail_policy: match env::var("RATE_LIMIT_FAIL_POLICY").as_deref() {
                Ok("closed") => FailPolicy::Closed,
                _ => FailPolicy::Open,
            },
            idle_multiple: parse_env("RATE_LIMIT_IDLE_MULTIPLE", 10),
        };

        for (key, value) in env::vars() {
            if key.strip_prefix("RATE_LIMIT_OVERRIDE_").is_some() {
                let parts: Vec<&str> = value.split(',').collect();
                if let [prefix, capacity, refill_tokens, refill_secs] = parts[..] {
                    let config = BucketConfig {
                        capacity: capacity.trim().parse().unwrap_or(100),
                        refill_tokens: refill_tokens.trim().parse().unwrap_or(100),
                        refill_period: Duration::from_secs(
                            refill_secs.trim().parse().unwrap_or(60),
                        ),
                    };
                    settings = settings.with_override(prefix.trim(), config);
                } else {
                    tracing::warn!(%key, "Malformed rate-limit override, skipping");
                }
            }
        }

        settings
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let settings = RateLimitSettings::default()
            .with_override("/api", BucketConfig::new(50, 50, Duration::from_secs(60)))
            .with_override(
                "/api/auth",
                BucketConfig::new(5, 5, Duration::from_secs(60)),
            );

        let (prefix, config) = settings.resolve("/api/auth/login");
        assert_eq!(prefix, "/api/auth");
        assert_eq!(config.capacity, 5);

        let (prefix, config) = settings.resolve("/api/orders");
        assert_eq!(prefix, "/api");
        assert_eq!(config.capacity, 50);

        let (prefix, config) = settings.resolve("/metrics");
        assert_eq!(prefix, "");
        assert_eq!(config.capacity, 100);
    }

    #[test]
    fn test_exempt_prefixes() {
        let settings = RateLimitSettings::default();
        assert!(settings.is_exempt("/api/health"));
        assert!(!settings.is_exempt("/api/auth/login"));
    }

    #[test]
    fn test_refill_rate() {
        let config = BucketConfig::new(2, 1, Duration::from_secs(1));
        assert!((config.refill_rate() - 1.0).abs() < f64::EPSILON);

        let zero = BucketConfig::new(2, 1, Duration::ZERO);
        assert_eq!(zero.refill_rate(), 0.0);
    }
}
