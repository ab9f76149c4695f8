//! Token-bucket admission control.

mod config;
mod memory;

pub use config::{BucketConfig, FailPolicy, RateLimitSettings};
pub use memory::TokenBucketLimiter;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisRateLimitConfig, RedisTokenBucketLimiter};
