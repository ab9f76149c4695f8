//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod rate_limit;
mod repository;
mod token_store;

pub use auth::{AccessClaims, AuthError, PasswordService, TokenService};
pub use rate_limit::{RateLimitDecision, RateLimitError, RateLimitKey, RateLimiter};
pub use repository::{BaseRepository, UserRepository};
pub use token_store::RefreshTokenStore;
