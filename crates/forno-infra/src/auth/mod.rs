//! Authentication implementations.

mod jwt;
mod password;

pub use jwt::{JwtAccessTokenService, JwtConfig};
pub use password::Argon2PasswordService;
