//! Domain entities - the core business objects.

mod refresh_token;
mod user;

pub use refresh_token::{RefreshToken, TokenStatus, generate_token_value};
pub use user::User;
