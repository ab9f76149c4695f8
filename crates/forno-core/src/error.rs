//! Domain-level error types.

use thiserror::Error;

/// Store-level errors - the backing store for tokens or users failed.
///
/// `Connection` means the store was unreachable; the boundary layer decides
/// whether that fails open or closed. It is never treated as success.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Refresh-token lifecycle errors.
///
/// A closed set so callers can exhaustively branch. `Revoked { breach: true }`
/// means a rotated token was presented again and the whole family has already
/// been revoked server-side.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token expired")]
    Expired,

    #[error("Refresh token revoked (breach: {breach})")]
    Revoked { breach: bool },

    #[error("Token store error: {0}")]
    Store(#[from] StoreError),

    #[error("Access token issuance failed: {0}")]
    Issue(String),
}
