//! Error handling middleware - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use forno_core::error::{StoreError, TokenError};
use forno_core::session::SessionError;
use forno_shared::ErrorResponse;
use std::fmt;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized => write!(f, "Unauthorized"),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Unauthorized => ErrorResponse::unauthorized(),
            AppError::Conflict(detail) => ErrorResponse::new(409, "Conflict").with_detail(detail),
            AppError::Unavailable(detail) => {
                tracing::error!("Dependency unavailable: {}", detail);
                ErrorResponse::service_unavailable("A required dependency is unavailable")
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ErrorResponse::internal_error()
            }
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(msg) => AppError::Unavailable(msg),
            StoreError::NotFound => AppError::Internal("Missing record".to_string()),
            StoreError::Constraint(msg) => AppError::Conflict(msg),
            StoreError::Query(msg) => AppError::Internal(msg),
        }
    }
}

// A presented refresh token that is unknown, expired, rotated, or revoked
// gets the same 401 regardless; the client remedy is always a fresh login,
// and breach details never leave the server.
impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotFound | TokenError::Expired | TokenError::Revoked { .. } => {
                AppError::Unauthorized
            }
            TokenError::Store(e) => e.into(),
            TokenError::Issue(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredentials => AppError::Unauthorized,
            SessionError::DuplicateEmail => {
                AppError::Conflict("Email already registered".to_string())
            }
            SessionError::Store(e) => e.into(),
            SessionError::Credential(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
