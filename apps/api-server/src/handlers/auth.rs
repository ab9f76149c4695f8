//! Session handlers - registration, login, refresh, logout.

use actix_web::{HttpResponse, web};

use forno_core::session::TokenPair;
use forno_shared::dto::{
    LoginRequest, LogoutRequest, RefreshRequest, RegisterUserRequest, TokenPairResponse,
    UserResponse,
};

use crate::middleware::auth::Identity;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

fn pair_response(pair: TokenPair) -> TokenPairResponse {
    TokenPairResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: pair.expires_in,
    }
}

/// POST /api/auth/register
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterUserRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    if req.email.is_empty() || !req.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let (_user, pair) = state.issuer.register(&req.email, &req.password).await?;

    Ok(HttpResponse::Created().json(pair_response(pair)))
}

/// POST /api/auth/login
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    let (_user, pair) = state.issuer.login(&req.email, &req.password).await?;

    Ok(HttpResponse::Ok().json(pair_response(pair)))
}

/// POST /api/auth/refresh
///
/// Exchanges a refresh token for a fresh pair. The presented token is spent
/// whether or not the caller keeps the response.
pub async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> AppResult<HttpResponse> {
    let pair = state.rotation.rotate(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(pair_response(pair)))
}

/// POST /api/auth/logout
///
/// Revokes the presented refresh token. Idempotent: logging out twice, or
/// with a token the server never issued, still returns 204.
pub async fn logout(
    state: web::Data<AppState>,
    body: web::Json<LogoutRequest>,
) -> AppResult<HttpResponse> {
    state.rotation.revoke_token(&body.refresh_token).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/auth/me - Protected route
pub async fn me(identity: Identity) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(UserResponse {
        id: identity.user_id.to_string(),
        email: identity.email,
    }))
}
