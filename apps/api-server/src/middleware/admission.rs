//! Admission control middleware - per-caller rate limiting on every route.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderName, HeaderValue},
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use forno_core::ports::{RateLimitKey, RateLimiter, TokenService};
use forno_infra::{FailPolicy, RateLimitSettings};
use forno_shared::{ErrorResponse, RateLimitBody};

/// Admission filter factory.
///
/// Sits in front of every route. Authenticated callers are budgeted per
/// user, anonymous callers per client address; exempt paths bypass the
/// check entirely. A denial never reaches the inner service.
pub struct AdmissionFilter {
    limiter: Arc<dyn RateLimiter>,
    settings: Arc<RateLimitSettings>,
    tokens: Arc<dyn TokenService>,
}

impl AdmissionFilter {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        settings: RateLimitSettings,
        tokens: Arc<dyn TokenService>,
    ) -> Self {
        Self {
            limiter,
            settings: Arc::new(settings),
            tokens,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionFilterService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionFilterService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            settings: self.settings.clone(),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct AdmissionFilterService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    settings: Arc<RateLimitSettings>,
    tokens: Arc<dyn TokenService>,
}

impl<S, B> Service<ServiceRequest> for AdmissionFilterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.settings.enabled || self.settings.is_exempt(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        // Key derivation is synchronous, so it happens before the await.
        let key = derive_key(&req, self.tokens.as_ref());
        let path = req.path().to_string();

        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let settings = self.settings.clone();

        Box::pin(async move {
            match limiter.check(&key, &path).await {
                Ok(decision) if !decision.allowed => {
                    let retry_after = decision.retry_after.as_secs();
                    tracing::warn!(%key, %path, retry_after, "Request rejected by rate limit");

                    let response = HttpResponse::TooManyRequests()
                        .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                        .insert_header(("X-RateLimit-Remaining", "0"))
                        .json(RateLimitBody::new(retry_after));

                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
                Ok(decision) => {
                    let mut res = service.call(req).await?;
                    res.headers_mut().insert(
                        HeaderName::from_static("x-ratelimit-remaining"),
                        HeaderValue::from(decision.remaining),
                    );
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    tracing::error!(error = %e, %key, "Rate limit backend unavailable");
                    match settings.fail_policy {
                        FailPolicy::Open => Ok(service.call(req).await?.map_into_left_body()),
                        FailPolicy::Closed => {
                            let response = HttpResponse::ServiceUnavailable().json(
                                ErrorResponse::service_unavailable(
                                    "Admission control unavailable",
                                ),
                            );
                            let (http_req, _payload) = req.into_parts();
                            Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                        }
                    }
                }
            }
        })
    }
}

/// A valid bearer token budgets the caller by user id; anything else falls
/// back to the client address. An expired or garbage token is not an error
/// here - authorization is the handler's concern, admission only needs a
/// stable key.
fn derive_key(req: &ServiceRequest, tokens: &dyn TokenService) -> RateLimitKey {
    let claims = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .and_then(|token| tokens.validate_token(token).ok());

    match claims {
        Some(claims) => RateLimitKey::User(claims.user_id),
        None => RateLimitKey::Ip(
            req.connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test, web};
    use forno_core::ports::{AccessClaims, AuthError, RateLimitDecision, RateLimitError};
    use forno_infra::{BucketConfig, TokenBucketLimiter};
    use std::time::Duration;
    use uuid::Uuid;

    /// Accepts tokens of the form `user-<uuid>`.
    struct StubTokenService;

    impl TokenService for StubTokenService {
        fn generate_token(&self, user_id: Uuid, _email: &str) -> Result<String, AuthError> {
            Ok(format!("user-{user_id}"))
        }

        fn validate_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
            let id = token
                .strip_prefix("user-")
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| AuthError::InvalidToken("bad stub token".to_string()))?;
            Ok(AccessClaims {
                user_id: id,
                email: "stub@example.com".to_string(),
                exp: 0,
            })
        }

        fn expiration_seconds(&self) -> i64 {
            900
        }
    }

    fn tight_settings() -> RateLimitSettings {
        RateLimitSettings {
            default_bucket: BucketConfig::new(1, 1, Duration::from_secs(60)),
            ..RateLimitSettings::default()
        }
    }

    fn filter_with(settings: RateLimitSettings) -> AdmissionFilter {
        let limiter = Arc::new(TokenBucketLimiter::new(settings.clone()));
        AdmissionFilter::new(limiter, settings, Arc::new(StubTokenService))
    }

    async fn ping() -> HttpResponse {
        HttpResponse::Ok().body("pong")
    }

    #[actix_web::test]
    async fn test_allows_then_denies_with_contract_body() {
        let app = test::init_service(
            App::new()
                .wrap(filter_with(tight_settings()))
                .route("/api/ping", web::get().to(ping)),
        )
        .await;

        let ok = test::call_service(&app, test::TestRequest::get().uri("/api/ping").to_request())
            .await;
        assert!(ok.status().is_success());
        assert_eq!(
            ok.headers().get("x-ratelimit-remaining").unwrap(),
            &HeaderValue::from_static("0")
        );

        let denied =
            test::call_service(&app, test::TestRequest::get().uri("/api/ping").to_request())
                .await;
        assert_eq!(denied.status().as_u16(), 429);
        assert!(denied.headers().contains_key("retry-after"));
        assert_eq!(
            denied.headers().get("x-ratelimit-remaining").unwrap(),
            &HeaderValue::from_static("0")
        );

        let body: serde_json::Value = test::read_body_json(denied).await;
        assert_eq!(body["error"], "Too Many Requests");
        assert!(body["retryAfter"].as_u64().unwrap() >= 1);
    }

    #[actix_web::test]
    async fn test_exempt_path_bypasses_limit() {
        let app = test::init_service(
            App::new()
                .wrap(filter_with(tight_settings()))
                .route("/api/health", web::get().to(ping)),
        )
        .await;

        for _ in 0..5 {
            let res = test::call_service(
                &app,
                test::TestRequest::get().uri("/api/health").to_request(),
            )
            .await;
            assert!(res.status().is_success());
        }
    }

    #[actix_web::test]
    async fn test_authenticated_callers_budgeted_separately() {
        let app = test::init_service(
            App::new()
                .wrap(filter_with(tight_settings()))
                .route("/api/ping", web::get().to(ping)),
        )
        .await;

        // Two users behind the same address each get their own bucket.
        for user in [Uuid::new_v4(), Uuid::new_v4()] {
            let req = test::TestRequest::get()
                .uri("/api/ping")
                .insert_header((header::AUTHORIZATION, format!("Bearer user-{user}")))
                .to_request();
            let res = test::call_service(&app, req).await;
            assert!(res.status().is_success());
        }

        // The anonymous bucket for the shared address is independent too.
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/ping").to_request(),
        )
        .await;
        assert!(res.status().is_success());
    }

    /// Limiter whose backend is permanently down.
    struct BrokenLimiter;

    #[async_trait::async_trait]
    impl RateLimiter for BrokenLimiter {
        async fn check(
            &self,
            _key: &RateLimitKey,
            _path: &str,
        ) -> Result<RateLimitDecision, RateLimitError> {
            Err(RateLimitError::Backend("connection refused".into()))
        }
    }

    fn broken_filter(settings: RateLimitSettings) -> AdmissionFilter {
        AdmissionFilter::new(Arc::new(BrokenLimiter), settings, Arc::new(StubTokenService))
    }

    #[actix_web::test]
    async fn test_backend_failure_fails_open_by_default() {
        let app = test::init_service(
            App::new()
                .wrap(broken_filter(tight_settings()))
                .route("/api/ping", web::get().to(ping)),
        )
        .await;

        // Open policy forwards every request, with no remaining-count header
        // since no decision was made.
        for _ in 0..3 {
            let res = test::call_service(
                &app,
                test::TestRequest::get().uri("/api/ping").to_request(),
            )
            .await;
            assert!(res.status().is_success());
            assert!(!res.headers().contains_key("x-ratelimit-remaining"));
        }
    }

    #[actix_web::test]
    async fn test_backend_failure_fails_closed_when_configured() {
        let settings = RateLimitSettings {
            fail_policy: FailPolicy::Closed,
            ..tight_settings()
        };
        let app = test::init_service(
            App::new()
                .wrap(broken_filter(settings))
                .route("/api/ping", web::get().to(ping)),
        )
        .await;

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/ping").to_request(),
        )
        .await;
        assert_eq!(res.status().as_u16(), 503);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 503);
        assert_eq!(body["title"], "Service Unavailable");
    }

    #[actix_web::test]
    async fn test_disabled_settings_pass_everything() {
        let settings = RateLimitSettings {
            enabled: false,
            default_bucket: BucketConfig::new(0, 0, Duration::from_secs(60)),
            ..RateLimitSettings::default()
        };
        let app = test::init_service(
            App::new()
                .wrap(filter_with(settings))
                .route("/api/ping", web::get().to(ping)),
        )
        .await;

        for _ in 0..3 {
            let res = test::call_service(
                &app,
                test::TestRequest::get().uri("/api/ping").to_request(),
            )
            .await;
            assert!(res.status().is_success());
        }
    }
}
