//! Health check endpoint.

use actix_web::HttpResponse;
use serde::Serialize;

use crate::observability::RequestId;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub request_id: String,
}

/// Health check endpoint - returns server status.
///
/// GET /api/health. Exempt from admission control so probes keep working
/// while the service sheds load.
pub async fn health_check(request_id: RequestId) -> HttpResponse {
    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        request_id: request_id.0,
    };

    HttpResponse::Ok().json(response)
}
