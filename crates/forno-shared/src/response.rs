//! Wire-level error and rate-limit bodies (RFC 7807 for errors).

use serde::{Deserialize, Serialize};

/// RFC 7807 Problem Details for HTTP APIs.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Request ID for debugging purposes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
            instance: None,
            request_id: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    // Common error constructors
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, "Bad Request").with_detail(detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(401, "Unauthorized")
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, "Not Found").with_detail(detail)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(503, "Service Unavailable").with_detail(detail)
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }
}

/// The fixed body of a 429 rejection.
///
/// Clients key on `retryAfter` for their backoff, so the field name is part
/// of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitBody {
    pub error: String,
    pub message: String,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

impl RateLimitBody {
    pub fn new(retry_after_secs: u64) -> Self {
        Self {
            error: "Too Many Requests".to_string(),
            message: format!(
                "Rate limit exceeded. Try again in {retry_after_secs} seconds."
            ),
            retry_after: retry_after_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_body_shape() {
        let body = RateLimitBody::new(7);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["error"], "Too Many Requests");
        assert_eq!(json["retryAfter"], 7);
        assert!(json["message"].as_str().unwrap().contains('7'));
    }

    #[test]
    fn test_error_response_omits_empty_fields() {
        let json = serde_json::to_value(ErrorResponse::unauthorized()).unwrap();

        assert_eq!(json["status"], 401);
        assert!(json.get("detail").is_none());
        assert!(json.get("request_id").is_none());
    }
}
