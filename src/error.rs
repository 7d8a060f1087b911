/*
 * Responsibility
 * - AppError shared by handlers, extractors and startup
 * - IntoResponse: HTTP status + JSON error body, plus Retry-After / WWW-Authenticate
 * - Gate rejections map to one stable code each; internals never leak to the body
 */
use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::auth::KeyError;
use crate::services::cache::CacheError;
use crate::services::gate::GateError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("not found: {resource}")]
    NotFound { resource: &'static str },
    #[error(transparent)]
    Rejected(#[from] GateError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("cache backend error: {0}")]
    Cache(#[from] CacheError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }
}

// Whole seconds, rounded up, never 0.
fn retry_after_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    secs.max(1)
}

fn rejection_parts(err: &GateError) -> (StatusCode, &'static str) {
    match err {
        GateError::RateLimitExceeded { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
        }
        GateError::MalformedCredential => (StatusCode::UNAUTHORIZED, "MALFORMED_CREDENTIAL"),
        GateError::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
        GateError::ExpiredCredential => (StatusCode::UNAUTHORIZED, "EXPIRED_CREDENTIAL"),
        GateError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        // Lookup failures look exactly like a policy denial from outside.
        GateError::Forbidden | GateError::OwnershipLookupFailed => {
            (StatusCode::FORBIDDEN, "FORBIDDEN")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, *code, message.clone())
            }
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} not found."),
            ),
            AppError::Rejected(err) => {
                let (status, code) = rejection_parts(err);
                (status, code, err.to_string())
            }
            AppError::Config(_)
            | AppError::Key(_)
            | AppError::Cache(_)
            | AppError::Io(_)
            | AppError::Internal => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "internal server error".into(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };
        let mut response = (status, Json(body)).into_response();

        match &self {
            AppError::Rejected(GateError::RateLimitExceeded { retry_after, .. }) => {
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_seconds(*retry_after)),
                );
            }
            AppError::Rejected(err) if status == StatusCode::UNAUTHORIZED => {
                let challenge = match err {
                    GateError::Unauthorized => "Bearer",
                    _ => "Bearer error=\"invalid_token\"",
                };
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
            }
            _ => {}
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_seconds(Duration::from_millis(5_900)), 6);
        assert_eq!(retry_after_seconds(Duration::from_secs(6)), 6);
        assert_eq!(retry_after_seconds(Duration::from_millis(10)), 1);
        assert_eq!(retry_after_seconds(Duration::ZERO), 1);
        assert_eq!(retry_after_seconds(Duration::MAX), u64::MAX);
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let err = AppError::from(GateError::RateLimitExceeded {
            domain: "global",
            retry_after: Duration::from_millis(1_500),
        });
        let res = err.into_response();

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn credential_failures_challenge_the_client() {
        let res = AppError::from(GateError::ExpiredCredential).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(
            res.headers()[header::WWW_AUTHENTICATE]
                .to_str()
                .unwrap()
                .starts_with("Bearer")
        );
    }

    #[test]
    fn lookup_failure_is_indistinguishable_from_forbidden() {
        let a = AppError::from(GateError::OwnershipLookupFailed).into_response();
        let b = AppError::from(GateError::Forbidden).into_response();
        assert_eq!(a.status(), StatusCode::FORBIDDEN);
        assert_eq!(a.status(), b.status());
        assert!(a.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
