//! Error handling - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use gatekeeper_core::UpstreamError;
use gatekeeper_shared::ErrorResponse;
use std::fmt;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    /// The upstream pool is exhausted or not configured.
    ServiceUnavailable(String),
    /// The upstream provider refused the request itself.
    BadGateway(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized => write!(f, "Unauthorized"),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Unauthorized => ErrorResponse::unauthorized()
                .with_detail("A valid X-Admin-Token header is required."),
            // Upstream details stay in the logs.
            AppError::ServiceUnavailable(detail) => {
                tracing::error!(detail = %detail, "Upstream unavailable");
                ErrorResponse::service_unavailable()
            }
            AppError::BadGateway(detail) => {
                tracing::warn!(detail = %detail, "Upstream rejected request");
                ErrorResponse::bad_gateway()
            }
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        let detail = match err.cause() {
            Some(cause) => format!("{err}: {cause}"),
            None => err.to_string(),
        };
        match err {
            UpstreamError::Configuration | UpstreamError::Exhausted { .. } => {
                AppError::ServiceUnavailable(detail)
            }
            UpstreamError::Rejected(_) => AppError::BadGateway(detail),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
