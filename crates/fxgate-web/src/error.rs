use std::time::Duration;

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fxgate_core::{RateError, ValidationError};
use serde::Serialize;
use thiserror::Error;

use crate::auth::Role;
use crate::throttling::retry_after_seconds;

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Failures surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rate(#[from] RateError),

    /// Malformed query string or body.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Missing or invalid bearer token.")]
    Unauthorized,

    #[error("This operation requires the {required} role.")]
    Forbidden { required: Role },

    #[error("Rate limit exceeded. Try again later.")]
    RateLimited { retry_after: Duration },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rate(error) => match error {
                RateError::Validation(_)
                | RateError::UnsupportedCurrency { .. }
                | RateError::Configuration { .. } => StatusCode::BAD_REQUEST,
                RateError::RateNotFound { .. } => StatusCode::NOT_FOUND,
                RateError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                RateError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Rate(error) => error.code(),
            Self::InvalidRequest(_) => "request.invalid",
            Self::Unauthorized => "auth.unauthorized",
            Self::Forbidden { .. } => "auth.forbidden",
            Self::RateLimited { .. } => "request.rate_limited",
        }
    }

    /// Client-facing message. Not-found and upstream failures use fixed
    /// wording; everything else reports the underlying error text.
    pub fn message(&self) -> String {
        match self {
            Self::Rate(RateError::RateNotFound { .. }) => {
                String::from("Exchange rate not found for the target currency.")
            }
            Self::Rate(error @ RateError::Upstream { .. }) => {
                format!("Internal server error: {error}")
            }
            other => other.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::Rate(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code().to_owned(),
            message: self.message(),
        };
        let mut response = (self.status_code(), Json(body)).into_response();

        if let Self::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from(retry_after_seconds(retry_after)),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use fxgate_core::{CurrencyCode, ProviderId};

    use super::*;

    #[test]
    fn rate_errors_map_to_documented_statuses() {
        let cases = [
            (
                RateError::from(ValidationError::AmountNotPositive),
                StatusCode::BAD_REQUEST,
            ),
            (
                RateError::UnsupportedCurrency {
                    from: String::from("USD"),
                    to: String::from("TRY"),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RateError::RateNotFound {
                    currency: CurrencyCode::parse("JPY").expect("valid"),
                },
                StatusCode::NOT_FOUND,
            ),
            (RateError::upstream("boom"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                RateError::CircuitOpen {
                    provider: ProviderId::Frankfurter,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }
    }

    #[test]
    fn upstream_message_is_prefixed() {
        let error = ApiError::from(RateError::upstream("Failed to retrieve exchange rates."));
        assert_eq!(
            error.message(),
            "Internal server error: Failed to retrieve exchange rates."
        );
    }

    #[test]
    fn throttled_response_carries_retry_after() {
        let response = ApiError::RateLimited {
            retry_after: Duration::from_millis(2_500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("3")
        );
    }
}
