//! Client-facing error taxonomy. Every variant renders the uniform
//! `{success:false, error, details?}` body; upstream provider text never
//! appears in a response.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::UpstreamError;
use crate::schema::{FieldError, ValidationError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("Too many requests. Please wait before trying again.")]
    RateLimited { retry_after: Duration },
    /// The model could not be reached or refused the call. Carries the fixed
    /// route-specific message shown to the client.
    #[error("{0}")]
    ServiceUnavailable(&'static str),
    #[error("Rate limit exceeded. Please try again later.")]
    UpstreamRateLimited,
    #[error("Payment required. Please add credits to your workspace.")]
    PaymentRequired,
    #[error("Request too large (body exceeded limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    #[error("Route not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } | ApiError::UpstreamRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::ServiceUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Map a failed gateway call to a client error. Quota statuses pass
    /// through as their own errors, everything else becomes the fixed route
    /// message.
    pub fn from_gateway(err: &UpstreamError, message: &'static str) -> Self {
        match err.status() {
            Some(429) => ApiError::UpstreamRateLimited,
            Some(402) => ApiError::PaymentRequired,
            _ => ApiError::ServiceUnavailable(message),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.fields)
    }
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimited { retry_after } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            details: match self {
                ApiError::Validation(fields) => Some(fields),
                _ => None,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Whole seconds until the window resets, rounded up and never zero.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
