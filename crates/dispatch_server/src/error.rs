//! Maps `dispatch_core::errors::DispatchError` onto an HTTP status and the
//! `{success, data, message, errors}` envelope every route returns (§6). This is the
//! one place in the crate that turns a domain error into a wire response; the
//! `Internal` variant's source is never echoed back, only its correlation id.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dispatch_core::errors::{DispatchError, FieldError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors): (StatusCode, String, Option<Vec<FieldError>>) = match &self.0 {
            DispatchError::AuthRequired => (StatusCode::UNAUTHORIZED, self.0.to_string(), None),
            DispatchError::Forbidden => (StatusCode::FORBIDDEN, self.0.to_string(), None),
            DispatchError::ValidationFailed(fields) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string(), Some(fields.clone()))
            }
            DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string(), None),
            DispatchError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string(), None),
            DispatchError::OfferExpired => (StatusCode::CONFLICT, self.0.to_string(), None),
            DispatchError::InvalidStateTransition { .. } => {
                (StatusCode::CONFLICT, self.0.to_string(), None)
            }
            DispatchError::InsufficientBalance => (StatusCode::PAYMENT_REQUIRED, self.0.to_string(), None),
            DispatchError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string(), None),
            DispatchError::Locked { .. } => (StatusCode::LOCKED, self.0.to_string(), None),
            DispatchError::RoutingUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string(), None),
            DispatchError::PaymentProviderError(_) => (StatusCode::BAD_GATEWAY, self.0.to_string(), None),
            DispatchError::Internal { correlation_id, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal error (reference {correlation_id})"),
                None,
            ),
        };

        let mut headers = HeaderMap::new();
        if let DispatchError::RateLimited { retry_after_sec } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_sec.to_string()) {
                headers.insert("Retry-After", value);
            }
        }

        let body = Envelope {
            success: false,
            message: Some(message.as_str()),
            errors: errors.as_deref(),
        };

        (status, headers, Json(body)).into_response()
    }
}

/// Wraps a successful payload in the `{success, data}` half of the envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    #[derive(Serialize)]
    struct Ok<T> {
        success: bool,
        data: T,
    }
    Json(Ok { success: true, data }).into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
