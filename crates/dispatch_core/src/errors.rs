//! The error taxonomy shared by every domain module.
//!
//! `dispatch_server` maps each variant to an HTTP status and the
//! `{success, data, message, errors}` envelope; the mapping itself lives in the
//! server crate since it is a transport concern, not a domain one.

use std::fmt;

use chrono::{DateTime, Utc};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Domain-level errors. Never constructed with secrets or raw database errors in the
/// message — those are logged server-side against the correlation id instead.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("authentication required")]
    AuthRequired,

    #[error("forbidden")]
    Forbidden,

    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("offer expired or already accepted")]
    OfferExpired,

    #[error("invalid state transition: {current} -> {attempted}")]
    InvalidStateTransition { current: String, attempted: String },

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("rate limited, retry after {retry_after_sec}s")]
    RateLimited { retry_after_sec: i64 },

    #[error("locked until {until}")]
    Locked { until: DateTime<Utc> },

    #[error("routing provider unavailable")]
    RoutingUnavailable,

    #[error("payment provider error: {0}")]
    PaymentProviderError(String),

    #[error("internal error (correlation id {correlation_id})")]
    Internal {
        correlation_id: String,
        #[source]
        source: Option<anyhow_lite::BoxError>,
    },
}

impl DispatchError {
    /// Wrap any lower-level error (sqlx, reqwest, ...) as `Internal`, stamping a fresh
    /// correlation id and logging the real cause server-side.
    pub fn internal<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(correlation_id = %correlation_id, error = %source, "internal error");
        DispatchError::Internal {
            correlation_id,
            source: Some(Box::new(source)),
        }
    }

    pub fn internal_msg(msg: impl Into<String>) -> Self {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let msg = msg.into();
        tracing::error!(correlation_id = %correlation_id, error = %msg, "internal error");
        DispatchError::Internal {
            correlation_id,
            source: None,
        }
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        DispatchError::internal(err)
    }
}

/// A tiny local stand-in for `Box<dyn Error>` so `DispatchError` stays `Send + Sync`
/// without pulling in a boxed-error crate the rest of the pack doesn't use.
pub mod anyhow_lite {
    pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
}

pub type DispatchResult<T> = Result<T, DispatchError>;
