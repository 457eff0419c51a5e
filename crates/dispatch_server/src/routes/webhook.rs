//! Inbound WhatsApp webhook: the provider verification handshake plus HMAC-signed
//! delivery-status callbacks (§4.C7).

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::collections::HashMap;

use dispatch_core::errors::{DispatchError, FieldError};
use dispatch_core::messaging::verify_webhook_signature;
use dispatch_core::models::NotificationStatus;

use crate::error::{ok, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Meta's subscription verification handshake: echo back `hub.challenge` only when
/// `hub.verify_token` matches the configured secret and `hub.mode == "subscribe"`.
pub async fn verify(State(state): State<AppState>, Query(q): Query<VerifyQuery>) -> Response {
    match (q.mode.as_deref(), q.verify_token.as_deref(), q.challenge) {
        (Some("subscribe"), Some(token), Some(challenge))
            if token == state.config().whatsapp_verify_token =>
        {
            challenge.into_response()
        }
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

#[derive(Deserialize)]
struct StatusCallback {
    message_id: String,
    status: String,
}

#[derive(Deserialize)]
struct StatusPayload {
    statuses: Vec<StatusCallback>,
}

/// Delivery status callback. The signature covers the raw body, so this handler
/// takes the body as bytes rather than a pre-parsed `Json<T>` extractor.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<Response> {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or(DispatchError::Forbidden)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    if !verify_webhook_signature(&state.config().whatsapp_webhook_secret, &body, signature) {
        return Err(DispatchError::Forbidden.into());
    }

    let payload: StatusPayload = serde_json::from_slice(&body).map_err(|e| {
        DispatchError::ValidationFailed(vec![FieldError {
            field: "body".into(),
            message: e.to_string(),
        }])
    })?;

    let mut advanced: HashMap<String, bool> = HashMap::new();
    for callback in payload.statuses {
        let Some(status) = parse_status(&callback.status) else {
            continue;
        };
        let applied = state
            .notifications()
            .advance_status_by_message_id(&callback.message_id, status)
            .await?;
        advanced.insert(callback.message_id, applied);
    }

    Ok(ok(serde_json::json!({ "processed": advanced })))
}

fn parse_status(raw: &str) -> Option<NotificationStatus> {
    match raw {
        "sent" => Some(NotificationStatus::Sent),
        "delivered" => Some(NotificationStatus::Delivered),
        "read" => Some(NotificationStatus::Read),
        "failed" => Some(NotificationStatus::Failed),
        _ => None,
    }
}
