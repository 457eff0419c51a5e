//! OTP authentication routes (§4.C6/§4.C13): request + verify. Verification is the
//! one place the HTTP layer bridges `dispatch_core`'s phone-only OTP flow to a full
//! `AuthContext` — it resolves (or creates) the `User` row and registers the minted
//! token with the in-memory verifier so subsequent requests resolve it.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use dispatch_core::models::Role;
use serde::{Deserialize, Serialize};

use crate::error::{ok, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RequestOtpRequest {
    pub phone: String,
}

pub async fn request_otp(
    State(state): State<AppState>,
    Json(req): Json<RequestOtpRequest>,
) -> ApiResult<Response> {
    state.otp().request_otp(&req.phone).await?;
    Ok(ok(serde_json::json!({ "sent": true })))
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
    /// Only consulted on first-touch registration; ignored for a phone that
    /// already has a `User` row.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Serialize)]
struct VerifyOtpResponse {
    token: String,
    user_id: uuid::Uuid,
    role: Role,
    driver_id: Option<uuid::Uuid>,
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<Response> {
    let token = state.otp().verify_otp(&req.phone, &req.code).await?;

    let default_role = req.role.unwrap_or(Role::Rider);
    let user = state.users().find_or_create_by_phone(&req.phone, default_role).await?;
    let driver_id = state
        .drivers()
        .find_by_user_id(user.id)
        .await?
        .map(|driver| driver.id);

    state.token_verifier().register(token.clone(), user.id, user.role, driver_id);

    Ok(ok(VerifyOtpResponse {
        token,
        user_id: user.id,
        role: user.role,
        driver_id,
    }))
}
