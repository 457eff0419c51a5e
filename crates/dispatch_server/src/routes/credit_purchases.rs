//! Credit purchase review workflow (§4.C12): a driver submits a request, an admin
//! approves (granting the package) or rejects it (touching only the request row).

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use dispatch_core::errors::DispatchError;
use dispatch_core::models::Role;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{require_role, AuthUser};
use crate::error::{ok, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitPurchaseRequest {
    pub credits: i64,
    pub months: i64,
}

pub async fn submit(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(req): Json<SubmitPurchaseRequest>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Driver)?;
    let driver_id = ctx.driver_id.ok_or(DispatchError::Forbidden)?;
    let request = state
        .credit_ledger()
        .submit_purchase_request(driver_id, req.credits, req.months)
        .await?;
    Ok(ok(request))
}

/// Loads the request, validates it's still pending, grants the package, then marks
/// the request row approved. The grant and the CAS are deliberately sequential (not
/// one transaction) so a request is never flipped to `APPROVED` before the credits
/// have actually landed.
pub async fn approve(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Admin)?;
    let request = state.credit_ledger().find_purchase_request(request_id).await?;
    let (credits, months) = state.credit_ledger().approve(&request)?;
    state.settlement().grant_credit_package(request.driver_id, credits, months).await?;
    state.credit_ledger().mark_purchase_approved(request_id).await?;
    Ok(ok(json!({"request_id": request_id, "status": "APPROVED"})))
}

pub async fn reject(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Admin)?;
    state.credit_ledger().reject_purchase_request(request_id).await?;
    Ok(ok(json!({"request_id": request_id, "status": "REJECTED"})))
}
