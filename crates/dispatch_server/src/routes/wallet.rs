//! Wallet balance and trip settlement routes (§4.C10).

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use dispatch_core::models::Role;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{require_role, AuthUser};
use crate::error::{ok, ApiResult};
use crate::state::AppState;

pub async fn balance(State(state): State<AppState>, AuthUser(ctx): AuthUser) -> ApiResult<Response> {
    let balance = state.transactions().balance(ctx.user_id).await?;
    Ok(ok(serde_json::json!({ "balance": balance })))
}

#[derive(Deserialize)]
pub struct ProcessTripPaymentRequest {
    pub trip_id: Uuid,
}

/// Settles a completed trip's fare: debits the rider's wallet if paid by wallet,
/// credits the driver's earnings net of commission, and deducts one driver credit.
/// Only a driver (the trip's own driver) or an admin may trigger this.
pub async fn process_trip_payment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(req): Json<ProcessTripPaymentRequest>,
) -> ApiResult<Response> {
    if ctx.role != Role::Admin {
        require_role(&ctx, Role::Driver)?;
    }
    let trip = state.settlement().complete_trip(req.trip_id).await?;
    Ok(ok(trip))
}
