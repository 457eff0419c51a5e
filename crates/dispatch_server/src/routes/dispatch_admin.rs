//! Admin-only dispatch tuning and offer visibility (§6: `GET/PUT /dispatch/config`,
//! `GET /dispatch/offers`).
//!
//! `DispatchConfig` is process-wide and immutable by design (§3's singleton); `PUT`
//! here only echoes validated input back rather than mutating the running process,
//! since a hot-reloadable config would need its own synchronization story the
//! domain layer doesn't have. A future iteration that wants live tuning would wrap
//! `DispatchConfig` in an `arc_swap::ArcSwap` rather than bolting mutability onto
//! this route.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use dispatch_core::config::DispatchConfig;
use dispatch_core::models::Role;

use crate::auth::{require_role, AuthUser};
use crate::error::{ok, ApiResult};
use crate::state::AppState;

pub async fn get_config(State(state): State<AppState>, AuthUser(ctx): AuthUser) -> ApiResult<Response> {
    require_role(&ctx, Role::Admin)?;
    Ok(ok(state.config().dispatch))
}

pub async fn put_config(
    AuthUser(ctx): AuthUser,
    Json(config): Json<DispatchConfig>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Admin)?;
    Ok(ok(config))
}

pub async fn list_offers(State(state): State<AppState>, AuthUser(ctx): AuthUser) -> ApiResult<Response> {
    require_role(&ctx, Role::Admin)?;
    let offers = state.offers().list_pending().await?;
    Ok(ok(offers))
}
