//! Real-time client protocol (§6): one WebSocket connection per client, joined into
//! `user:{id}`/`driver:{id}` rooms on connect and a `geo:{hash}` tile on the first
//! location hint. Inbound events are dispatched by tag; outbound events are pushed
//! onto the connection's own unbounded channel by whichever room membership the
//! spatial registry fans them out to.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use dispatch_core::auth::AuthContext;
use dispatch_core::distance::haversine_km;
use dispatch_core::errors::DispatchError;
use dispatch_core::geohash;
use dispatch_core::models::{Role, TripStatus};
use dispatch_core::spatial::{ConnectionId, RoomBroker, RoomKey};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dispatch_notify::redispatch;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> ApiResult<Response> {
    let ctx = state
        .token_verifier()
        .verify(&query.token)
        .await
        .map_err(|_| DispatchError::AuthRequired)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, ctx)))
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ClientEvent {
    #[serde(rename = "connect:location")]
    ConnectLocation { lat: f64, lng: f64 },
    #[serde(rename = "driver:location")]
    DriverLocation { lat: f64, lng: f64, bearing: Option<f64> },
    #[serde(rename = "offer:accept")]
    OfferAccept { trip_id: Uuid },
    #[serde(rename = "offer:reject")]
    OfferReject { trip_id: Uuid },
    #[serde(rename = "trip:arrived")]
    TripArrived { trip_id: Uuid },
    #[serde(rename = "trip:start")]
    TripStart { trip_id: Uuid },
    #[serde(rename = "trip:complete")]
    TripComplete { trip_id: Uuid },
    #[serde(rename = "rider:get_nearby_drivers")]
    GetNearbyDrivers { lat: f64, lng: f64, radius: Option<f64> },
}

async fn handle_socket(socket: WebSocket, state: AppState, ctx: AuthContext) {
    let conn_id: ConnectionId = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    state.spatial().join(RoomKey::User(ctx.user_id), conn_id, out_tx.clone());
    if let Some(driver_id) = ctx.driver_id {
        state.spatial().join(RoomKey::Driver(driver_id), conn_id, out_tx.clone());
    }
    if ctx.role == Role::Admin {
        state.spatial().join(RoomKey::Admin, conn_id, out_tx.clone());
    }

    let forward = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            if ws_tx.send(Message::Text(event.to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut current_geo: Option<String> = None;

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(event) = serde_json::from_str::<ClientEvent>(&text) else {
            let _ = out_tx.send(json!({"type": "offer:error", "message": "unrecognized event"}));
            continue;
        };

        if let Err(e) = dispatch_event(&state, &ctx, conn_id, event, &mut current_geo, &out_tx).await {
            let _ = out_tx.send(json!({"type": "offer:error", "message": e.to_string()}));
        }
    }

    state.spatial().leave_all(conn_id);
    forward.abort();
}

async fn dispatch_event(
    state: &AppState,
    ctx: &AuthContext,
    conn_id: ConnectionId,
    event: ClientEvent,
    current_geo: &mut Option<String>,
    out_tx: &mpsc::UnboundedSender<Value>,
) -> Result<(), DispatchError> {
    match event {
        ClientEvent::ConnectLocation { lat, lng } => {
            join_geo_tile(state, conn_id, lat, lng, current_geo, out_tx.clone());
            Ok(())
        }

        ClientEvent::DriverLocation { lat, lng, bearing } => {
            let driver_id = ctx.driver_id.ok_or(DispatchError::Forbidden)?;
            let update = state
                .location()
                .update_driver_location(driver_id, lat, lng, bearing, None)
                .await?;

            if update.flagged {
                let _ = out_tx.send(json!({
                    "type": "driver:flagged",
                    "reason": "anomalous position",
                    "anomaly_count": update.anomaly_count,
                }));
                return Ok(());
            }

            join_geo_tile(state, conn_id, update.snapped_lat, update.snapped_lng, current_geo, out_tx.clone());
            state.spatial().emit_to_tile_neighborhood(
                current_geo.as_deref().unwrap_or_default(),
                json!({
                    "type": "driver:location:update",
                    "driver_id": driver_id,
                    "lat": update.snapped_lat,
                    "lng": update.snapped_lng,
                    "bearing": bearing,
                }),
            )?;
            Ok(())
        }

        ClientEvent::OfferAccept { trip_id } => {
            let driver_id = ctx.driver_id.ok_or(DispatchError::Forbidden)?;
            let offer = state
                .offers()
                .find_pending_for_trip_and_driver(trip_id, driver_id)
                .await?
                .ok_or(DispatchError::NotFound("offer".into()))?;
            let trip = state.dispatch().accept_offer(offer.id, driver_id).await?;
            let payload = json!({"type": "trip:accepted", "trip": trip});
            state.spatial().emit(&RoomKey::User(trip.rider_id), payload.clone())?;
            state.spatial().emit(&RoomKey::Driver(driver_id), payload)?;
            Ok(())
        }

        ClientEvent::OfferReject { trip_id } => {
            let driver_id = ctx.driver_id.ok_or(DispatchError::Forbidden)?;
            let offer = state
                .offers()
                .find_pending_for_trip_and_driver(trip_id, driver_id)
                .await?
                .ok_or(DispatchError::NotFound("offer".into()))?;
            state.dispatch().reject_offer(offer.id, driver_id).await?;
            redispatch(state, trip_id).await?;
            Ok(())
        }

        ClientEvent::TripArrived { trip_id } => {
            let trip = state
                .trip_state()
                .transition(trip_id, ctx.role, ctx.user_id, TripStatus::Arrived)
                .await?;
            state.spatial().emit(
                &RoomKey::User(trip.rider_id),
                json!({"type": "trip:driver_arrived", "trip": trip}),
            )?;
            Ok(())
        }

        ClientEvent::TripStart { trip_id } => {
            let trip = state
                .trip_state()
                .transition(trip_id, ctx.role, ctx.user_id, TripStatus::InProgress)
                .await?;
            state.spatial().emit(
                &RoomKey::User(trip.rider_id),
                json!({"type": "trip:started", "trip": trip}),
            )?;
            Ok(())
        }

        ClientEvent::TripComplete { trip_id } => {
            let trip = state
                .trip_state()
                .transition(trip_id, ctx.role, ctx.user_id, TripStatus::Completed)
                .await?;
            let payload = json!({"type": "trip:completed", "trip": trip});
            state.spatial().emit(&RoomKey::User(trip.rider_id), payload.clone())?;
            if let Some(driver_id) = trip.driver_id {
                state.spatial().emit(&RoomKey::Driver(driver_id), payload)?;
            }
            Ok(())
        }

        ClientEvent::GetNearbyDrivers { lat, lng, radius } => {
            let radius_km = radius.unwrap_or(state.config().dispatch.search_radius_km);
            let nearby = state
                .drivers()
                .list_online(None, state.config().dispatch.max_deviation_strikes)
                .await?
                .into_iter()
                .filter(|(_, loc)| haversine_km(lat, lng, loc.snapped_lat, loc.snapped_lng) <= radius_km)
                .map(|(driver, _)| driver.id)
                .collect::<Vec<_>>();
            let _ = out_tx.send(json!({"type": "rider:nearby_drivers", "drivers": nearby}));
            Ok(())
        }
    }
}

/// Moves a connection's geo-room membership when its tile changes (§4.C4: atomically
/// leave the old tile and join the new one before fanning anything out).
fn join_geo_tile(
    state: &AppState,
    conn_id: ConnectionId,
    lat: f64,
    lng: f64,
    current_geo: &mut Option<String>,
    sender: mpsc::UnboundedSender<Value>,
) {
    let precision = state.config().dispatch.geohash_precision;
    let new_hash = geohash::encode(lat, lng, precision);
    if current_geo.as_deref() == Some(new_hash.as_str()) {
        return;
    }
    if let Some(old) = current_geo.take() {
        state.spatial().leave(&RoomKey::Geo(old), conn_id);
    }
    state.spatial().join(RoomKey::Geo(new_hash.clone()), conn_id, sender);
    *current_geo = Some(new_hash);
}
