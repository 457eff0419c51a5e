//! Bridges `DispatchEngine::dispatch_trip` to the spatial pub/sub layer: the core
//! crate decides who gets offered next, this module is responsible for telling them
//! (§4.C8's "emit to `driver:{id}`" / "if exhausted, cancel").

use chrono::Utc;
use dispatch_core::errors::DispatchResult;
use dispatch_core::spatial::{RoomBroker, RoomKey};
use uuid::Uuid;

use crate::state::AppState;

/// Issues the next offer (or cancels the trip) and notifies the affected room.
/// Call after trip creation and after every `offer:reject`/expiry.
pub async fn redispatch(state: &AppState, trip_id: Uuid) -> DispatchResult<()> {
    match state.dispatch().dispatch_trip(trip_id).await? {
        Some(offer) => {
            state.spatial().emit(
                &RoomKey::Driver(offer.driver_id),
                serde_json::json!({ "type": "trip:requested", "offer": offer }),
            )?;
        }
        None => {
            let trip = state.trips().find_by_id(trip_id).await?;
            state.spatial().emit(
                &RoomKey::User(trip.rider_id),
                serde_json::json!({
                    "type": "offer:error",
                    "trip_id": trip_id,
                    "message": "NO_DRIVERS_AVAILABLE",
                }),
            )?;
        }
    }
    Ok(())
}

/// Closes the third offer outcome (§4.C8: "Timeout: mark EXPIRED; issue next
/// offer"). Accept and reject are handled synchronously as part of the
/// connection that made the decision; expiry has no caller, so this sweep is
/// the only thing that ever notices a driver who simply never answered.
pub async fn sweep_expired_offers(state: &AppState) -> DispatchResult<()> {
    let now = Utc::now();
    for offer in state.offers().list_pending().await? {
        if offer.expires_at > now {
            continue;
        }
        if state.dispatch().expire_offer(offer.id).await? {
            redispatch(state, offer.trip_id).await?;
        }
    }
    Ok(())
}
