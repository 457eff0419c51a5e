//! Trip state machine: guarded, ownership-checked status transitions (§4.C9).
//!
//! Every transition is a CAS (`UPDATE ... WHERE status = <expected>`) at the
//! repository layer; this module is responsible for the transition table and the
//! authorization rule, not the atomicity itself.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::db::trip_repo::TripRepository;
use crate::distance::haversine_km;
use crate::errors::{DispatchError, DispatchResult};
use crate::models::{Role, Trip, TripStatus};

/// Who is allowed to drive which transition. Admin can force most transitions for
/// support/dispute resolution; riders and drivers are restricted to their own leg.
fn authorized(role: Role, from: TripStatus, to: TripStatus) -> bool {
    use TripStatus::*;
    match (from, to) {
        (Requested, Cancelled) => matches!(role, Role::Rider | Role::Admin),
        (Requested, Accepted) => matches!(role, Role::Driver | Role::Admin),
        (Accepted, Arrived) => matches!(role, Role::Driver | Role::Admin),
        (Accepted, Cancelled) => matches!(role, Role::Rider | Role::Driver | Role::Admin),
        (Arrived, InProgress) => matches!(role, Role::Driver | Role::Admin),
        (Arrived, Cancelled) => matches!(role, Role::Rider | Role::Driver | Role::Admin),
        (InProgress, Completed) => matches!(role, Role::Driver | Role::Admin),
        (InProgress, Cancelled) => matches!(role, Role::Admin),
        _ => false,
    }
}

pub struct TripStateMachine {
    trips: TripRepository,
    config: DispatchConfig,
}

impl TripStateMachine {
    pub fn new(trips: TripRepository, config: DispatchConfig) -> Self {
        Self { trips, config }
    }

    pub async fn transition(
        &self,
        trip_id: Uuid,
        actor_role: Role,
        actor_id: Uuid,
        to: TripStatus,
    ) -> DispatchResult<Trip> {
        let trip = self.trips.find_by_id(trip_id).await?;

        self.check_ownership(&trip, actor_role, actor_id)?;

        if !authorized(actor_role, trip.status, to) {
            return Err(DispatchError::InvalidStateTransition {
                current: trip.status.as_str().to_string(),
                attempted: to.as_str().to_string(),
            });
        }

        let applied = self.trips.cas_status(trip_id, trip.status, to).await?;
        if !applied {
            return Err(DispatchError::Conflict(
                "trip status changed concurrently".into(),
            ));
        }

        self.trips.find_by_id(trip_id).await
    }

    fn check_ownership(&self, trip: &Trip, actor_role: Role, actor_id: Uuid) -> DispatchResult<()> {
        match actor_role {
            Role::Admin => Ok(()),
            Role::Rider if trip.rider_id == actor_id => Ok(()),
            Role::Driver if trip.driver_id == Some(actor_id) => Ok(()),
            _ => Err(DispatchError::Forbidden),
        }
    }

    /// Auto-transitions `ACCEPTED -> ARRIVED` when the driver's live position is
    /// within `auto_arrival_radius_m` of the pickup point, without requiring an
    /// explicit driver action (§4.C9's auto-arrival rule).
    pub async fn maybe_auto_arrive(&self, trip: &Trip, driver_lat: f64, driver_lng: f64) -> DispatchResult<bool> {
        if trip.status != TripStatus::Accepted {
            return Ok(false);
        }
        let distance_m = haversine_km(trip.pickup_lat, trip.pickup_lng, driver_lat, driver_lng) * 1000.0;
        if distance_m > self.config.auto_arrival_radius_m {
            return Ok(false);
        }
        let applied = self
            .trips
            .cas_status(trip.id, TripStatus::Accepted, TripStatus::Arrived)
            .await?;
        Ok(applied)
    }

    /// SOS is logged as an audit event, not a status transition; this returns the
    /// timestamped record the caller (HTTP layer) persists via its own audit sink.
    pub fn sos_event(&self, trip_id: Uuid, reporter_id: Uuid) -> SosEvent {
        SosEvent {
            trip_id,
            reporter_id,
            raised_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SosEvent {
    pub trip_id: Uuid,
    pub reporter_id: Uuid,
    pub raised_at: chrono::DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use TripStatus::*;

    #[test]
    fn rider_can_cancel_a_requested_trip() {
        assert!(authorized(Role::Rider, Requested, Cancelled));
    }

    #[test]
    fn rider_cannot_accept_a_trip() {
        assert!(!authorized(Role::Rider, Requested, Accepted));
    }

    #[test]
    fn driver_cannot_cancel_an_in_progress_trip() {
        assert!(!authorized(Role::Driver, InProgress, Cancelled));
    }

    #[test]
    fn admin_can_force_cancel_in_progress() {
        assert!(authorized(Role::Admin, InProgress, Cancelled));
    }

    #[test]
    fn completed_is_terminal_for_every_role() {
        for role in [Role::Rider, Role::Driver, Role::Admin] {
            assert!(!authorized(role, Completed, InProgress));
        }
    }
}
