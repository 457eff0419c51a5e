//! Dispatch engine: candidate scoring and the sequential exclusive offer protocol
//! (§4.C8).
//!
//! Offers are made to one driver at a time, in ranked order. Each offer is
//! time-bounded; acceptance is a CAS against both the offer row and the trip row so
//! only the first accept of the first still-pending offer wins.

use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::db::driver_repo::DriverRepository;
use crate::db::offer_repo::OfferRepository;
use crate::db::trip_repo::TripRepository;
use crate::distance::{eta_minutes, haversine_km};
use crate::errors::{DispatchError, DispatchResult};
use crate::geohash;
use crate::models::{Driver, DriverLocation, OfferStatus, Trip, TripOffer, TripStatus};
use crate::routing::{RoutingClient, RoutingError};

/// Candidates scored above this threshold of candidates trigger the parallel
/// (rayon) scoring path instead of a sequential iterator; below it the overhead of
/// spinning up the thread pool isn't worth it.
const PARALLEL_SCORING_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub driver: Driver,
    pub score: f64,
    pub eta_min: f64,
}

/// The pure scoring formula from §4.C8, factored out of `DispatchEngine::score` so it
/// can be exercised (and benchmarked) without a database pool. `eta_min` is supplied
/// by the caller — from the routing client when available, straight-line otherwise
/// (§4.C5's "fallback to straight-line when circuit is open").
pub fn score_candidate(
    driver: &Driver,
    eta_min: f64,
    service_type: Option<&str>,
    config: &DispatchConfig,
) -> ScoredCandidate {
    let eta_norm = (1.0 - (eta_min / config.max_eta_min)).clamp(0.0, 1.0);
    let rating_norm = (driver.rating / 5.0).clamp(0.0, 1.0);
    let acceptance_norm = driver.acceptance_rate.clamp(0.0, 1.0);
    let service_bonus = match service_type {
        Some(requested) if requested == driver.service_type => 1.0,
        Some(_) => 0.0,
        None => 0.0,
    };

    let score = config.weight_eta * eta_norm
        + config.weight_rating * rating_norm
        + config.weight_acceptance * acceptance_norm
        + config.service_match_bonus * service_bonus;

    ScoredCandidate {
        driver: driver.clone(),
        score,
        eta_min,
    }
}

pub struct DispatchEngine {
    trips: TripRepository,
    offers: OfferRepository,
    drivers: DriverRepository,
    routing: Arc<dyn RoutingClient>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        trips: TripRepository,
        offers: OfferRepository,
        drivers: DriverRepository,
        routing: Arc<dyn RoutingClient>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            trips,
            offers,
            drivers,
            routing,
            config,
        }
    }

    /// Gathers online, credit-usable drivers within `search_radius_km` of the pickup
    /// point by expanding outward through geohash neighbor tiles, fetches ETAs from
    /// the routing client (§4.C5), then scores them.
    pub async fn find_candidates(
        &self,
        pickup: (f64, f64),
        service_type: Option<&str>,
        driver_ids_in_area: &[Uuid],
    ) -> DispatchResult<Vec<ScoredCandidate>> {
        let pairs = self
            .drivers
            .find_online_candidates(service_type, driver_ids_in_area, self.config.max_deviation_strikes)
            .await?;

        let within_radius: Vec<(Driver, DriverLocation, f64)> = pairs
            .into_iter()
            .filter_map(|(driver, loc)| {
                let distance_km = haversine_km(pickup.0, pickup.1, loc.snapped_lat, loc.snapped_lng);
                (distance_km <= self.config.search_radius_km).then_some((driver, loc, distance_km))
            })
            .collect();

        let etas = self.fetch_eta_minutes(pickup, &within_radius).await;
        let scored_inputs: Vec<(Driver, f64)> = within_radius
            .into_iter()
            .zip(etas)
            .map(|((driver, _, _), eta_min)| (driver, eta_min))
            .collect();

        let candidates = if scored_inputs.len() >= PARALLEL_SCORING_THRESHOLD {
            scored_inputs
                .into_par_iter()
                .map(|(driver, eta_min)| score_candidate(&driver, eta_min, service_type, &self.config))
                .collect::<Vec<_>>()
        } else {
            scored_inputs
                .into_iter()
                .map(|(driver, eta_min)| score_candidate(&driver, eta_min, service_type, &self.config))
                .collect::<Vec<_>>()
        };

        let mut candidates: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|c| c.eta_min <= self.config.max_eta_min)
            .collect();

        // Highest score first; ties broken by lower ETA, then by driver id for a
        // fully deterministic order (needed so offer sequencing is reproducible).
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.eta_min.partial_cmp(&b.eta_min).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.driver.id.cmp(&b.driver.id))
        });

        Ok(candidates)
    }

    /// One batched `matrix` call for the whole candidate slate. Any routing failure
    /// — including the breaker denying the call outright — degrades the entire
    /// batch to straight-line ETA rather than letting one provider hiccup block
    /// dispatch (§4.C5: "fallback to straight-line when circuit is open").
    async fn fetch_eta_minutes(&self, pickup: (f64, f64), candidates: &[(Driver, DriverLocation, f64)]) -> Vec<f64> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let destinations: Vec<(f64, f64)> = candidates
            .iter()
            .map(|(_, loc, _)| (loc.snapped_lat, loc.snapped_lng))
            .collect();

        match self.routing.matrix(&[pickup], &destinations).await {
            Ok(rows) => rows
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(|leg| leg.duration_sec / 60.0)
                .collect(),
            Err(e) => {
                if matches!(e, RoutingError::CircuitOpen) {
                    tracing::debug!("routing circuit open, falling back to straight-line ETA");
                } else {
                    tracing::warn!(error = %e, "routing request failed, falling back to straight-line ETA");
                }
                candidates.iter().map(|(_, _, distance_km)| eta_minutes(*distance_km, 30.0)).collect()
            }
        }
    }

    /// Issues the next offer in the ranked slate for `trip_id`, skipping drivers who
    /// already have a terminal offer for this trip. Returns `None` when the slate
    /// (capped at `max_offers`) is exhausted.
    pub async fn issue_next_offer(
        &self,
        trip_id: Uuid,
        ranked: &[ScoredCandidate],
    ) -> DispatchResult<Option<TripOffer>> {
        let already_offered = self.offers.count_for_trip(trip_id).await?;
        if already_offered >= self.config.max_offers as i64 {
            return Ok(None);
        }

        let Some(next) = ranked.get(already_offered as usize) else {
            return Ok(None);
        };

        let expires_at = Utc::now() + chrono::Duration::seconds(self.config.offer_timeout_sec as i64);
        let offer = self
            .offers
            .create(trip_id, next.driver.id, next.score, next.eta_min, expires_at)
            .await?;
        Ok(Some(offer))
    }

    /// Driver accepts: CAS both the offer and the trip inside one transaction so a
    /// stale or already-decided offer loses cleanly instead of partially applying.
    pub async fn accept_offer(&self, offer_id: Uuid, driver_id: Uuid) -> DispatchResult<Trip> {
        let offer = self.offers.find_by_id(offer_id).await?;
        if offer.driver_id != driver_id {
            return Err(DispatchError::Forbidden);
        }
        if offer.status != OfferStatus::Pending || offer.expires_at < Utc::now() {
            return Err(DispatchError::OfferExpired);
        }

        let mut tx = self.trips.pool().begin().await.map_err(DispatchError::from)?;

        let offer_won = self.offers.cas_accept(&mut tx, offer_id).await?;
        if !offer_won {
            tx.rollback().await.ok();
            return Err(DispatchError::OfferExpired);
        }

        let trip_won = self.trips.cas_accept(&mut tx, offer.trip_id, driver_id).await?;
        if !trip_won {
            tx.rollback().await.ok();
            return Err(DispatchError::Conflict("trip already assigned".into()));
        }

        tx.commit().await.map_err(DispatchError::from)?;

        self.update_acceptance_rate(driver_id, true).await?;
        self.trips.find_by_id(offer.trip_id).await
    }

    pub async fn reject_offer(&self, offer_id: Uuid, driver_id: Uuid) -> DispatchResult<()> {
        let offer = self.offers.find_by_id(offer_id).await?;
        if offer.driver_id != driver_id {
            return Err(DispatchError::Forbidden);
        }
        self.offers.mark_rejected(offer_id).await?;
        self.update_acceptance_rate(driver_id, false).await?;
        Ok(())
    }

    pub async fn expire_offer(&self, offer_id: Uuid) -> DispatchResult<bool> {
        let offer = self.offers.find_by_id(offer_id).await?;
        let expired = self.offers.mark_expired(offer_id).await?;
        if expired {
            self.update_acceptance_rate(offer.driver_id, false).await?;
        }
        Ok(expired)
    }

    /// Rolling acceptance-rate feedback over the trailing N=50 terminal offers. The
    /// exact running window is maintained by the caller pre-aggregating; here we
    /// apply a simple exponential blend toward 1.0/0.0 as an approximation of the
    /// windowed average without a separate offers-history table scan on every call.
    async fn update_acceptance_rate(&self, driver_id: Uuid, accepted: bool) -> DispatchResult<()> {
        const WINDOW: f64 = 50.0;
        let driver = self.drivers.find_by_id(driver_id).await?;
        let outcome = if accepted { 1.0 } else { 0.0 };
        let updated = driver.acceptance_rate + (outcome - driver.acceptance_rate) / WINDOW;
        self.drivers
            .set_acceptance_rate(driver_id, updated.clamp(0.0, 1.0), accepted)
            .await
    }

    /// Drives one step of the sequential-offer protocol for `trip_id`: scores every
    /// online driver for the trip's service type, issues the next offer in rank
    /// order, and — when the slate is exhausted — cancels the trip for
    /// `NO_DRIVERS_AVAILABLE` (§4.C8's cap on `maxOffers`). Called on initial
    /// dispatch, and again after each reject/expiry.
    pub async fn dispatch_trip(&self, trip_id: Uuid) -> DispatchResult<Option<TripOffer>> {
        let trip = self.trips.find_by_id(trip_id).await?;
        let pairs = self
            .drivers
            .list_online(Some(&trip.service_type), self.config.max_deviation_strikes)
            .await?;
        let driver_ids: Vec<Uuid> = pairs.iter().map(|(d, _)| d.id).collect();

        let candidates = self
            .find_candidates((trip.pickup_lat, trip.pickup_lng), Some(&trip.service_type), &driver_ids)
            .await?;

        let offer = self.issue_next_offer(trip_id, &candidates).await?;
        if offer.is_none() {
            self.trips.cas_status(trip_id, trip.status, TripStatus::Cancelled).await?;
        }
        Ok(offer)
    }

    pub async fn geohash_tiles_for_radius(&self, pickup: (f64, f64)) -> Vec<String> {
        let center = geohash::encode(pickup.0, pickup.1, self.config.geohash_precision);
        geohash::neighbors(&center)
    }

    pub fn trips(&self) -> &TripRepository {
        &self.trips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(rating: f64, acceptance_rate: f64, service_type: &str) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: crate::models::DriverStatus::Online,
            service_type: service_type.into(),
            plate_number: "ABC-123".into(),
            credit_balance: 10,
            credit_expires_at: None,
            base_fare: 2.0,
            per_km_rate: 1.0,
            city: "city".into(),
            province: "province".into(),
            stripe_account_id: None,
            rating,
            acceptance_rate,
            last_accepted_at: None,
            suspended_until: None,
        }
    }

    #[test]
    fn higher_rating_and_acceptance_scores_higher_at_equal_eta() {
        let config = DispatchConfig::default();
        let weak = score_candidate(&driver(3.0, 0.2, "economy"), 8.0, None, &config);
        let strong = score_candidate(&driver(5.0, 1.0, "economy"), 8.0, None, &config);
        assert!(strong.score > weak.score);
    }

    #[test]
    fn service_match_bonus_breaks_a_tie() {
        let config = DispatchConfig::default();
        let matched = score_candidate(&driver(4.0, 0.5, "premium"), 8.0, Some("premium"), &config);
        let unmatched = score_candidate(&driver(4.0, 0.5, "economy"), 8.0, Some("premium"), &config);
        assert!(matched.score > unmatched.score);
    }
}
