//! Location service: GPS anomaly filtering and road-snap persistence (§4.C3).
//!
//! A driver's reported position is never trusted as-is. It is checked against the
//! last known good position for a teleport or implied-speed anomaly, and (when a
//! route is known) against perpendicular deviation from that route. Anomalous
//! readings are counted but never allowed to move the snapped position that the
//! spatial pub/sub layer broadcasts to riders.

use chrono::Utc;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::db::driver_repo::DriverRepository;
use crate::distance::{haversine_km, perpendicular_distance_m};
use crate::errors::DispatchResult;
use crate::models::DriverLocation;

/// Result of processing one raw GPS fix.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LocationUpdate {
    pub snapped_lat: f64,
    pub snapped_lng: f64,
    pub flagged: bool,
    pub anomaly_count: u32,
}

pub struct LocationService {
    drivers: DriverRepository,
    config: DispatchConfig,
}

impl LocationService {
    pub fn new(drivers: DriverRepository, config: DispatchConfig) -> Self {
        Self { drivers, config }
    }

    /// Process a raw fix for `driver_id`. Road-snapping itself (map-matching to the
    /// nearest road segment) is treated here as the identity function on the raw
    /// point when no active route is known, since a dedicated map-matching service is
    /// out of this crate's scope; the anomaly rules are the part under test.
    pub async fn update_driver_location(
        &self,
        driver_id: Uuid,
        raw_lat: f64,
        raw_lng: f64,
        bearing: Option<f64>,
        route: Option<&[(f64, f64)]>,
    ) -> DispatchResult<LocationUpdate> {
        let previous = self.drivers.find_location(driver_id).await?;

        let (flagged, deviation_m) = match &previous {
            Some(prev) => self.check_anomaly(prev, raw_lat, raw_lng, route),
            None => (false, 0.0),
        };

        let anomaly_count = match &previous {
            Some(prev) if flagged => prev.anomaly_count + 1,
            Some(prev) => {
                if prev.anomaly_count > 0 && deviation_m <= self.config.max_deviation_m {
                    0
                } else {
                    prev.anomaly_count
                }
            }
            None => 0,
        };

        if flagged {
            // A flagged reading is recorded (the counter persists) but must not move
            // the snapped position riders see.
            self.drivers.record_anomaly(driver_id, anomaly_count).await?;
            let prev = previous.expect("flagged requires a previous fix");
            return Ok(LocationUpdate {
                snapped_lat: prev.snapped_lat,
                snapped_lng: prev.snapped_lng,
                flagged: true,
                anomaly_count,
            });
        }

        self.drivers
            .upsert_location(
                driver_id, raw_lat, raw_lng, raw_lat, raw_lng, bearing, deviation_m, anomaly_count,
            )
            .await?;

        Ok(LocationUpdate {
            snapped_lat: raw_lat,
            snapped_lng: raw_lng,
            flagged: false,
            anomaly_count,
        })
    }

    /// Returns `(flagged, deviation_m)`. A reading is flagged if it teleports, implies
    /// an impossible speed, or — after `max_deviation_strikes` consecutive readings —
    /// has drifted too far from the known route.
    fn check_anomaly(
        &self,
        prev: &DriverLocation,
        raw_lat: f64,
        raw_lng: f64,
        route: Option<&[(f64, f64)]>,
    ) -> (bool, f64) {
        let jump_km = haversine_km(prev.snapped_lat, prev.snapped_lng, raw_lat, raw_lng);
        let elapsed_s = (Utc::now() - prev.updated_at).num_milliseconds() as f64 / 1000.0;
        let elapsed_s = elapsed_s.max(0.001);

        if jump_km > self.config.max_jump_km && elapsed_s < 30.0 {
            return (true, 0.0);
        }

        let implied_speed_kmh = jump_km / (elapsed_s / 3600.0);
        if implied_speed_kmh > self.config.max_speed_kmh {
            return (true, 0.0);
        }

        let deviation_m = match route {
            Some(points) if points.len() >= 2 => points
                .windows(2)
                .map(|seg| perpendicular_distance_m((raw_lat, raw_lng), seg[0], seg[1]))
                .fold(f64::INFINITY, f64::min),
            _ => 0.0,
        };

        if deviation_m > self.config.max_deviation_m
            && prev.anomaly_count + 1 >= self.config.max_deviation_strikes
        {
            return (true, deviation_m);
        }

        (false, deviation_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(config: DispatchConfig, prev: DriverLocation, route: Option<&[(f64, f64)]>) -> (bool, f64) {
        let svc = LocationService { drivers: DriverRepository::new(never_used_pool()), config };
        svc.check_anomaly(&prev, prev.raw_lat + 0.2, prev.raw_lng, route)
    }

    fn never_used_pool() -> crate::db::Pool {
        // `check_anomaly` performs no I/O; this pool is never dereferenced in these
        // tests, only held by value to satisfy `DriverRepository::new`'s signature.
        sqlx::Pool::connect_lazy("postgres://unused/unused").expect("lazy pool never connects")
    }

    fn base_location() -> DriverLocation {
        DriverLocation {
            driver_id: Uuid::new_v4(),
            raw_lat: 40.7128,
            raw_lng: -74.0060,
            snapped_lat: 40.7128,
            snapped_lng: -74.0060,
            bearing: None,
            deviation_m: 0.0,
            anomaly_count: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn large_jump_within_window_is_flagged() {
        let config = DispatchConfig::default();
        let prev = base_location();
        let (flagged, _) = fixture(config, prev, None);
        assert!(flagged, "a ~22km jump should exceed max_jump_km");
    }

    #[test]
    fn small_jump_is_not_flagged() {
        let config = DispatchConfig::default();
        let mut prev = base_location();
        prev.updated_at = Utc::now() - chrono::Duration::seconds(10);
        let svc = LocationService { drivers: DriverRepository::new(never_used_pool()), config };
        let (flagged, _) = svc.check_anomaly(&prev, prev.raw_lat + 0.0005, prev.raw_lng, None);
        assert!(!flagged);
    }
}
