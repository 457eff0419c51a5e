//! Haversine distance and ETA estimation over raw `(lat, lng)` pairs.
//!
//! This crate is geohash-indexed rather than H3-indexed, so distances are computed
//! directly from coordinates instead of a cell-grid distance.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (lng2 - lng1).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Estimate travel time in minutes from a distance and an assumed average speed.
pub fn eta_minutes(distance_km: f64, assumed_speed_kmh: f64) -> f64 {
    if assumed_speed_kmh <= 0.0 {
        return f64::INFINITY;
    }
    (distance_km / assumed_speed_kmh) * 60.0
}

/// Perpendicular distance in meters from `point` to the line segment `a`-`b`, used by
/// the deviation anomaly rule. Falls back to the nearer endpoint distance when the
/// segment has zero length.
pub fn perpendicular_distance_m(point: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    // Work in an equirectangular local projection around `a`; adequate for the
    // sub-kilometer distances this check is used for.
    let lat0 = a.0.to_radians();
    let km_per_deg_lat = 110.574;
    let km_per_deg_lng = 111.320 * lat0.cos();

    let to_xy = |p: (f64, f64)| -> (f64, f64) {
        (
            (p.1 - a.1) * km_per_deg_lng,
            (p.0 - a.0) * km_per_deg_lat,
        )
    };

    let (ax, ay) = (0.0_f64, 0.0_f64);
    let (bx, by) = to_xy(b);
    let (px, py) = to_xy(point);

    let seg_len_sq = (bx - ax).powi(2) + (by - ay).powi(2);
    if seg_len_sq < 1e-12 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt() * 1000.0;
    }

    let t = (((px - ax) * (bx - ax) + (py - ay) * (by - ay)) / seg_len_sq).clamp(0.0, 1.0);
    let proj_x = ax + t * (bx - ax);
    let proj_y = ay + t * (by - ay);
    ((px - proj_x).powi(2) + (py - proj_y).powi(2)).sqrt() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(haversine_km(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn known_distance_new_york_los_angeles() {
        // ~3936 km great-circle distance, well-known reference pair.
        let d = haversine_km(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((d - 3936.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn eta_scales_inversely_with_speed() {
        let slow = eta_minutes(10.0, 20.0);
        let fast = eta_minutes(10.0, 40.0);
        assert!(fast < slow);
        assert!((fast * 2.0 - slow).abs() < 1e-9);
    }

    #[test]
    fn eta_zero_speed_is_infinite() {
        assert!(eta_minutes(10.0, 0.0).is_infinite());
    }

    #[test]
    fn perpendicular_distance_zero_on_segment() {
        let d = perpendicular_distance_m((0.0005, 0.0), (0.0, 0.0), (0.001, 0.0));
        assert!(d < 1.0, "point on segment should be ~0m away, got {d}");
    }

    #[test]
    fn perpendicular_distance_positive_off_segment() {
        let d = perpendicular_distance_m((0.001, 0.001), (0.0, 0.0), (0.002, 0.0));
        assert!(d > 50.0, "point ~100m off segment, got {d}");
    }
}
