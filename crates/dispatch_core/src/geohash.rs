//! Geohash tile encoding and neighbor computation.
//!
//! Deterministic, no I/O. Base32 alphabet excludes `a, i, l, o` to avoid visual
//! confusion with `0, 1`: `0123456789bcdefghjkmnpqrstuvwxyz`.

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Default tile precision (~1.2km x 0.6km), matching §6's `GEOHASH_PRECISION`.
pub const DEFAULT_PRECISION: usize = 6;

fn char_index(c: u8) -> Option<u8> {
    BASE32.iter().position(|&b| b == c).map(|i| i as u8)
}

/// Encode a lat/lng pair into a base32 geohash string of the given precision.
///
/// `lat` must be in `[-90, 90]` and `lng` in `[-180, 180]`; out-of-range inputs are
/// clamped rather than panicking, since a GPS fix can momentarily be invalid.
pub fn encode(lat: f64, lng: f64, precision: usize) -> String {
    let lat = lat.clamp(-90.0, 90.0);
    let lng = lng.clamp(-180.0, 180.0);

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lng_range = (-180.0_f64, 180.0_f64);

    let mut out = String::with_capacity(precision);
    let mut bit = 0u8;
    let mut ch = 0u8;
    let mut even = true;

    while out.len() < precision {
        if even {
            let mid = (lng_range.0 + lng_range.1) / 2.0;
            if lng >= mid {
                ch |= 1 << (4 - bit);
                lng_range.0 = mid;
            } else {
                lng_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                ch |= 1 << (4 - bit);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }
        even = !even;

        if bit < 4 {
            bit += 1;
        } else {
            out.push(BASE32[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }

    out
}

/// Decode a geohash back to its bounding box `((lat_min, lat_max), (lng_min, lng_max))`.
fn bounds(hash: &str) -> ((f64, f64), (f64, f64)) {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lng_range = (-180.0_f64, 180.0_f64);
    let mut even = true;

    for c in hash.bytes() {
        let idx = char_index(c).unwrap_or(0);
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1;
            if even {
                let mid = (lng_range.0 + lng_range.1) / 2.0;
                if bit == 1 {
                    lng_range.0 = mid;
                } else {
                    lng_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if bit == 1 {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            even = !even;
        }
    }

    (lat_range, lng_range)
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Dir {
    N,
    S,
    E,
    W,
}

/// Standard row-carrying adjacent-tile algorithm: re-derive the tile's center from its
/// bounding box, nudge it a half-tile-width past the relevant edge, and re-encode at the
/// same precision. This correctly carries across base32 character boundaries (e.g. the
/// neighbor to the north of `u0` is `u1`, not an invalid perturbation of `u0`'s bits).
fn adjacent(hash: &str, dir: Dir) -> String {
    let precision = hash.len();
    let (lat_range, lng_range) = bounds(hash);
    let lat_span = lat_range.1 - lat_range.0;
    let lng_span = lng_range.1 - lng_range.0;
    let center_lat = (lat_range.0 + lat_range.1) / 2.0;
    let center_lng = (lng_range.0 + lng_range.1) / 2.0;

    let (nudge_lat, nudge_lng) = match dir {
        Dir::N => (lat_span, 0.0),
        Dir::S => (-lat_span, 0.0),
        Dir::E => (0.0, lng_span),
        Dir::W => (0.0, -lng_span),
    };

    let mut lat = center_lat + nudge_lat;
    let mut lng = center_lng + nudge_lng;

    // Wrap longitude around the antimeridian; clamp latitude at the poles rather than
    // wrapping (there is no tile north of the north pole).
    if lng > 180.0 {
        lng -= 360.0;
    } else if lng < -180.0 {
        lng += 360.0;
    }
    lat = lat.clamp(-90.0, 90.0);

    encode(lat, lng, precision)
}

/// Compute the 9-tile neighborhood of `hash`: the tile itself plus its 8 compass
/// neighbors (N, S, E, W, NE, NW, SE, SW), used as the spatial pub/sub fan-out set.
pub fn neighbors(hash: &str) -> Vec<String> {
    let n = adjacent(hash, Dir::N);
    let s = adjacent(hash, Dir::S);
    let e = adjacent(hash, Dir::E);
    let w = adjacent(hash, Dir::W);
    let ne = adjacent(&n, Dir::E);
    let nw = adjacent(&n, Dir::W);
    let se = adjacent(&s, Dir::E);
    let sw = adjacent(&s, Dir::W);

    let mut out = vec![
        hash.to_string(),
        n,
        s,
        e,
        w,
        ne,
        nw,
        se,
        sw,
    ];
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_deterministic_and_right_length() {
        let h1 = encode(34.5333, 69.1667, 6);
        let h2 = encode(34.5333, 69.1667, 6);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 6);
        assert!(h1.bytes().all(|b| BASE32.contains(&b)));
    }

    #[test]
    fn nearby_points_share_a_common_prefix() {
        let a = encode(40.7128, -74.0060, 6);
        let b = encode(40.71281, -74.00599, 6);
        assert_eq!(&a[..4], &b[..4], "points 10cm apart should share a coarse prefix");
    }

    #[test]
    fn neighbors_has_nine_unique_tiles_same_length() {
        let h = encode(40.7128, -74.0060, 6);
        let ns = neighbors(&h);
        assert_eq!(ns.len(), 9, "expected self + 8 neighbors, got {ns:?}");
        assert!(ns.contains(&h));
        for tile in &ns {
            assert_eq!(tile.len(), 6);
            assert!(tile.bytes().all(|b| BASE32.contains(&b)));
        }
    }

    #[test]
    fn neighbors_carry_across_tile_boundary() {
        // A point right at a tile edge must still produce 9 distinct, valid tiles
        // computed via the row-carrying algorithm, not bit perturbation.
        let h = encode(0.0, 0.0, 5);
        let ns = neighbors(&h);
        assert_eq!(ns.len(), 9);
    }

    #[test]
    fn invariant_6_neighbor_of_neighbor_contains_self_direction() {
        // boundary property used by the spatial pub/sub contract: a driver's own
        // tile is always among the neighbor set computed from itself.
        let h = encode(-33.8688, 151.2093, 6);
        let ns = neighbors(&h);
        assert!(ns.contains(&h));
    }

    #[test]
    fn poles_do_not_panic() {
        let h = encode(89.999, 179.999, 6);
        let ns = neighbors(&h);
        assert_eq!(ns.len(), 9);
    }
}
