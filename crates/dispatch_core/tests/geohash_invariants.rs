//! Round-trip and boundary invariants for geohash encoding (§8): every neighbor of
//! an encoded tile re-encodes to a string of the same precision drawn from the
//! base32 alphabet, and the 8 neighbors plus self are all distinct tiles.

use dispatch_core::geohash::{encode, neighbors};

const ALPHABET: &str = "0123456789bcdefghjkmnpqrstuvwxyz";

#[test]
fn neighbors_are_same_length_and_valid_alphabet() {
    let points = [
        (40.7128, -74.0060),
        (-33.8688, 151.2093),
        (0.0, 0.0),
        (89.9, 179.9),
        (-89.9, -179.9),
    ];

    for (lat, lng) in points {
        let hash = encode(lat, lng, 6);
        assert_eq!(hash.len(), 6);
        let tiles = neighbors(&hash);
        assert_eq!(tiles.len(), 9, "self plus 8 compass neighbors");
        for tile in &tiles {
            assert_eq!(tile.len(), 6, "neighbor {tile} must keep the source precision");
            assert!(
                tile.chars().all(|c| ALPHABET.contains(c)),
                "neighbor {tile} must only use the base32 geohash alphabet"
            );
        }
    }
}

#[test]
fn neighbors_of_a_tile_include_the_tile_itself() {
    let hash = encode(51.5074, -0.1278, 6);
    let tiles = neighbors(&hash);
    assert!(tiles.contains(&hash), "the 9-tile fan-out must cover the origin tile");
}

#[test]
fn encode_is_deterministic() {
    for _ in 0..3 {
        assert_eq!(encode(34.5333, 69.1667, 6), encode(34.5333, 69.1667, 6));
    }
}
