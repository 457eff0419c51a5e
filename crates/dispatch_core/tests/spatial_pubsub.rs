//! Integration coverage for the spatial pub/sub substrate (§4.C4): room-scoped
//! delivery across two riders at very different locations, and the contract that no
//! event is ever visible to every connection at once.

use dispatch_core::spatial::{ConnectionId, RoomBroker, RoomKey, SpatialRegistry};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

fn join(registry: &SpatialRegistry, room: RoomKey) -> (ConnectionId, mpsc::UnboundedReceiver<serde_json::Value>) {
    let conn = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    registry.join(room, conn, tx);
    (conn, rx)
}

/// Driver in New York, one rider nearby, one rider in Los Angeles. Only the nearby
/// rider's geohash tile overlaps the driver's broadcast neighborhood.
#[test]
fn only_the_nearby_rider_receives_the_location_update() {
    let registry = SpatialRegistry::new();

    let driver_hash = dispatch_core::geohash::encode(40.7128, -74.0060, 6);
    let nearby_hash = dispatch_core::geohash::encode(40.7130, -74.0062, 6);
    let far_hash = dispatch_core::geohash::encode(34.0522, -118.2437, 6);

    let (_nearby_conn, mut nearby_rx) = join(&registry, RoomKey::Geo(nearby_hash.clone()));
    let (_far_conn, mut far_rx) = join(&registry, RoomKey::Geo(far_hash));

    assert!(
        dispatch_core::geohash::neighbors(&driver_hash).contains(&nearby_hash),
        "fixture invariant: the nearby rider's tile must be a neighbor of the driver's tile"
    );

    registry
        .emit_to_tile_neighborhood(&driver_hash, json!({"type": "driver:location:update"}))
        .expect("emitting to a concrete tile neighborhood is always allowed");

    assert!(nearby_rx.try_recv().is_ok(), "nearby rider should receive the update");
    assert!(far_rx.try_recv().is_err(), "distant rider must not receive the update");
}

#[test]
fn disconnecting_a_client_stops_further_delivery() {
    let registry = SpatialRegistry::new();
    let room = RoomKey::Driver(Uuid::new_v4());
    let (conn, mut rx) = join(&registry, room.clone());

    registry.emit(&room, json!({"seq": 1})).unwrap();
    assert!(rx.try_recv().is_ok());

    registry.leave_all(conn);
    registry.emit(&room, json!({"seq": 2})).unwrap();
    assert!(rx.try_recv().is_err(), "no events should reach a disconnected connection");
}

#[test]
fn per_room_delivery_preserves_send_order() {
    let registry = SpatialRegistry::new();
    let room = RoomKey::Admin;
    let (_conn, mut rx) = join(&registry, room.clone());

    for seq in 0..5 {
        registry.emit(&room, json!({"seq": seq})).unwrap();
    }

    for expected in 0..5 {
        let event = rx.try_recv().expect("event should be queued in order");
        assert_eq!(event["seq"], expected);
    }
}

#[test]
fn global_broadcast_attempts_fail_loudly_instead_of_fanning_out() {
    let registry = SpatialRegistry::new();
    let (_conn_a, _rx_a) = join(&registry, RoomKey::Driver(Uuid::new_v4()));
    let (_conn_b, _rx_b) = join(&registry, RoomKey::User(Uuid::new_v4()));

    let result = registry.emit(&RoomKey::Geo(String::new()), json!({"type": "should_never_go_out"}));
    assert!(result.is_err());
}
