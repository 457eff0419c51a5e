//! In-process room registry backing the spatial pub/sub substrate.
//!
//! Rooms are `user:{userId}`, `driver:{driverId}`, `geo:{hash}`, and `admin`.
//! Membership is a `DashMap<RoomKey, DashSet<ConnectionId>>`; delivery within a room
//! is FIFO per connection because each connection owns a single unbounded mpsc
//! channel and events are pushed onto it in call order.
//!
//! There is deliberately no API surface for broadcasting to every room at once — the
//! closest thing, an empty geohash key, is rejected by `validate_room` as a
//! programming error rather than silently fanned out to every tile.

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::geohash;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    User(Uuid),
    Driver(Uuid),
    Geo(String),
    Admin,
}

impl RoomKey {
    fn is_global_attempt(&self) -> bool {
        matches!(self, RoomKey::Geo(h) if h.is_empty())
    }
}

fn validate_room(room: &RoomKey) -> DispatchResult<()> {
    if room.is_global_attempt() {
        debug_assert!(false, "attempted global broadcast via empty geohash room key");
        return Err(DispatchError::internal_msg(
            "global broadcast is prohibited; target a specific room",
        ));
    }
    Ok(())
}

/// Abstracts the room registry so `dispatch_server`'s connection handler and tests
/// can swap in a cluster-aware broker (e.g. Redis pub/sub) without this crate
/// depending on it; the in-process `SpatialRegistry` is the only implementation
/// shipped here.
pub trait RoomBroker: Send + Sync {
    fn join(&self, room: RoomKey, conn: ConnectionId, sender: mpsc::UnboundedSender<Value>);
    fn leave(&self, room: &RoomKey, conn: ConnectionId);
    fn leave_all(&self, conn: ConnectionId);
    fn emit(&self, room: &RoomKey, event: Value) -> DispatchResult<()>;
    /// Emit to every tile in a precomputed neighbor set (the geohash 9-tile fan-out).
    fn emit_neighbors(&self, hashes: &[String], event: Value) -> DispatchResult<()>;
}

#[derive(Default)]
pub struct SpatialRegistry {
    rooms: DashMap<RoomKey, DashSet<ConnectionId>>,
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<Value>>,
    memberships: DashMap<ConnectionId, DashSet<RoomKey>>,
}

impl SpatialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_size(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map_or(0, |set| set.len())
    }

    /// Convenience used by the location-update flow: derive the 9-tile neighborhood
    /// around `hash` and emit to every one of them.
    pub fn emit_to_tile_neighborhood(&self, hash: &str, event: Value) -> DispatchResult<()> {
        let tiles = geohash::neighbors(hash);
        self.emit_neighbors(&tiles, event)
    }
}

impl RoomBroker for SpatialRegistry {
    fn join(&self, room: RoomKey, conn: ConnectionId, sender: mpsc::UnboundedSender<Value>) {
        self.senders.entry(conn).or_insert(sender);
        self.rooms.entry(room.clone()).or_default().insert(conn);
        self.memberships.entry(conn).or_default().insert(room);
    }

    fn leave(&self, room: &RoomKey, conn: ConnectionId) {
        if let Some(set) = self.rooms.get(room) {
            set.remove(&conn);
        }
        if let Some(set) = self.memberships.get(&conn) {
            set.remove(room);
        }
    }

    fn leave_all(&self, conn: ConnectionId) {
        if let Some((_, rooms)) = self.memberships.remove(&conn) {
            for room in rooms.iter() {
                if let Some(set) = self.rooms.get(room.key()) {
                    set.remove(&conn);
                }
            }
        }
        self.senders.remove(&conn);
    }

    fn emit(&self, room: &RoomKey, event: Value) -> DispatchResult<()> {
        validate_room(room)?;
        let Some(members) = self.rooms.get(room) else {
            return Ok(());
        };
        for conn_ref in members.iter() {
            let conn = *conn_ref.key();
            if let Some(sender) = self.senders.get(&conn) {
                // A closed receiver means the connection task already exited;
                // dropping the event here is the correct "cancellation on
                // disconnect" behavior, not an error worth propagating.
                let _ = sender.send(event.clone());
            }
        }
        Ok(())
    }

    fn emit_neighbors(&self, hashes: &[String], event: Value) -> DispatchResult<()> {
        for hash in hashes {
            self.emit(&RoomKey::Geo(hash.clone()), event.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_then_emit_delivers_to_member_only() {
        let registry = SpatialRegistry::new();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        registry.join(RoomKey::Driver(conn_a), conn_a, tx_a);
        registry.join(RoomKey::Driver(conn_b), conn_b, tx_b);

        registry
            .emit(&RoomKey::Driver(conn_a), json!({"type": "ping"}))
            .unwrap();

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn leave_all_removes_from_every_room() {
        let registry = SpatialRegistry::new();
        let conn = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join(RoomKey::Geo("u4pru".into()), conn, tx);
        assert_eq!(registry.room_size(&RoomKey::Geo("u4pru".into())), 1);

        registry.leave_all(conn);
        assert_eq!(registry.room_size(&RoomKey::Geo("u4pru".into())), 0);
    }

    #[test]
    fn empty_geohash_emit_is_rejected_not_broadcast() {
        let registry = SpatialRegistry::new();
        let result = registry.emit(&RoomKey::Geo(String::new()), json!({}));
        assert!(result.is_err(), "empty geohash must not silently broadcast globally");
    }

    #[test]
    fn emit_neighbors_reaches_all_nine_tiles() {
        let registry = SpatialRegistry::new();
        let hash = geohash::encode(40.7128, -74.0060, 6);
        let tiles = geohash::neighbors(&hash);
        let mut receivers = Vec::new();
        for tile in &tiles {
            let conn = Uuid::new_v4();
            let (tx, rx) = mpsc::unbounded_channel();
            registry.join(RoomKey::Geo(tile.clone()), conn, tx);
            receivers.push(rx);
        }

        registry.emit_to_tile_neighborhood(&hash, json!({"type": "driver:location"})).unwrap();

        for mut rx in receivers {
            assert!(rx.try_recv().is_ok());
        }
    }
}
