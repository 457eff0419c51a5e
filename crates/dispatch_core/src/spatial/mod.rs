//! Spatial pub/sub: room membership and per-room ordered delivery (§4.C4).

pub mod registry;

pub use registry::{ConnectionId, RoomBroker, RoomKey, SpatialRegistry};
