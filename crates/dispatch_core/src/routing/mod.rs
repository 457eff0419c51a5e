//! Routing client: directions/ETA from an external provider, wrapped in a circuit
//! breaker and an LRU/TTL cache (§4.C5).

pub mod breaker;
pub mod cache;
pub mod client;
pub mod error;

pub use breaker::CircuitBreaker;
pub use cache::RouteCache;
pub use client::{HttpRoutingClient, RouteResult, RoutingClient};
pub use error::RoutingError;
