//! # Ride-Hailing Dispatch Core
//!
//! The real-time dispatch and trip lifecycle core of a ride-hailing platform.
//!
//! ## Overview
//!
//! This crate provides the domain logic behind trip dispatch, independent of any
//! transport (HTTP/WebSocket lives in `dispatch_server`):
//!
//! - **Geohash indexing**: tile encoding and neighbor computation for spatial fan-out
//! - **Location service**: GPS anomaly filtering and road-snap persistence
//! - **Spatial pub/sub**: room membership and per-room ordered delivery
//! - **Routing client**: directions/ETA behind a circuit breaker and TTL cache
//! - **OTP service**: atomic issuance, rate limiting, lockout
//! - **Messaging delivery**: templated sends with backoff retry and webhook ingest
//! - **Dispatch engine**: candidate scoring and sequential exclusive offers
//! - **Trip state machine**: guarded, ownership-checked status transitions
//! - **Settlement**: atomic fare debit and commission split
//! - **Reconciliation**: daily DB/provider aggregate comparison
//! - **Driver credit ledger**: append-only grants/deductions
//!
//! ## Key concepts
//!
//! - **CAS transitions**: every status change is `UPDATE ... WHERE status = <expected>`;
//!   zero affected rows means the caller lost a race, not a bug.
//! - **No authoritative in-process state**: the database is the only source of truth for
//!   anything money- or status-related. In-process caches (routing LRU, circuit breaker
//!   state, room registry) are allowed to be stale or per-instance.
//! - **Collaborators are traits**: the routing provider, the messaging provider, and the
//!   database pool are all behind traits so the engine can be driven by fakes in tests.

pub mod auth;
pub mod config;
pub mod credit_ledger;
pub mod db;
pub mod dispatch;
pub mod distance;
pub mod errors;
pub mod geohash;
pub mod location;
pub mod messaging;
pub mod models;
pub mod otp;
pub mod reconciliation;
pub mod routing;
pub mod scheduling;
pub mod settlement;
pub mod spatial;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trip;
