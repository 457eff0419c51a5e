//! The `RoutingClient` trait and its concrete HTTP implementation.
//!
//! `HttpRoutingClient` wraps `reqwest::Client` (async — this crate runs entirely
//! inside a Tokio multi-threaded runtime) behind the circuit breaker and cache from
//! this module. There is no silent haversine fallback on failure: a denied or failed
//! request surfaces as `RoutingError`/`DispatchError::RoutingUnavailable` so the
//! caller can decide how to degrade.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::breaker::{Admission, CircuitBreaker};
use super::cache::RouteCache;
use super::error::RoutingError;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub distance_km: f64,
    pub duration_sec: f64,
    pub polyline: Vec<(f64, f64)>,
}

#[async_trait]
pub trait RoutingClient: Send + Sync {
    async fn directions(&self, from: (f64, f64), to: (f64, f64)) -> Result<RouteResult, RoutingError>;

    /// Pairwise distance/duration between every origin and every destination, used by
    /// the dispatch engine to batch-score a candidate slate in one provider call.
    async fn matrix(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<Vec<Vec<RouteResult>>, RoutingError>;
}

pub struct HttpRoutingClient {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
    cache: RouteCache,
}

impl HttpRoutingClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        circuit_threshold: u32,
        circuit_reset: Duration,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds with a valid timeout"),
            base_url: base_url.into(),
            breaker: CircuitBreaker::new(circuit_threshold, circuit_reset),
            cache: RouteCache::new(cache_capacity, cache_ttl),
        }
    }

    async fn fetch_directions(&self, from: (f64, f64), to: (f64, f64)) -> Result<RouteResult, RoutingError> {
        #[derive(Deserialize)]
        struct Leg {
            distance_km: f64,
            duration_sec: f64,
            polyline: Vec<(f64, f64)>,
        }

        let resp = self
            .http
            .get(format!("{}/route", self.base_url))
            .query(&[
                ("from_lat", from.0),
                ("from_lng", from.1),
                ("to_lat", to.0),
                ("to_lng", to.1),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RoutingError::Provider(format!(
                "provider returned status {}",
                resp.status()
            )));
        }

        let leg: Leg = resp.json().await?;
        Ok(RouteResult {
            distance_km: leg.distance_km,
            duration_sec: leg.duration_sec,
            polyline: leg.polyline,
        })
    }
}

#[async_trait]
impl RoutingClient for HttpRoutingClient {
    async fn directions(&self, from: (f64, f64), to: (f64, f64)) -> Result<RouteResult, RoutingError> {
        if let Some(cached) = self.cache.get(from, to) {
            return Ok(cached);
        }

        match self.breaker.admit() {
            Admission::Denied => return Err(RoutingError::CircuitOpen),
            Admission::Allowed | Admission::Probe => {}
        }

        match self.fetch_directions(from, to).await {
            Ok(result) => {
                self.breaker.record_success();
                self.cache.put(from, to, result.clone());
                Ok(result)
            }
            Err(err) => {
                // Alerting on the transition is a messaging (C7) concern this module
                // must not depend on; emit a structured warning and let whatever
                // ingests logs (or the dispatch engine, which polls `is_open`) raise
                // the actual admin alert.
                if self.breaker.record_failure() {
                    tracing::warn!(base_url = %self.base_url, "routing circuit breaker opened");
                }
                Err(err)
            }
        }
    }

    async fn matrix(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<Vec<Vec<RouteResult>>, RoutingError> {
        let mut rows = Vec::with_capacity(origins.len());
        for &origin in origins {
            let mut row = Vec::with_capacity(destinations.len());
            for &dest in destinations {
                row.push(self.directions(origin, dest).await?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}
