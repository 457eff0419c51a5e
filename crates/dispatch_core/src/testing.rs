//! In-memory fakes behind the same traits production code uses (§4.C18), so the
//! dispatch engine, OTP service, and messaging pipeline can be exercised without a
//! live routing provider, WhatsApp/SMS account, or HTTP auth service.
//!
//! Pure-logic modules (geohash, distance, scoring, the state machine's transition
//! table, anomaly detection) need none of this — they're tested directly in their
//! own `#[cfg(test)]` modules.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::{AuthContext, AuthError, TokenVerifier};
use crate::messaging::{MessageProvider, MessagingError};
use crate::models::Role;
use crate::routing::{RouteResult, RoutingClient, RoutingError};

/// Returns a fixed route for every request; records every call for assertions.
pub struct FakeRoutingClient {
    pub fixed_result: RouteResult,
    pub calls: Mutex<Vec<((f64, f64), (f64, f64))>>,
    pub fail_next: Mutex<bool>,
}

impl FakeRoutingClient {
    pub fn new(fixed_result: RouteResult) -> Self {
        Self {
            fixed_result,
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("fake routing client mutex poisoned").len()
    }
}

#[async_trait]
impl RoutingClient for FakeRoutingClient {
    async fn directions(&self, from: (f64, f64), to: (f64, f64)) -> Result<RouteResult, RoutingError> {
        self.calls.lock().expect("fake routing client mutex poisoned").push((from, to));
        let mut fail_next = self.fail_next.lock().expect("fake routing client mutex poisoned");
        if *fail_next {
            *fail_next = false;
            return Err(RoutingError::Provider("forced failure".into()));
        }
        Ok(self.fixed_result.clone())
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

/// Records every send; never performs I/O. `next_message_id` lets a test assert on
/// the id the caller persists via `set_message_id`/delivery tracking.
pub struct FakeMessageProvider {
    pub sent: Mutex<Vec<(String, String)>>,
    pub next_message_id: Mutex<u64>,
    pub should_fail: Mutex<bool>,
}

impl Default for FakeMessageProvider {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1),
            should_fail: Mutex::new(false),
        }
    }
}

impl FakeMessageProvider {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("fake message provider mutex poisoned").len()
    }
}

#[async_trait]
impl MessageProvider for FakeMessageProvider {
    async fn send_template(
        &self,
        to: &str,
        _template: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MessagingError> {
        let body = params.iter().map(|(_, v)| *v).collect::<Vec<_>>().join(",");
        self.send_text(to, &body).await
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, MessagingError> {
        if *self.should_fail.lock().expect("fake message provider mutex poisoned") {
            return Err(MessagingError::Rejected("forced failure".into()));
        }
        self.sent
            .lock()
            .expect("fake message provider mutex poisoned")
            .push((to.to_string(), body.to_string()));
        let mut next_id = self.next_message_id.lock().expect("fake message provider mutex poisoned");
        let id = format!("fake-msg-{next_id}");
        *next_id += 1;
        Ok(id)
    }
}

/// Accepts a fixed, test-supplied token and returns the matching `AuthContext`;
/// anything else is `AuthError::Invalid`.
pub struct FakeTokenVerifier {
    pub tokens: std::collections::HashMap<String, AuthContext>,
}

impl FakeTokenVerifier {
    pub fn new() -> Self {
        Self {
            tokens: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, token: impl Into<String>, user_id: Uuid, role: Role, driver_id: Option<Uuid>) {
        self.tokens.insert(token.into(), AuthContext { user_id, role, driver_id });
    }
}

impl Default for FakeTokenVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenVerifier for FakeTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.tokens.get(token).copied().ok_or(AuthError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_token_verifier_accepts_registered_token() {
        let mut verifier = FakeTokenVerifier::new();
        let user_id = Uuid::new_v4();
        verifier.register("tok123", user_id, Role::Rider, None);
        let ctx = verifier.verify("tok123").await.expect("token registered");
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.role, Role::Rider);
    }

    #[tokio::test]
    async fn fake_token_verifier_rejects_unknown_token() {
        let verifier = FakeTokenVerifier::new();
        assert!(verifier.verify("nope").await.is_err());
    }

    #[tokio::test]
    async fn fake_message_provider_records_sent_messages() {
        let provider = FakeMessageProvider::default();
        provider.send_text("+15551234567", "hello").await.expect("send succeeds");
        assert_eq!(provider.sent_count(), 1);
    }

    #[tokio::test]
    async fn fake_routing_client_returns_fixed_result_and_counts_calls() {
        let client = FakeRoutingClient::new(RouteResult {
            distance_km: 5.0,
            duration_sec: 300.0,
            polyline: vec![],
        });
        let result = client.directions((0.0, 0.0), (1.0, 1.0)).await.expect("fake never fails by default");
        assert_eq!(result.distance_km, 5.0);
        assert_eq!(client.call_count(), 1);
    }
}
