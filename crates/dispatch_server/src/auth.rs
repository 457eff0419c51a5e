//! The HTTP-layer half of the auth boundary (§1/§4.C13): decodes the bearer token
//! `dispatch_core::otp::mint_access_token` produced into the `AuthContext` the domain
//! layer needs. Token storage is in-process only — a horizontally scaled deployment
//! would swap this for a shared session store without touching `dispatch_core`.

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use dashmap::DashMap;
use dispatch_core::auth::{AuthContext, AuthError, TokenVerifier};
use dispatch_core::models::Role;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use dispatch_core::errors::DispatchError;

/// Concurrent, in-memory token → `AuthContext` map, mirroring the shape of
/// `dispatch_core::testing::FakeTokenVerifier` for production use.
#[derive(Default)]
pub struct InMemoryTokenVerifier {
    tokens: DashMap<String, AuthContext>,
}

impl InMemoryTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, user_id: Uuid, role: Role, driver_id: Option<Uuid>) {
        self.tokens.insert(token.into(), AuthContext { user_id, role, driver_id });
    }
}

#[async_trait]
impl TokenVerifier for InMemoryTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.tokens.get(token).map(|entry| *entry.value()).ok_or(AuthError::Invalid)
    }
}

/// Extracts the caller's `AuthContext` from the `Authorization: Bearer <token>`
/// header. Any route taking this as a handler argument rejects unauthenticated
/// requests before the handler body runs.
pub struct AuthUser(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(DispatchError::AuthRequired)?;

        let token = header.strip_prefix("Bearer ").ok_or(DispatchError::AuthRequired)?;

        let ctx = app_state
            .token_verifier()
            .verify(token)
            .await
            .map_err(|_| DispatchError::AuthRequired)?;

        Ok(AuthUser(ctx))
    }
}

/// Rejects with `403` unless the caller holds `role`.
pub fn require_role(ctx: &AuthContext, role: Role) -> Result<(), ApiError> {
    if ctx.role == role {
        Ok(())
    } else {
        Err(DispatchError::Forbidden.into())
    }
}
