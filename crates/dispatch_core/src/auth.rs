//! The pluggable authentication boundary (§1): this crate only needs `{userId,
//! role, driverId?}` out of a bearer token; decoding that token (JWT, OAuth
//! introspection, session lookup, ...) is explicitly the HTTP layer's concern.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    Invalid,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthContext, AuthError>;
}
