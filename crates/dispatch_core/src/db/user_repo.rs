//! User repository: the `User` aggregate, looked up by phone on the OTP-verified
//! authentication path (§4.C6/§4.C13).

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{Role, User};

use super::Pool;

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool,
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> DispatchResult<User> {
    let role_str: String = row.try_get("role").map_err(DispatchError::from)?;
    let role = Role::parse(&role_str).ok_or_else(|| DispatchError::internal_msg("bad user role"))?;
    Ok(User {
        id: row.try_get("id").map_err(DispatchError::from)?,
        phone: row.try_get("phone").map_err(DispatchError::from)?,
        role,
        name: row.try_get("name").map_err(DispatchError::from)?,
        email: row.try_get("email").map_err(DispatchError::from)?,
    })
}

impl UserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn find_by_phone(&self, phone: &str) -> DispatchResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> DispatchResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("user".into()))?;
        row_to_user(&row)
    }

    /// First-touch registration: the OTP flow never asks for a password or profile,
    /// so a phone that verifies for the first time gets a bare `User` row on the
    /// spot, defaulting to `Role::Rider` unless the caller asks for `Role::Driver`
    /// (the signup-as-driver path still lands here before the `drivers` row exists).
    pub async fn find_or_create_by_phone(&self, phone: &str, default_role: Role) -> DispatchResult<User> {
        if let Some(existing) = self.find_by_phone(phone).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO users (id, phone, role, name, email) VALUES ($1, $2, $3, NULL, NULL)
             ON CONFLICT (phone) DO UPDATE SET phone = EXCLUDED.phone
             RETURNING *",
        )
        .bind(id)
        .bind(phone)
        .bind(default_role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;

        row_to_user(&row)
    }
}
