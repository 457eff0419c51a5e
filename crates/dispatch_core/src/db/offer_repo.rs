//! Offer repository: database operations for the `TripOffer` aggregate.
//!
//! Enforces, via the unique partial index declared in the migrations, that at most
//! one `PENDING` offer exists per trip at a time (§3's sequential-offer invariant).

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{OfferStatus, TripOffer};

use super::Pool;

#[derive(Clone)]
pub struct OfferRepository {
    pool: Pool,
}

fn row_to_offer(row: &sqlx::postgres::PgRow) -> DispatchResult<TripOffer> {
    let status_str: String = row.try_get("status").map_err(DispatchError::from)?;
    let status = OfferStatus::parse(&status_str)
        .ok_or_else(|| DispatchError::internal_msg("bad offer status"))?;
    Ok(TripOffer {
        id: row.try_get("id").map_err(DispatchError::from)?,
        trip_id: row.try_get("trip_id").map_err(DispatchError::from)?,
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        score: row.try_get("score").map_err(DispatchError::from)?,
        eta_min: row.try_get("eta_min").map_err(DispatchError::from)?,
        status,
        created_at: row.try_get("created_at").map_err(DispatchError::from)?,
        expires_at: row.try_get("expires_at").map_err(DispatchError::from)?,
        responded_at: row.try_get("responded_at").map_err(DispatchError::from)?,
    })
}

impl OfferRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        score: f64,
        eta_min: f64,
        expires_at: DateTime<Utc>,
    ) -> DispatchResult<TripOffer> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO trip_offers (id, trip_id, driver_id, score, eta_min, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', now(), $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(trip_id)
        .bind(driver_id)
        .bind(score)
        .bind(eta_min)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row_to_offer(&row)
    }

    pub async fn find_by_id(&self, offer_id: Uuid) -> DispatchResult<TripOffer> {
        let row = sqlx::query("SELECT * FROM trip_offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("offer".into()))?;
        row_to_offer(&row)
    }

    pub async fn find_pending_for_trip_and_driver(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
    ) -> DispatchResult<Option<TripOffer>> {
        let row = sqlx::query(
            "SELECT * FROM trip_offers WHERE trip_id = $1 AND driver_id = $2 AND status = 'PENDING'",
        )
        .bind(trip_id)
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_offer).transpose()
    }

    pub async fn count_for_trip(&self, trip_id: Uuid) -> DispatchResult<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM trip_offers WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.try_get("n").map_err(DispatchError::from)
    }

    /// Backs the admin `GET /dispatch/offers` listing: every offer still awaiting a
    /// driver response, most recently created first.
    pub async fn list_pending(&self) -> DispatchResult<Vec<TripOffer>> {
        let rows = sqlx::query("SELECT * FROM trip_offers WHERE status = 'PENDING' ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        rows.iter().map(row_to_offer).collect()
    }

    /// CAS accept within the caller's transaction: affects exactly 1 row iff this
    /// offer was still `PENDING`.
    pub async fn cas_accept(&self, tx: &mut super::Tx<'_>, offer_id: Uuid) -> DispatchResult<bool> {
        let result = sqlx::query(
            "UPDATE trip_offers SET status = 'ACCEPTED', responded_at = now() WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(offer_id)
        .execute(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_rejected(&self, offer_id: Uuid) -> DispatchResult<bool> {
        let result = sqlx::query(
            "UPDATE trip_offers SET status = 'REJECTED', responded_at = now() WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(offer_id)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_expired(&self, offer_id: Uuid) -> DispatchResult<bool> {
        let result = sqlx::query(
            "UPDATE trip_offers SET status = 'EXPIRED', responded_at = now() WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(offer_id)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }
}
