//! Payout repository: the `Payout` aggregate. Payouts are keyed by an
//! idempotency key supplied by the caller (§4.C10/§8: retried payout requests
//! with the same key must not double-transfer).

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{Payout, PayoutStatus};

use super::Pool;

#[derive(Clone)]
pub struct PayoutRepository {
    pool: Pool,
}

fn row_to_payout(row: &sqlx::postgres::PgRow) -> DispatchResult<Payout> {
    let status_str: String = row.try_get("status").map_err(DispatchError::from)?;
    let status = PayoutStatus::parse(&status_str)
        .ok_or_else(|| DispatchError::internal_msg("bad payout status"))?;
    Ok(Payout {
        id: row.try_get("id").map_err(DispatchError::from)?,
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        amount: row.try_get("amount").map_err(DispatchError::from)?,
        status,
        stripe_transfer_id: row.try_get("stripe_transfer_id").map_err(DispatchError::from)?,
        idempotency_key: row.try_get("idempotency_key").map_err(DispatchError::from)?,
        failure_reason: row.try_get("failure_reason").map_err(DispatchError::from)?,
    })
}

impl PayoutRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Looks up an existing payout by idempotency key first; returns it unchanged if
    /// present so a retried request is a no-op rather than a second transfer.
    pub async fn find_by_idempotency_key(&self, key: &str) -> DispatchResult<Option<Payout>> {
        let row = sqlx::query("SELECT * FROM payouts WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_payout).transpose()
    }

    pub async fn create_pending(
        &self,
        driver_id: Uuid,
        amount: f64,
        idempotency_key: &str,
        status: PayoutStatus,
    ) -> DispatchResult<Payout> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO payouts (id, driver_id, amount, status, idempotency_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(driver_id)
        .bind(amount)
        .bind(status.as_str())
        .bind(idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row_to_payout(&row)
    }

    pub async fn mark_completed(&self, id: Uuid, stripe_transfer_id: &str) -> DispatchResult<()> {
        sqlx::query(
            "UPDATE payouts SET status = 'COMPLETED', stripe_transfer_id = $1 WHERE id = $2",
        )
        .bind(stripe_transfer_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> DispatchResult<()> {
        sqlx::query("UPDATE payouts SET status = 'FAILED', failure_reason = $1 WHERE id = $2")
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    pub async fn list_pending_manual_review(&self) -> DispatchResult<Vec<Payout>> {
        let rows = sqlx::query("SELECT * FROM payouts WHERE status = 'PENDING_MANUAL_REVIEW'")
            .fetch_all(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        rows.iter().map(row_to_payout).collect()
    }
}
