//! Credit purchase request repository backing the §4.C12 review workflow: a driver
//! submits a request, an admin approves or rejects it, and the row's status is the
//! durable record of that decision.

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{CreditPurchaseRequest, CreditPurchaseStatus};

use super::Pool;

#[derive(Clone)]
pub struct CreditPurchaseRepository {
    pool: Pool,
}

fn row_to_request(row: &sqlx::postgres::PgRow) -> DispatchResult<CreditPurchaseRequest> {
    let status_raw: String = row.try_get("status").map_err(DispatchError::from)?;
    let status = CreditPurchaseStatus::parse(&status_raw)
        .ok_or_else(|| DispatchError::internal_msg("unknown credit purchase status"))?;
    Ok(CreditPurchaseRequest {
        id: row.try_get("id").map_err(DispatchError::from)?,
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        credits: row.try_get("credits").map_err(DispatchError::from)?,
        months: row.try_get("months").map_err(DispatchError::from)?,
        status,
        created_at: row.try_get("created_at").map_err(DispatchError::from)?,
    })
}

impl CreditPurchaseRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Submits a new request in `PENDING` status (§4.C12 step 1).
    pub async fn create(&self, driver_id: Uuid, credits: i64, months: i64) -> DispatchResult<CreditPurchaseRequest> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO credit_purchase_requests (id, driver_id, credits, months, status, created_at)
            VALUES ($1, $2, $3, $4, 'PENDING', now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(driver_id)
        .bind(credits)
        .bind(months)
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row_to_request(&row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> DispatchResult<CreditPurchaseRequest> {
        let row = sqlx::query("SELECT * FROM credit_purchase_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("credit purchase request".into()))?;
        row_to_request(&row)
    }

    /// CAS the request from `PENDING` to `APPROVED`; `false` means it was already
    /// decided by a concurrent caller, so the admin route must not grant credits.
    pub async fn mark_approved(&self, id: Uuid) -> DispatchResult<bool> {
        let result = sqlx::query(
            "UPDATE credit_purchase_requests SET status = 'APPROVED' WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }

    /// CAS the request from `PENDING` to `REJECTED`. Rejection only updates this
    /// row; no ledger entry or balance mutation is ever involved.
    pub async fn mark_rejected(&self, id: Uuid) -> DispatchResult<bool> {
        let result = sqlx::query(
            "UPDATE credit_purchase_requests SET status = 'REJECTED' WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }
}
