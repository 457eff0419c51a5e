//! Credit ledger repository: append-only `DriverCreditLedgerEntry` log (§4.C12).
//!
//! Entries are never updated or deleted; `credit_balance` on `drivers` is the fast
//! path and this table is the audit trail used to reconstruct it if it ever drifts.

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::DriverCreditLedgerEntry;

use super::Pool;

#[derive(Clone)]
pub struct CreditLedgerRepository {
    pool: Pool,
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> DispatchResult<DriverCreditLedgerEntry> {
    Ok(DriverCreditLedgerEntry {
        id: row.try_get("id").map_err(DispatchError::from)?,
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        credits_delta: row.try_get("credits_delta").map_err(DispatchError::from)?,
        reason: row.try_get("reason").map_err(DispatchError::from)?,
        created_at: row.try_get("created_at").map_err(DispatchError::from)?,
    })
}

impl CreditLedgerRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Appends a ledger entry inside the caller's transaction, so it always lands
    /// atomically alongside the `drivers.credit_balance` mutation it explains.
    pub async fn append(
        &self,
        tx: &mut super::Tx<'_>,
        driver_id: Uuid,
        credits_delta: i64,
        reason: &str,
    ) -> DispatchResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO driver_credit_ledger (id, driver_id, credits_delta, reason, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(id)
        .bind(driver_id)
        .bind(credits_delta)
        .bind(reason)
        .execute(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        Ok(id)
    }

    pub async fn history(&self, driver_id: Uuid) -> DispatchResult<Vec<DriverCreditLedgerEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM driver_credit_ledger WHERE driver_id = $1 ORDER BY created_at DESC LIMIT 200",
        )
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Reconstructs the balance purely from the ledger, independent of
    /// `drivers.credit_balance`. Used by reconciliation to detect drift.
    pub async fn reconstructed_balance(&self, driver_id: Uuid) -> DispatchResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(credits_delta), 0) AS total FROM driver_credit_ledger WHERE driver_id = $1",
        )
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row.try_get("total").map_err(DispatchError::from)
    }
}
