//! Reconciliation repository: persistence for `ReconciliationLog` (§4.C11).

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::ReconciliationLog;

use super::Pool;

#[derive(Clone)]
pub struct ReconciliationRepository {
    pool: Pool,
}

fn row_to_log(row: &sqlx::postgres::PgRow) -> DispatchResult<ReconciliationLog> {
    Ok(ReconciliationLog {
        id: row.try_get("id").map_err(DispatchError::from)?,
        period_start: row.try_get("period_start").map_err(DispatchError::from)?,
        period_end: row.try_get("period_end").map_err(DispatchError::from)?,
        db_total: row.try_get("db_total").map_err(DispatchError::from)?,
        provider_total: row.try_get("provider_total").map_err(DispatchError::from)?,
        mismatch: row.try_get("mismatch").map_err(DispatchError::from)?,
        details: row.try_get("details").map_err(DispatchError::from)?,
    })
}

impl ReconciliationRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, log: &ReconciliationLog) -> DispatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_logs
                (id, period_start, period_end, db_total, provider_total, mismatch, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id)
        .bind(log.period_start)
        .bind(log.period_end)
        .bind(log.db_total)
        .bind(log.provider_total)
        .bind(log.mismatch)
        .bind(&log.details)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(())
    }

    pub async fn latest(&self) -> DispatchResult<Option<ReconciliationLog>> {
        let row = sqlx::query("SELECT * FROM reconciliation_logs ORDER BY period_end DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_log).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> DispatchResult<ReconciliationLog> {
        let row = sqlx::query("SELECT * FROM reconciliation_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("reconciliation log".into()))?;
        row_to_log(&row)
    }
}
