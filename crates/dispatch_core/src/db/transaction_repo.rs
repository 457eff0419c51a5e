//! Transaction repository: the `Transaction` aggregate and the balance aggregation
//! query that is the sole authoritative source of a user's wallet balance (§4.C10).

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{Transaction, TransactionStatus, TransactionType};

use super::Pool;

#[derive(Clone)]
pub struct TransactionRepository {
    pool: Pool,
}

impl TransactionRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// `Balance(u) = Sum(CREDIT.COMPLETED) - Sum(DEBIT.COMPLETED)`. Never cached;
    /// called fresh every time a balance is needed.
    pub async fn balance(&self, user_id: Uuid) -> DispatchResult<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN type = 'CREDIT' AND status = 'COMPLETED' THEN amount
                     WHEN type = 'DEBIT' AND status = 'COMPLETED' THEN -amount
                     ELSE 0 END
            ), 0) AS balance
            FROM transactions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row.try_get("balance").map_err(DispatchError::from)
    }

    /// Same aggregation, but inside the caller's transaction and with a row lock on
    /// the user's transaction rows so two concurrent settlements for the same rider
    /// serialize instead of both reading a stale pre-debit balance.
    pub async fn balance_for_update(
        &self,
        tx: &mut super::Tx<'_>,
        user_id: Uuid,
    ) -> DispatchResult<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN type = 'CREDIT' AND status = 'COMPLETED' THEN amount
                     WHEN type = 'DEBIT' AND status = 'COMPLETED' THEN -amount
                     ELSE 0 END
            ), 0) AS balance
            FROM transactions
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        row.try_get("balance").map_err(DispatchError::from)
    }

    pub async fn insert_tx(
        &self,
        tx: &mut super::Tx<'_>,
        user_id: Uuid,
        amount: f64,
        kind: TransactionType,
        status: TransactionStatus,
        stripe_payment_id: Option<&str>,
    ) -> DispatchResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, amount, type, status, stripe_payment_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(amount)
        .bind(kind.as_str())
        .bind(status.as_str())
        .bind(stripe_payment_id)
        .execute(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        Ok(id)
    }

    /// Same insert as `insert_tx`, for callers with no open transaction of their own
    /// (e.g. a standalone wallet top-up that isn't part of a larger settlement).
    pub async fn insert(
        &self,
        user_id: Uuid,
        amount: f64,
        kind: TransactionType,
        status: TransactionStatus,
        stripe_payment_id: Option<&str>,
    ) -> DispatchResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, amount, type, status, stripe_payment_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(amount)
        .bind(kind.as_str())
        .bind(status.as_str())
        .bind(stripe_payment_id)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(id)
    }

    pub async fn list_completed_between(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> DispatchResult<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE status = 'COMPLETED' AND created_at >= $1 AND created_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::from)?;

        rows.iter()
            .map(|row| {
                let type_str: String = row.try_get("type").map_err(DispatchError::from)?;
                let status_str: String = row.try_get("status").map_err(DispatchError::from)?;
                Ok(Transaction {
                    id: row.try_get("id").map_err(DispatchError::from)?,
                    user_id: row.try_get("user_id").map_err(DispatchError::from)?,
                    amount: row.try_get("amount").map_err(DispatchError::from)?,
                    kind: TransactionType::parse(&type_str)
                        .ok_or_else(|| DispatchError::internal_msg("bad tx type"))?,
                    status: TransactionStatus::parse(&status_str)
                        .ok_or_else(|| DispatchError::internal_msg("bad tx status"))?,
                    stripe_payment_id: row.try_get("stripe_payment_id").map_err(DispatchError::from)?,
                    created_at: row.try_get("created_at").map_err(DispatchError::from)?,
                })
            })
            .collect()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}
