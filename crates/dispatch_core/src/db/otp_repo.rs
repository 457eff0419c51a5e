//! OTP repository: the `OTP`, `OTPRequest`, and `OTPLock` aggregates.
//!
//! The compound unique constraint `(phone, verified)` (partial, `WHERE verified = false`)
//! is what makes "at most one unverified OTP per phone" atomic under concurrency: two
//! racing inserts can't both land, and the loser retries once per §4.C6.

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{OtpLock, OtpRecord};

use super::Pool;

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[derive(Clone)]
pub struct OtpRepository {
    pool: Pool,
}

impl OtpRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Delete any existing unverified OTP for `phone`, then insert a fresh one, as a
    /// single transaction. `id` is generated by the caller (rather than here) so the
    /// caller can salt the code hash with it before this call. On a unique-constraint
    /// race (two concurrent callers both pass the delete and both try to insert) the
    /// loser's insert fails with `Conflict` so the caller can retry once with a fresh
    /// id, per §4.C6 step 3 / §7.
    pub async fn replace_unverified(
        &self,
        id: Uuid,
        phone: &str,
        code_hash: &str,
        ttl_min: i64,
    ) -> DispatchResult<OtpRecord> {
        let mut tx = self.pool.begin().await.map_err(DispatchError::from)?;

        sqlx::query("DELETE FROM otps WHERE phone = $1 AND verified = false")
            .bind(phone)
            .execute(&mut *tx)
            .await
            .map_err(DispatchError::from)?;

        let expires_at = Utc::now() + Duration::minutes(ttl_min);

        let insert = sqlx::query(
            r#"
            INSERT INTO otps (id, phone, code_hash, expires_at, verified, delivery_status)
            VALUES ($1, $2, $3, $4, false, 'PENDING')
            "#,
        )
        .bind(id)
        .bind(phone)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                tx.commit().await.map_err(DispatchError::from)?;
                Ok(OtpRecord {
                    id,
                    phone: phone.to_string(),
                    code_hash: code_hash.to_string(),
                    expires_at,
                    verified: false,
                    delivery_status: "PENDING".into(),
                    message_id: None,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.ok();
                Err(DispatchError::Conflict(
                    "concurrent OTP request for this phone".into(),
                ))
            }
            Err(e) => Err(DispatchError::from(e)),
        }
    }

    pub async fn find_unverified(&self, phone: &str) -> DispatchResult<Option<OtpRecord>> {
        let row = sqlx::query(
            "SELECT * FROM otps WHERE phone = $1 AND verified = false ORDER BY expires_at DESC LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(DispatchError::from)?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(OtpRecord {
                id: row.try_get("id").map_err(DispatchError::from)?,
                phone: row.try_get("phone").map_err(DispatchError::from)?,
                code_hash: row.try_get("code_hash").map_err(DispatchError::from)?,
                expires_at: row.try_get("expires_at").map_err(DispatchError::from)?,
                verified: row.try_get("verified").map_err(DispatchError::from)?,
                delivery_status: row.try_get("delivery_status").map_err(DispatchError::from)?,
                message_id: row.try_get("message_id").map_err(DispatchError::from)?,
            })),
        }
    }

    pub async fn mark_verified(&self, id: Uuid) -> DispatchResult<()> {
        sqlx::query("UPDATE otps SET verified = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    pub async fn set_message_id(&self, id: Uuid, message_id: &str) -> DispatchResult<()> {
        sqlx::query("UPDATE otps SET message_id = $1, delivery_status = 'SENT' WHERE id = $2")
            .bind(message_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    /// Sliding-window rate limit: counts requests whose `window_start` (truncated to
    /// the hour) equals the current hour bucket. Returns the count *after* this call
    /// increments it, so the caller can compare against `OTP_MAX_PER_HOUR` atomically
    /// via `INSERT ... ON CONFLICT ... DO UPDATE SET count = count + 1`.
    pub async fn increment_rate_window(
        &self,
        phone: &str,
        window_start: DateTime<Utc>,
    ) -> DispatchResult<i32> {
        let row = sqlx::query(
            r#"
            INSERT INTO otp_requests (phone, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (phone, window_start) DO UPDATE SET count = otp_requests.count + 1
            RETURNING count
            "#,
        )
        .bind(phone)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row.try_get("count").map_err(DispatchError::from)
    }

    pub async fn count_in_window(
        &self,
        phone: &str,
        window_start: DateTime<Utc>,
    ) -> DispatchResult<i32> {
        let row = sqlx::query(
            "SELECT count FROM otp_requests WHERE phone = $1 AND window_start = $2",
        )
        .bind(phone)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(row.map(|r| r.try_get::<i32, _>("count").unwrap_or(0)).unwrap_or(0))
    }

    pub async fn find_lock(&self, phone: &str) -> DispatchResult<Option<OtpLock>> {
        let row = sqlx::query("SELECT * FROM otp_locks WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some(OtpLock {
                phone: row.try_get("phone").map_err(DispatchError::from)?,
                failed_attempts: {
                    let n: i32 = row.try_get("failed_attempts").map_err(DispatchError::from)?;
                    n as u32
                },
                locked_until: row.try_get("locked_until").map_err(DispatchError::from)?,
            })),
        }
    }

    /// Atomic upsert-increment of the failed-attempt counter; sets `locked_until`
    /// when the threshold is crossed by *this* call (§4.C6 step 3, §8 boundary: the
    /// (N+1)th failure after reaching the threshold is the one that locks).
    pub async fn record_failed_attempt(
        &self,
        phone: &str,
        threshold: u32,
        lock_minutes: i64,
    ) -> DispatchResult<OtpLock> {
        let locked_until_expr = format!("now() + interval '{lock_minutes} minutes'");
        let sql = format!(
            r#"
            INSERT INTO otp_locks (phone, failed_attempts, locked_until)
            VALUES ($1, 1, NULL)
            ON CONFLICT (phone) DO UPDATE SET
                failed_attempts = otp_locks.failed_attempts + 1,
                locked_until = CASE
                    WHEN otp_locks.failed_attempts + 1 >= $2 THEN {locked_until_expr}
                    ELSE otp_locks.locked_until
                END
            RETURNING *
            "#
        );
        let row = sqlx::query(&sql)
            .bind(phone)
            .bind(threshold as i32)
            .fetch_one(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(OtpLock {
            phone: row.try_get("phone").map_err(DispatchError::from)?,
            failed_attempts: {
                let n: i32 = row.try_get("failed_attempts").map_err(DispatchError::from)?;
                n as u32
            },
            locked_until: row.try_get("locked_until").map_err(DispatchError::from)?,
        })
    }

    pub async fn reset_lock(&self, phone: &str) -> DispatchResult<()> {
        sqlx::query("DELETE FROM otp_locks WHERE phone = $1")
            .bind(phone)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    /// Sweeper: removes OTPs expired more than 24h and rate-limit windows older than
    /// 24h, per §4.C6's scheduled cleanup.
    pub async fn sweep_expired(&self) -> DispatchResult<(u64, u64)> {
        let otps = sqlx::query("DELETE FROM otps WHERE expires_at < now() - interval '24 hours'")
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        let windows = sqlx::query(
            "DELETE FROM otp_requests WHERE window_start < now() - interval '24 hours'",
        )
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok((otps.rows_affected(), windows.rows_affected()))
    }
}
