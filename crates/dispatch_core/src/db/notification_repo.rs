//! Notification repository: the `RideNotification` aggregate backing the messaging
//! retry queue and webhook status callbacks (§4.C7).

use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{NotificationChannel, NotificationStatus, RideNotification};

use super::Pool;

#[derive(Clone)]
pub struct NotificationRepository {
    pool: Pool,
}

fn row_to_notification(row: &sqlx::postgres::PgRow) -> DispatchResult<RideNotification> {
    let channel_str: String = row.try_get("channel").map_err(DispatchError::from)?;
    let channel = NotificationChannel::parse(&channel_str)
        .ok_or_else(|| DispatchError::internal_msg("bad notification channel"))?;
    let status_str: String = row.try_get("status").map_err(DispatchError::from)?;
    let status = NotificationStatus::parse(&status_str)
        .ok_or_else(|| DispatchError::internal_msg("bad notification status"))?;
    Ok(RideNotification {
        id: row.try_get("id").map_err(DispatchError::from)?,
        trip_id: row.try_get("trip_id").map_err(DispatchError::from)?,
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        channel,
        status,
        message_id: row.try_get("message_id").map_err(DispatchError::from)?,
        retries: {
            let n: i32 = row.try_get("retries").map_err(DispatchError::from)?;
            n as u32
        },
        error: row.try_get("error").map_err(DispatchError::from)?,
    })
}

impl NotificationRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        channel: NotificationChannel,
    ) -> DispatchResult<RideNotification> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO ride_notifications (id, trip_id, driver_id, channel, status, retries)
             VALUES ($1, $2, $3, $4, 'PENDING', 0) RETURNING *",
        )
        .bind(id)
        .bind(trip_id)
        .bind(driver_id)
        .bind(channel.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        row_to_notification(&row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> DispatchResult<RideNotification> {
        let row = sqlx::query("SELECT * FROM ride_notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("ride_notification".into()))?;
        row_to_notification(&row)
    }

    pub async fn find_by_message_id(&self, message_id: &str) -> DispatchResult<Option<RideNotification>> {
        let row = sqlx::query("SELECT * FROM ride_notifications WHERE message_id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_notification).transpose()
    }

    pub async fn save(&self, notification: &RideNotification) -> DispatchResult<()> {
        sqlx::query(
            "UPDATE ride_notifications SET status = $2, message_id = $3, retries = $4, error = $5
             WHERE id = $1",
        )
        .bind(notification.id)
        .bind(notification.status.as_str())
        .bind(&notification.message_id)
        .bind(notification.retries as i32)
        .bind(&notification.error)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(())
    }

    /// Idempotent webhook status advance: a callback can only move the status
    /// forward in `NotificationStatus::rank()` order, so a duplicate or
    /// out-of-order delivery report is a no-op rather than a regression
    /// (§8's "verifying the same webhook payload twice advances status at most
    /// once").
    pub async fn advance_status_by_message_id(
        &self,
        message_id: &str,
        new_status: NotificationStatus,
    ) -> DispatchResult<bool> {
        let Some(existing) = self.find_by_message_id(message_id).await? else {
            return Ok(false);
        };
        if new_status.rank() <= existing.status.rank() {
            return Ok(false);
        }
        let applied = sqlx::query(
            "UPDATE ride_notifications SET status = $2 WHERE message_id = $1 AND status = $3",
        )
        .bind(message_id)
        .bind(new_status.as_str())
        .bind(existing.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?
        .rows_affected()
            == 1;
        Ok(applied)
    }
}
