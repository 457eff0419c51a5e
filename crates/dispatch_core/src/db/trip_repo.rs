//! Trip repository: database operations for the `Trip` aggregate.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{
    BookingChannel, PaymentMethod, PaymentStatus, Trip, TripStatus,
};

use super::Pool;

/// Input for creating a new trip (rider- or admin-initiated).
#[derive(Debug, Clone)]
pub struct TripInput {
    pub rider_id: Uuid,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub drop_lat: f64,
    pub drop_lng: f64,
    pub fare: f64,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub service_type: String,
    pub payment_method: PaymentMethod,
    pub scheduled_for: Option<chrono::DateTime<Utc>>,
    pub booking_channel: BookingChannel,
}

#[derive(Clone)]
pub struct TripRepository {
    pool: Pool,
}

fn row_to_trip(row: &sqlx::postgres::PgRow) -> DispatchResult<Trip> {
    let status_str: String = row.try_get("status").map_err(DispatchError::from)?;
    let status = TripStatus::parse(&status_str)
        .ok_or_else(|| DispatchError::internal_msg(format!("bad trip status {status_str}")))?;
    let payment_method_str: String = row.try_get("payment_method").map_err(DispatchError::from)?;
    let payment_method = PaymentMethod::parse(&payment_method_str)
        .ok_or_else(|| DispatchError::internal_msg("bad payment method"))?;
    let payment_status_str: String = row.try_get("payment_status").map_err(DispatchError::from)?;
    let payment_status = PaymentStatus::parse(&payment_status_str)
        .ok_or_else(|| DispatchError::internal_msg("bad payment status"))?;
    let booking_channel_str: String = row.try_get("booking_channel").map_err(DispatchError::from)?;
    let booking_channel = BookingChannel::parse(&booking_channel_str)
        .ok_or_else(|| DispatchError::internal_msg("bad booking channel"))?;

    Ok(Trip {
        id: row.try_get("id").map_err(DispatchError::from)?,
        rider_id: row.try_get("rider_id").map_err(DispatchError::from)?,
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        status,
        pickup_lat: row.try_get("pickup_lat").map_err(DispatchError::from)?,
        pickup_lng: row.try_get("pickup_lng").map_err(DispatchError::from)?,
        drop_lat: row.try_get("drop_lat").map_err(DispatchError::from)?,
        drop_lng: row.try_get("drop_lng").map_err(DispatchError::from)?,
        fare: row.try_get("fare").map_err(DispatchError::from)?,
        commission: row.try_get("commission").map_err(DispatchError::from)?,
        driver_earnings: row.try_get("driver_earnings").map_err(DispatchError::from)?,
        distance_km: row.try_get("distance_km").map_err(DispatchError::from)?,
        duration_sec: row.try_get("duration_sec").map_err(DispatchError::from)?,
        service_type: row.try_get("service_type").map_err(DispatchError::from)?,
        payment_method,
        payment_status,
        scheduled_for: row.try_get("scheduled_for").map_err(DispatchError::from)?,
        booking_channel,
        created_at: row.try_get("created_at").map_err(DispatchError::from)?,
    })
}

impl TripRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn create(&self, input: TripInput) -> DispatchResult<Trip> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO trips (
                id, rider_id, status, pickup_lat, pickup_lng, drop_lat, drop_lng,
                fare, distance_km, duration_sec, service_type, payment_method,
                payment_status, scheduled_for, booking_channel, created_at
            )
            VALUES ($1, $2, 'REQUESTED', $3, $4, $5, $6, $7, $8, $9, $10, $11, 'PENDING', $12, $13, now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.rider_id)
        .bind(input.pickup_lat)
        .bind(input.pickup_lng)
        .bind(input.drop_lat)
        .bind(input.drop_lng)
        .bind(input.fare)
        .bind(input.distance_km)
        .bind(input.duration_sec)
        .bind(&input.service_type)
        .bind(input.payment_method.as_str())
        .bind(input.scheduled_for)
        .bind(input.booking_channel.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DispatchError::from)?;

        row_to_trip(&row)
    }

    pub async fn find_by_id(&self, trip_id: Uuid) -> DispatchResult<Trip> {
        let row = sqlx::query("SELECT * FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("trip".into()))?;
        row_to_trip(&row)
    }

    pub async fn list_by_rider(&self, rider_id: Uuid) -> DispatchResult<Vec<Trip>> {
        let rows = sqlx::query(
            "SELECT * FROM trips WHERE rider_id = $1 ORDER BY created_at DESC LIMIT 100",
        )
        .bind(rider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        rows.iter().map(row_to_trip).collect()
    }

    /// CAS status transition: `UPDATE ... WHERE status = expected`. Returns `false` if
    /// the row did not have `expected` status (the caller lost a race or is stale).
    pub async fn cas_status(
        &self,
        trip_id: Uuid,
        expected: TripStatus,
        next: TripStatus,
    ) -> DispatchResult<bool> {
        let result = sqlx::query("UPDATE trips SET status = $1 WHERE id = $2 AND status = $3")
            .bind(next.as_str())
            .bind(trip_id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }

    /// Accept-path CAS used inside the dispatch engine's acceptance transaction:
    /// assigns `driver_id` and transitions to ACCEPTED in one statement.
    pub async fn cas_accept(
        &self,
        tx: &mut super::Tx<'_>,
        trip_id: Uuid,
        driver_id: Uuid,
    ) -> DispatchResult<bool> {
        let result = sqlx::query(
            "UPDATE trips SET driver_id = $1, status = 'ACCEPTED' WHERE id = $2 AND status = 'REQUESTED'",
        )
        .bind(driver_id)
        .bind(trip_id)
        .execute(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_settlement_fields(
        &self,
        tx: &mut super::Tx<'_>,
        trip_id: Uuid,
        commission: f64,
        driver_earnings: f64,
    ) -> DispatchResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trips
            SET status = 'COMPLETED', commission = $1, driver_earnings = $2, payment_status = 'COMPLETED'
            WHERE id = $3 AND status = 'IN_PROGRESS'
            "#,
        )
        .bind(commission)
        .bind(driver_earnings)
        .bind(trip_id)
        .execute(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_id_tx(&self, tx: &mut super::Tx<'_>, trip_id: Uuid) -> DispatchResult<Trip> {
        let row = sqlx::query("SELECT * FROM trips WHERE id = $1 FOR UPDATE")
            .bind(trip_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("trip".into()))?;
        row_to_trip(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_status_round_trips_through_as_str_and_parse() {
        for s in [
            TripStatus::Requested,
            TripStatus::Accepted,
            TripStatus::Arrived,
            TripStatus::InProgress,
            TripStatus::Completed,
            TripStatus::Cancelled,
        ] {
            assert_eq!(TripStatus::parse(s.as_str()), Some(s));
        }
    }
}
