//! Driver repository: the `Driver` and `DriverLocation` aggregates.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{Driver, DriverLocation, DriverStatus};

use super::Pool;

#[derive(Clone)]
pub struct DriverRepository {
    pool: Pool,
}

fn row_to_driver(row: &sqlx::postgres::PgRow) -> DispatchResult<Driver> {
    let status_str: String = row.try_get("status").map_err(DispatchError::from)?;
    let status = DriverStatus::parse(&status_str)
        .ok_or_else(|| DispatchError::internal_msg("bad driver status"))?;
    Ok(Driver {
        id: row.try_get("id").map_err(DispatchError::from)?,
        user_id: row.try_get("user_id").map_err(DispatchError::from)?,
        status,
        service_type: row.try_get("service_type").map_err(DispatchError::from)?,
        plate_number: row.try_get("plate_number").map_err(DispatchError::from)?,
        credit_balance: row.try_get("credit_balance").map_err(DispatchError::from)?,
        credit_expires_at: row.try_get("credit_expires_at").map_err(DispatchError::from)?,
        base_fare: row.try_get("base_fare").map_err(DispatchError::from)?,
        per_km_rate: row.try_get("per_km_rate").map_err(DispatchError::from)?,
        city: row.try_get("city").map_err(DispatchError::from)?,
        province: row.try_get("province").map_err(DispatchError::from)?,
        stripe_account_id: row.try_get("stripe_account_id").map_err(DispatchError::from)?,
        rating: row.try_get("rating").map_err(DispatchError::from)?,
        acceptance_rate: row.try_get("acceptance_rate").map_err(DispatchError::from)?,
        last_accepted_at: row.try_get("last_accepted_at").map_err(DispatchError::from)?,
        suspended_until: row.try_get("suspended_until").map_err(DispatchError::from)?,
    })
}

fn row_to_location(row: &sqlx::postgres::PgRow) -> DispatchResult<DriverLocation> {
    Ok(DriverLocation {
        driver_id: row.try_get("driver_id").map_err(DispatchError::from)?,
        raw_lat: row.try_get("raw_lat").map_err(DispatchError::from)?,
        raw_lng: row.try_get("raw_lng").map_err(DispatchError::from)?,
        snapped_lat: row.try_get("snapped_lat").map_err(DispatchError::from)?,
        snapped_lng: row.try_get("snapped_lng").map_err(DispatchError::from)?,
        bearing: row.try_get("bearing").map_err(DispatchError::from)?,
        deviation_m: row.try_get("deviation_m").map_err(DispatchError::from)?,
        anomaly_count: {
            let n: i32 = row.try_get("anomaly_count").map_err(DispatchError::from)?;
            n as u32
        },
        updated_at: row.try_get("updated_at").map_err(DispatchError::from)?,
    })
}

impl DriverRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn find_by_id(&self, driver_id: Uuid) -> DispatchResult<Driver> {
        let row = sqlx::query("SELECT * FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("driver".into()))?;
        row_to_driver(&row)
    }

    /// Locking read used inside the settlement transaction (§4.C10): the credit
    /// gate needs an up-to-date, row-locked view of `credit_balance`/
    /// `credit_expires_at` so two concurrent settlements for the same driver can't
    /// both read the same balance and double-deduct.
    pub async fn find_by_id_tx(&self, tx: &mut super::Tx<'_>, driver_id: Uuid) -> DispatchResult<Driver> {
        let row = sqlx::query("SELECT * FROM drivers WHERE id = $1 FOR UPDATE")
            .bind(driver_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(DispatchError::from)?
            .ok_or_else(|| DispatchError::NotFound("driver".into()))?;
        row_to_driver(&row)
    }

    /// Resolves the `driver_id` half of an `AuthContext` once a user authenticates
    /// (§4.C13): absent for riders and admins, who have no `drivers` row at all.
    pub async fn find_by_user_id(&self, user_id: Uuid) -> DispatchResult<Option<Driver>> {
        let row = sqlx::query("SELECT * FROM drivers WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_driver).transpose()
    }

    /// Candidate selection query for the dispatch engine (§4.C8): online, matching
    /// service type when specified, usable credit, not suspended, not already holding
    /// a pending offer for another trip, no open anomaly flag, within the bounding
    /// box the caller narrowed down via geohash neighbor lookup. The final precise
    /// radius filter (haversine) is applied by the caller in-process.
    pub async fn find_online_candidates(
        &self,
        service_type: Option<&str>,
        driver_ids: &[Uuid],
        max_anomaly_strikes: u32,
    ) -> DispatchResult<Vec<(Driver, DriverLocation)>> {
        if driver_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT d.*, l.raw_lat, l.raw_lng, l.snapped_lat, l.snapped_lng, l.bearing,
                   l.deviation_m, l.anomaly_count, l.updated_at, l.driver_id AS loc_driver_id
            FROM drivers d
            JOIN driver_locations l ON l.driver_id = d.id
            WHERE d.status = 'ONLINE'
              AND d.id = ANY($1)
              AND ($2::text IS NULL OR d.service_type = $2)
              AND l.anomaly_count < $3
              AND NOT EXISTS (
                  SELECT 1 FROM trip_offers o WHERE o.driver_id = d.id AND o.status = 'PENDING'
              )
            "#,
        )
        .bind(driver_ids)
        .bind(service_type)
        .bind(max_anomaly_strikes as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::from)?;

        let now = Utc::now();
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let driver = row_to_driver(row)?;
            if !driver.has_usable_credit(now) {
                continue;
            }
            if driver.suspended_until.map_or(false, |t| t > now) {
                continue;
            }
            let loc = row_to_location(row)?;
            out.push((driver, loc));
        }
        Ok(out)
    }

    /// Same filtering as `find_online_candidates`, but over every online driver
    /// rather than a pre-narrowed id set. Used when the caller has no geohash-derived
    /// candidate list of its own (a trip's initial dispatch, or a re-dispatch after an
    /// offer is rejected or expires).
    pub async fn list_online(
        &self,
        service_type: Option<&str>,
        max_anomaly_strikes: u32,
    ) -> DispatchResult<Vec<(Driver, DriverLocation)>> {
        let rows = sqlx::query(
            r#"
            SELECT d.*, l.raw_lat, l.raw_lng, l.snapped_lat, l.snapped_lng, l.bearing,
                   l.deviation_m, l.anomaly_count, l.updated_at, l.driver_id AS loc_driver_id
            FROM drivers d
            JOIN driver_locations l ON l.driver_id = d.id
            WHERE d.status = 'ONLINE'
              AND ($1::text IS NULL OR d.service_type = $1)
              AND l.anomaly_count < $2
              AND NOT EXISTS (
                  SELECT 1 FROM trip_offers o WHERE o.driver_id = d.id AND o.status = 'PENDING'
              )
            "#,
        )
        .bind(service_type)
        .bind(max_anomaly_strikes as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(DispatchError::from)?;

        let now = Utc::now();
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let driver = row_to_driver(row)?;
            if !driver.has_usable_credit(now) {
                continue;
            }
            if driver.suspended_until.map_or(false, |t| t > now) {
                continue;
            }
            let loc = row_to_location(row)?;
            out.push((driver, loc));
        }
        Ok(out)
    }

    pub async fn find_location(&self, driver_id: Uuid) -> DispatchResult<Option<DriverLocation>> {
        let row = sqlx::query("SELECT * FROM driver_locations WHERE driver_id = $1")
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        row.as_ref().map(row_to_location).transpose()
    }

    pub async fn upsert_location(
        &self,
        driver_id: Uuid,
        raw_lat: f64,
        raw_lng: f64,
        snapped_lat: f64,
        snapped_lng: f64,
        bearing: Option<f64>,
        deviation_m: f64,
        anomaly_count: u32,
    ) -> DispatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO driver_locations
                (driver_id, raw_lat, raw_lng, snapped_lat, snapped_lng, bearing, deviation_m, anomaly_count, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (driver_id) DO UPDATE SET
                raw_lat = EXCLUDED.raw_lat,
                raw_lng = EXCLUDED.raw_lng,
                snapped_lat = EXCLUDED.snapped_lat,
                snapped_lng = EXCLUDED.snapped_lng,
                bearing = EXCLUDED.bearing,
                deviation_m = EXCLUDED.deviation_m,
                anomaly_count = EXCLUDED.anomaly_count,
                updated_at = now()
            "#,
        )
        .bind(driver_id)
        .bind(raw_lat)
        .bind(raw_lng)
        .bind(snapped_lat)
        .bind(snapped_lng)
        .bind(bearing)
        .bind(deviation_m)
        .bind(anomaly_count as i32)
        .execute(&self.pool)
        .await
        .map_err(DispatchError::from)?;
        Ok(())
    }

    /// Persists an anomaly flag without moving the snapped position (§4.C3: a flagged
    /// reading must not propagate or overwrite the last good snap).
    pub async fn record_anomaly(&self, driver_id: Uuid, anomaly_count: u32) -> DispatchResult<()> {
        sqlx::query("UPDATE driver_locations SET anomaly_count = $1 WHERE driver_id = $2")
            .bind(anomaly_count as i32)
            .bind(driver_id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    pub async fn set_status(&self, driver_id: Uuid, status: DriverStatus) -> DispatchResult<()> {
        sqlx::query("UPDATE drivers SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(driver_id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    /// Update the rolling acceptance rate in place. The caller supplies the new
    /// ratio already computed over the trailing window (§4.C8's N=50 offers).
    pub async fn set_acceptance_rate(
        &self,
        driver_id: Uuid,
        acceptance_rate: f64,
        accepted: bool,
    ) -> DispatchResult<()> {
        if accepted {
            sqlx::query(
                "UPDATE drivers SET acceptance_rate = $1, last_accepted_at = now() WHERE id = $2",
            )
            .bind(acceptance_rate)
            .bind(driver_id)
            .execute(&self.pool)
            .await
            .map_err(DispatchError::from)?;
        } else {
            sqlx::query("UPDATE drivers SET acceptance_rate = $1 WHERE id = $2")
                .bind(acceptance_rate)
                .bind(driver_id)
                .execute(&self.pool)
                .await
                .map_err(DispatchError::from)?;
        }
        Ok(())
    }

    /// Floors at 0 (§3's `creditBalance >= 0` invariant) — the caller is expected to
    /// have already checked the driver is on a package with credit remaining, this
    /// is a last-line guard against the balance ever going negative.
    pub async fn deduct_credit(
        &self,
        tx: &mut super::Tx<'_>,
        driver_id: Uuid,
        amount: i64,
    ) -> DispatchResult<()> {
        sqlx::query("UPDATE drivers SET credit_balance = GREATEST(credit_balance - $1, 0) WHERE id = $2")
            .bind(amount)
            .bind(driver_id)
            .execute(&mut **tx)
            .await
            .map_err(DispatchError::from)?;
        Ok(())
    }

    pub async fn grant_credit(
        &self,
        tx: &mut super::Tx<'_>,
        driver_id: Uuid,
        amount: i64,
        expires_at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        sqlx::query(
            "UPDATE drivers SET credit_balance = credit_balance + $1, credit_expires_at = $2 WHERE id = $3",
        )
        .bind(amount)
        .bind(expires_at)
        .bind(driver_id)
        .execute(&mut **tx)
        .await
        .map_err(DispatchError::from)?;
        Ok(())
    }
}
