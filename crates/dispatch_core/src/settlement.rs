//! Settlement: the atomic `completeTrip` transaction (§4.C10).
//!
//! Balance contract: a user's balance is never stored as a column, only derived by
//! `TransactionRepository::balance`/`balance_for_update`. This module never caches a
//! balance across await points within the settlement transaction.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::db::credit_ledger_repo::CreditLedgerRepository;
use crate::db::driver_repo::DriverRepository;
use crate::db::trip_repo::TripRepository;
use crate::db::transaction_repo::TransactionRepository;
use crate::errors::{DispatchError, DispatchResult};
use crate::models::{PaymentMethod, Trip, TripStatus, TransactionStatus, TransactionType};

pub struct SettlementService {
    trips: TripRepository,
    transactions: TransactionRepository,
    drivers: DriverRepository,
    credit_ledger: CreditLedgerRepository,
    config: DispatchConfig,
}

impl SettlementService {
    pub fn new(
        trips: TripRepository,
        transactions: TransactionRepository,
        drivers: DriverRepository,
        credit_ledger: CreditLedgerRepository,
        config: DispatchConfig,
    ) -> Self {
        Self {
            trips,
            transactions,
            drivers,
            credit_ledger,
            config,
        }
    }

    /// `completeTrip`: load + assert `IN_PROGRESS`, check wallet balance when paid by
    /// wallet, debit the rider, split fare into commission and driver earnings,
    /// transition to `COMPLETED`, and — if the driver is on a credit package —
    /// deduct one credit, all inside a single database transaction so a crash midway
    /// leaves the trip exactly as it was (CAS'd back to `IN_PROGRESS`, not
    /// half-settled).
    pub async fn complete_trip(&self, trip_id: Uuid) -> DispatchResult<Trip> {
        let mut tx = self.trips.pool().begin().await.map_err(DispatchError::from)?;

        let trip = self.trips.find_by_id_tx(&mut tx, trip_id).await?;
        if trip.status != TripStatus::InProgress {
            tx.rollback().await.ok();
            return Err(DispatchError::InvalidStateTransition {
                current: trip.status.as_str().to_string(),
                attempted: TripStatus::Completed.as_str().to_string(),
            });
        }

        let driver_id = trip
            .driver_id
            .ok_or_else(|| DispatchError::internal_msg("in-progress trip missing a driver"))?;

        if trip.payment_method == PaymentMethod::Wallet {
            let balance = self.transactions.balance_for_update(&mut tx, trip.rider_id).await?;
            if balance < trip.fare {
                tx.rollback().await.ok();
                return Err(DispatchError::InsufficientBalance);
            }
            self.transactions
                .insert_tx(
                    &mut tx,
                    trip.rider_id,
                    trip.fare,
                    TransactionType::Debit,
                    TransactionStatus::Completed,
                    None,
                )
                .await?;
        }

        let commission = trip.fare * self.config.commission_rate;
        let driver_earnings = trip.fare - commission;

        self.transactions
            .insert_tx(
                &mut tx,
                driver_id,
                driver_earnings,
                TransactionType::Credit,
                TransactionStatus::Completed,
                None,
            )
            .await?;

        let applied = self
            .trips
            .set_settlement_fields(&mut tx, trip_id, commission, driver_earnings)
            .await?;
        if !applied {
            tx.rollback().await.ok();
            return Err(DispatchError::Conflict("trip settled concurrently".into()));
        }

        // Per-trip credit deduction only applies to a driver actively enrolled in a
        // package (§4.C10 step 4); a cash-only driver with no package has
        // `credit_expires_at` unset and must never be driven below the §3 floor of 0.
        let driver = self.drivers.find_by_id_tx(&mut tx, driver_id).await?;
        if driver.credit_expires_at.is_some() && driver.credit_balance > 0 {
            self.drivers.deduct_credit(&mut tx, driver_id, 1).await?;
            self.credit_ledger
                .append(&mut tx, driver_id, -1, "trip_completion_deduction")
                .await?;
        }

        tx.commit().await.map_err(DispatchError::from)?;

        self.trips.find_by_id(trip_id).await
    }

    /// Monthly credit package purchase grant: credits the driver's balance and
    /// records the ledger entry atomically, expiring at the end of the purchased
    /// period (§4.C12).
    pub async fn grant_credit_package(&self, driver_id: Uuid, credits: i64, months: i64) -> DispatchResult<()> {
        let mut tx = self.trips.pool().begin().await.map_err(DispatchError::from)?;
        let expires_at = Utc::now() + Duration::days(30 * months.max(1));
        self.drivers
            .grant_credit(&mut tx, driver_id, credits, expires_at)
            .await?;
        self.credit_ledger
            .append(&mut tx, driver_id, credits, "package_purchase")
            .await?;
        tx.commit().await.map_err(DispatchError::from)?;
        Ok(())
    }
}
