//! Repository layer: one struct per aggregate in §3, each holding a `PgPool` and
//! exposing only the operations the domain modules need. SQL is written inline with
//! `sqlx::query`/`sqlx::query_as` (not the `query!` macro, which needs a live database
//! at compile time) against either `&PgPool` or an open `&mut Transaction<'_, Postgres>`
//! so the atomicity boundary of a multi-statement operation is visible at the call site.

pub mod credit_ledger_repo;
pub mod credit_purchase_repo;
pub mod driver_repo;
pub mod notification_repo;
pub mod offer_repo;
pub mod otp_repo;
pub mod payout_repo;
pub mod reconciliation_repo;
pub mod transaction_repo;
pub mod trip_repo;
pub mod user_repo;

pub use credit_ledger_repo::CreditLedgerRepository;
pub use credit_purchase_repo::CreditPurchaseRepository;
pub use driver_repo::DriverRepository;
pub use notification_repo::NotificationRepository;
pub use offer_repo::OfferRepository;
pub use otp_repo::OtpRepository;
pub use payout_repo::PayoutRepository;
pub use reconciliation_repo::ReconciliationRepository;
pub use transaction_repo::TransactionRepository;
pub use trip_repo::TripRepository;
pub use user_repo::UserRepository;

pub type Pool = sqlx::PgPool;
pub type Tx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// Migrations embedded at compile time, applied at startup via `sqlx::migrate!`.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
