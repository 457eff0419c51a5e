//! Reconciliation: the daily DB/provider aggregate comparison (§4.C11).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::reconciliation_repo::ReconciliationRepository;
use crate::db::transaction_repo::TransactionRepository;
use crate::errors::DispatchResult;
use crate::models::ReconciliationLog;

/// What the external payment provider reports for a period; supplied by the caller
/// since fetching it is a Stripe API concern out of this crate's scope (§1).
pub trait ProviderTotals: Send + Sync {
    fn total_for_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64;
}

/// An admin alert is owed whenever `mismatch` exceeds one cent.
pub const ALERT_THRESHOLD: f64 = 0.01;

pub struct ReconciliationJob {
    transactions: TransactionRepository,
    logs: ReconciliationRepository,
}

impl ReconciliationJob {
    pub fn new(transactions: TransactionRepository, logs: ReconciliationRepository) -> Self {
        Self { transactions, logs }
    }

    /// Runs the comparison for `[period_start, period_end)`, persists a
    /// `ReconciliationLog`, and reports whether the mismatch crosses the alert
    /// threshold so the caller can notify an admin (a messaging, C7, concern).
    pub async fn run(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        provider: &dyn ProviderTotals,
    ) -> DispatchResult<(ReconciliationLog, bool)> {
        let completed = self
            .transactions
            .list_completed_between(period_start, period_end)
            .await?;
        let db_total: f64 = completed.iter().map(|t| t.amount).sum();
        let provider_total = provider.total_for_period(period_start, period_end);
        let mismatch = (db_total - provider_total).abs();

        let log = ReconciliationLog {
            id: Uuid::new_v4(),
            period_start,
            period_end,
            db_total,
            provider_total,
            mismatch,
            details: format!(
                "{} completed transactions, db_total={db_total:.2}, provider_total={provider_total:.2}",
                completed.len()
            ),
        };
        self.logs.record(&log).await?;

        Ok((log, mismatch > ALERT_THRESHOLD))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(f64);
    impl ProviderTotals for FixedProvider {
        fn total_for_period(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> f64 {
            self.0
        }
    }

    #[test]
    fn mismatch_above_one_cent_crosses_the_alert_threshold() {
        let mismatch: f64 = 1.50;
        assert!(mismatch > ALERT_THRESHOLD);
    }

    #[test]
    fn mismatch_below_one_cent_does_not_alert() {
        let mismatch: f64 = 0.001;
        assert!(mismatch <= ALERT_THRESHOLD);
    }

    #[test]
    fn fixed_provider_returns_configured_total() {
        let provider = FixedProvider(42.0);
        assert_eq!(provider.total_for_period(Utc::now(), Utc::now()), 42.0);
    }
}
