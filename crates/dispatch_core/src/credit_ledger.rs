//! Driver credit ledger: append-only grants/deductions and the purchase-approval
//! flow (§4.C12). Grants/deductions against `drivers.credit_balance` themselves are
//! performed transactionally by `SettlementService`; this module owns the
//! read-side history and the purchase-request approval workflow.

use uuid::Uuid;

use crate::db::credit_ledger_repo::CreditLedgerRepository;
use crate::db::credit_purchase_repo::CreditPurchaseRepository;
use crate::errors::{DispatchError, DispatchResult};
use crate::models::{CreditPurchaseRequest, CreditPurchaseStatus, DriverCreditLedgerEntry};

pub struct CreditLedgerService {
    ledger: CreditLedgerRepository,
    purchase_requests: CreditPurchaseRepository,
}

impl CreditLedgerService {
    pub fn new(ledger: CreditLedgerRepository, purchase_requests: CreditPurchaseRepository) -> Self {
        Self { ledger, purchase_requests }
    }

    /// Submits a new purchase request in `PENDING` status (§4.C12 step 1).
    pub async fn submit_purchase_request(
        &self,
        driver_id: Uuid,
        credits: i64,
        months: i64,
    ) -> DispatchResult<CreditPurchaseRequest> {
        self.purchase_requests.create(driver_id, credits, months).await
    }

    pub async fn find_purchase_request(&self, id: Uuid) -> DispatchResult<CreditPurchaseRequest> {
        self.purchase_requests.find_by_id(id).await
    }

    /// Rejects a pending purchase request (§4.C12: "rejection only updates the
    /// request row"). Never touches the ledger or `drivers.credit_balance`.
    pub async fn reject_purchase_request(&self, id: Uuid) -> DispatchResult<()> {
        if !self.purchase_requests.mark_rejected(id).await? {
            return Err(DispatchError::Conflict("purchase request already decided".into()));
        }
        Ok(())
    }

    pub async fn history(&self, driver_id: Uuid) -> DispatchResult<Vec<DriverCreditLedgerEntry>> {
        self.ledger.history(driver_id).await
    }

    /// Detects drift between the fast-path `drivers.credit_balance` column and the
    /// ledger's running sum — used by the reconciliation sweep and by support
    /// tooling when a driver disputes their balance.
    pub async fn detect_drift(&self, driver_id: Uuid, reported_balance: i64) -> DispatchResult<Option<i64>> {
        let reconstructed = self.ledger.reconstructed_balance(driver_id).await?;
        if reconstructed == reported_balance {
            Ok(None)
        } else {
            Ok(Some(reconstructed - reported_balance))
        }
    }

    /// Approves a pending credit purchase request, returning the `(credits, months)`
    /// the caller should then grant via `SettlementService::grant_credit_package`
    /// inside its own transaction (approval and grant are kept as separate steps so
    /// a rejected request never touches the ledger at all).
    pub fn approve(&self, request: &CreditPurchaseRequest) -> DispatchResult<(i64, i64)> {
        if request.status != CreditPurchaseStatus::Pending {
            return Err(DispatchError::Conflict("purchase request already decided".into()));
        }
        Ok((request.credits, request.months))
    }

    /// CAS the request to `APPROVED` once the grant has actually been made. Called
    /// after `SettlementService::grant_credit_package` succeeds, so a request is
    /// never marked approved without the credits having landed.
    pub async fn mark_purchase_approved(&self, id: Uuid) -> DispatchResult<()> {
        if !self.purchase_requests.mark_approved(id).await? {
            return Err(DispatchError::Conflict("purchase request already decided".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending_request() -> CreditPurchaseRequest {
        CreditPurchaseRequest {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            credits: 100,
            months: 1,
            status: CreditPurchaseStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn approve_returns_credits_and_months_for_pending_request() {
        let service = CreditLedgerService::new(
            CreditLedgerRepository::new(never_used_pool()),
            CreditPurchaseRepository::new(never_used_pool()),
        );
        let request = pending_request();
        let (credits, months) = service.approve(&request).expect("pending request approves");
        assert_eq!(credits, 100);
        assert_eq!(months, 1);
    }

    #[test]
    fn approve_rejects_an_already_decided_request() {
        let service = CreditLedgerService::new(
            CreditLedgerRepository::new(never_used_pool()),
            CreditPurchaseRepository::new(never_used_pool()),
        );
        let mut request = pending_request();
        request.status = CreditPurchaseStatus::Approved;
        assert!(service.approve(&request).is_err());
    }

    fn never_used_pool() -> crate::db::Pool {
        sqlx::Pool::connect_lazy("postgres://unused/unused").expect("lazy pool never connects")
    }
}
