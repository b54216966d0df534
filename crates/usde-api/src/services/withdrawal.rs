//! # Withdrawal Service
//!
//! Gates and executes withdrawals against a company's available balance and
//! the process-wide withdrawal limits.
//!
//! ## Lifecycle
//!
//! ```text
//! create_withdrawal ──► processing ──► process_bank_transfer ──► success
//!                                                          └───► failed (refunded)
//! ```
//!
//! Creation is one store call: the store re-reads balance, locks, today's
//! total and the named bank account under its own lock, authorizes, debits
//! and appends the `withdraw` entry. Before the payout gateway is called
//! the withdrawal is claimed, a conditional write that succeeds for one
//! caller only, so the bank is asked at most once per withdrawal. The
//! gateway is called with no lock held; settlement is a third store call
//! that requires the claim and the `processing` status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use usde_core::{
    BalanceCheck, LimitCheck, PageRequest, Pagination, WithdrawalLimits, WithdrawalStatus,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::metrics::ApiMetrics;
use crate::services::payout::PayoutGateway;
use crate::state::Withdrawal;
use crate::store::{LedgerStore, NewWithdrawal, StoreError, WithdrawalStats};

// ── Results ─────────────────────────────────────────────────────────────────

/// Result of [`WithdrawalService::process_bank_transfer`]. A refused payout
/// is reported here with `status: failed`, not as an error.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub withdrawal_id: Uuid,
    #[schema(value_type = String)]
    pub status: WithdrawalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bank details shown next to a withdrawal in history.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountSummary {
    pub bank_name: String,
    pub account_num: String,
}

/// A withdrawal with its destination account.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalView {
    #[serde(flatten)]
    pub withdrawal: Withdrawal,
    /// Absent when the account has since been deleted.
    pub bank_account: Option<BankAccountSummary>,
}

/// One page of withdrawal history.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalHistory {
    pub withdrawals: Vec<WithdrawalView>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

// ── Service ─────────────────────────────────────────────────────────────────

/// Withdrawal operations. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct WithdrawalService {
    store: Arc<dyn LedgerStore>,
    payouts: Arc<dyn PayoutGateway>,
    limits: WithdrawalLimits,
    metrics: ApiMetrics,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        payouts: Arc<dyn PayoutGateway>,
        limits: WithdrawalLimits,
        metrics: ApiMetrics,
    ) -> Self {
        Self {
            store,
            payouts,
            limits,
            metrics,
        }
    }

    /// Limits in force for this process.
    pub fn limits(&self) -> WithdrawalLimits {
        self.limits
    }

    /// `available = usde_balance − Σ locked`, unclamped.
    pub async fn check_available_balance(
        &self,
        company_id: Uuid,
        amount: Decimal,
    ) -> Result<BalanceCheck, StoreError> {
        let ctx = self.store.withdrawal_context(company_id, Utc::now()).await?;
        Ok(BalanceCheck::compute(
            ctx.total_balance,
            ctx.locked_amount,
            amount,
        ))
    }

    /// KYC, verified account, daily limit and single limit, in that order.
    pub async fn check_withdrawal_limits(
        &self,
        company_id: Uuid,
        amount: Decimal,
    ) -> Result<LimitCheck, StoreError> {
        let ctx = self.store.withdrawal_context(company_id, Utc::now()).await?;
        Ok(self.limits.check(
            ctx.kyc_status,
            ctx.verified_bank_account,
            ctx.daily_total,
            amount,
        )?)
    }

    /// Burn `amount` and leave the withdrawal `processing`, ready for
    /// [`process_bank_transfer`](Self::process_bank_transfer).
    pub async fn create_withdrawal(
        &self,
        company_id: Uuid,
        amount: Decimal,
        bank_account_id: Uuid,
    ) -> Result<Withdrawal, StoreError> {
        let id = Uuid::new_v4();
        let timestamp = Utc::now();
        let new = NewWithdrawal {
            id,
            company_id,
            bank_account_id,
            amount,
            burn_tx_hash: burn_tx_hash(company_id, id, amount, timestamp),
            timestamp,
        };

        let withdrawal = self
            .store
            .create_withdrawal(new, self.limits)
            .await
            .map_err(|err| {
                tracing::info!(%company_id, %amount, error = %err, "withdrawal rejected");
                err
            })?;

        self.metrics.record_withdrawal_created();
        tracing::info!(
            %company_id,
            withdrawal_id = %withdrawal.id,
            %amount,
            burn_tx_hash = withdrawal.burn_tx_hash.as_deref().unwrap_or_default(),
            "withdrawal created"
        );
        Ok(withdrawal)
    }

    /// Pay out a `processing` withdrawal and settle it with the result.
    pub async fn process_bank_transfer(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<TransferOutcome, StoreError> {
        let withdrawal = self
            .store
            .claim_withdrawal(withdrawal_id, Utc::now())
            .await
            .map_err(|err| {
                tracing::info!(%withdrawal_id, error = %err, "payout not started");
                err
            })?;

        let outcome = self.payouts.payout(&withdrawal).await;
        let settled = self
            .store
            .settle_withdrawal(withdrawal_id, outcome, Utc::now())
            .await?;

        let succeeded = settled.status == WithdrawalStatus::Success;
        self.metrics.record_payout(succeeded);
        if succeeded {
            tracing::info!(
                %withdrawal_id,
                company_id = %settled.company_id,
                payout_id = settled.payout_id.as_deref().unwrap_or_default(),
                "withdrawal paid out"
            );
        } else {
            tracing::warn!(
                %withdrawal_id,
                company_id = %settled.company_id,
                amount = %settled.amount,
                reason = settled.notes.as_deref().unwrap_or_default(),
                "payout failed, amount refunded"
            );
        }

        Ok(TransferOutcome {
            withdrawal_id,
            status: settled.status,
            payout_id: settled.payout_id,
            processed_at: settled.processed_at,
            error: if succeeded { None } else { settled.notes },
        })
    }

    /// Newest first, with each withdrawal's bank name and account number.
    pub async fn history(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<WithdrawalHistory, StoreError> {
        let rows = self.store.withdrawals(company_id, page).await?;
        let accounts: HashMap<Uuid, BankAccountSummary> = self
            .store
            .bank_accounts(company_id)
            .await?
            .into_iter()
            .map(|a| {
                (
                    a.id,
                    BankAccountSummary {
                        bank_name: a.bank_name,
                        account_num: a.account_num,
                    },
                )
            })
            .collect();

        let withdrawals = rows
            .items
            .into_iter()
            .map(|w| WithdrawalView {
                bank_account: accounts.get(&w.bank_account_id).cloned(),
                withdrawal: w,
            })
            .collect();
        Ok(WithdrawalHistory {
            withdrawals,
            pagination: page.paginate(rows.total),
        })
    }

    pub async fn stats(&self, company_id: Uuid) -> Result<WithdrawalStats, StoreError> {
        self.store.withdrawal_stats(company_id).await
    }
}

impl std::fmt::Debug for WithdrawalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithdrawalService")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// `0x` + SHA-256 over the company, withdrawal, amount and time.
fn burn_tx_hash(
    company_id: Uuid,
    withdrawal_id: Uuid,
    amount: Decimal,
    timestamp: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(company_id.as_bytes());
    hasher.update(withdrawal_id.as_bytes());
    hasher.update(amount.normalize().to_string().as_bytes());
    hasher.update(timestamp.timestamp_millis().to_be_bytes());
    format!("0x{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayoutConfig;
    use crate::services::payout::{SimulatedBank, SIMULATED_FAILURE};
    use crate::state::BankAccount;
    use crate::store::memory::MemoryStore;
    use crate::store::NewCompany;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use usde_core::{CompanyKind, KycDecision, KycStatus, LedgerError, PayoutOutcome, Role};

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn service(store: Arc<MemoryStore>, success_rate: f64) -> WithdrawalService {
        let bank = SimulatedBank::new(PayoutConfig {
            delay: Duration::ZERO,
            success_rate,
        });
        WithdrawalService::new(
            store,
            Arc::new(bank),
            WithdrawalLimits::default(),
            ApiMetrics::new(),
        )
    }

    /// Company with `balance` USDE; KYC approved and a verified account
    /// when `ready`.
    async fn company(store: &MemoryStore, balance: i64, ready: bool) -> (Uuid, Uuid) {
        let company = store
            .insert_company(NewCompany {
                name: "Harbor Logistics".into(),
                email: format!("{}@harbor.test", Uuid::new_v4()),
                password_hash: "hash".into(),
                kind: CompanyKind::Company,
                role: Role::EnterpriseAdmin,
                kyc_status: KycStatus::Pending,
                parent_company_id: None,
                enterprise_id: None,
                company_code: None,
                company_address: None,
            })
            .await
            .unwrap();
        store.fund(company.id, d(balance)).await;
        let account = store
            .insert_bank_account(company.id, "First Bank".into(), "000777".into(), "USD".into())
            .await
            .unwrap();
        if ready {
            store
                .review_kyc(company.id, Uuid::new_v4(), KycDecision::Approved, None, Utc::now())
                .await
                .unwrap();
            store
                .mark_bank_account_verified(company.id, account.id)
                .await
                .unwrap();
        }
        (company.id, account.id)
    }

    #[tokio::test]
    async fn withdraw_3000_of_5000_leaves_2000() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 1.0);
        let (company_id, account_id) = company(&store, 5000, true).await;

        let w = svc
            .create_withdrawal(company_id, d(3000), account_id)
            .await
            .unwrap();
        assert_eq!(w.status, WithdrawalStatus::Processing);
        let hash = w.burn_tx_hash.unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);

        let balance = svc.check_available_balance(company_id, d(1)).await.unwrap();
        assert_eq!(balance.total_balance, d(2000));
        assert_eq!(svc.metrics.snapshot().withdrawals_created, 1);
    }

    #[tokio::test]
    async fn single_limit_checked_before_any_mutation() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 1.0);
        let (company_id, _) = company(&store, 9000, true).await;

        let err = svc
            .check_withdrawal_limits(company_id, d(6000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::SingleLimitExceeded { .. })
        ));
        let stats = svc.stats(company_id).await.unwrap();
        assert_eq!(stats.total_withdrawals, 0);
    }

    #[tokio::test]
    async fn unapproved_kyc_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 1.0);
        let (company_id, account_id) = company(&store, 5000, false).await;

        let err = svc
            .create_withdrawal(company_id, d(100), account_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::KycRequired { .. })
        ));
        let history = svc.history(company_id, PageRequest::default()).await.unwrap();
        assert!(history.withdrawals.is_empty());
        assert_eq!(history.pagination.total, 0);
    }

    #[tokio::test]
    async fn successful_transfer_sets_payout_id() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 1.0);
        let (company_id, account_id) = company(&store, 5000, true).await;
        let w = svc
            .create_withdrawal(company_id, d(1000), account_id)
            .await
            .unwrap();

        let outcome = svc.process_bank_transfer(w.id).await.unwrap();
        assert_eq!(outcome.status, WithdrawalStatus::Success);
        assert!(outcome.payout_id.unwrap().starts_with("po_"));
        assert!(outcome.processed_at.is_some());
        assert!(outcome.error.is_none());

        let stats = svc.stats(company_id).await.unwrap();
        assert_eq!(stats.successful_withdrawals, 1);
        assert_eq!(stats.total_amount, d(1000));
    }

    #[tokio::test]
    async fn failed_transfer_restores_balance() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 0.0);
        let (company_id, account_id) = company(&store, 5000, true).await;
        let w = svc
            .create_withdrawal(company_id, d(2500), account_id)
            .await
            .unwrap();

        let outcome = svc.process_bank_transfer(w.id).await.unwrap();
        assert_eq!(outcome.status, WithdrawalStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some(SIMULATED_FAILURE));
        assert!(outcome.payout_id.is_none());

        let balance = svc.check_available_balance(company_id, d(0)).await.unwrap();
        assert_eq!(balance.total_balance, d(5000));
        assert_eq!(svc.metrics.snapshot().withdrawals_failed, 1);
    }

    #[tokio::test]
    async fn settled_withdrawal_cannot_be_processed_again() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 1.0);
        let (company_id, account_id) = company(&store, 5000, true).await;
        let w = svc
            .create_withdrawal(company_id, d(100), account_id)
            .await
            .unwrap();
        svc.process_bank_transfer(w.id).await.unwrap();

        let err = svc.process_bank_transfer(w.id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::InvalidState { .. })
        ));
        let err = svc.process_bank_transfer(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::NotFound { .. })));
    }

    /// Counts payouts and holds each one long enough for callers to race.
    #[derive(Default)]
    struct SlowBank {
        payouts: AtomicUsize,
    }

    #[axum::async_trait]
    impl PayoutGateway for SlowBank {
        async fn payout(&self, _withdrawal: &Withdrawal) -> PayoutOutcome {
            self.payouts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            PayoutOutcome::Paid {
                payout_id: "po_slow".into(),
            }
        }

        async fn verify_account(&self, _account: &BankAccount) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn concurrent_processing_pays_out_once() {
        let store = Arc::new(MemoryStore::new());
        let bank = Arc::new(SlowBank::default());
        let svc = WithdrawalService::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            Arc::clone(&bank) as Arc<dyn PayoutGateway>,
            WithdrawalLimits::default(),
            ApiMetrics::new(),
        );
        let (company_id, account_id) = company(&store, 5000, true).await;
        let w = svc
            .create_withdrawal(company_id, d(1000), account_id)
            .await
            .unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.process_bank_transfer(w.id).await })
            })
            .collect();
        let mut paid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => {
                    assert_eq!(outcome.status, WithdrawalStatus::Success);
                    paid += 1;
                }
                Err(err) => assert!(matches!(
                    err,
                    StoreError::Ledger(LedgerError::InvalidState { .. })
                )),
            }
        }
        assert_eq!(paid, 1);
        assert_eq!(bank.payouts.load(Ordering::SeqCst), 1);
        let stored = store.withdrawal(w.id).await.unwrap().unwrap();
        assert!(stored.payout_started_at.is_some());
        assert_eq!(stored.status, WithdrawalStatus::Success);
    }

    #[tokio::test]
    async fn history_includes_bank_details_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Arc::clone(&store), 1.0);
        let (company_id, account_id) = company(&store, 5000, true).await;
        let first = svc
            .create_withdrawal(company_id, d(100), account_id)
            .await
            .unwrap();
        let second = svc
            .create_withdrawal(company_id, d(200), account_id)
            .await
            .unwrap();

        let history = svc
            .history(company_id, PageRequest::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(history.pagination.total, 2);
        assert_eq!(history.pagination.pages, 2);
        assert_eq!(history.withdrawals.len(), 1);
        let newest = &history.withdrawals[0];
        assert!(newest.withdrawal.id == second.id || newest.withdrawal.id == first.id);
        let bank = newest.bank_account.as_ref().unwrap();
        assert_eq!(bank.bank_name, "First Bank");

        let json = serde_json::to_value(newest).unwrap();
        assert_eq!(json["bankAccount"]["accountNum"], "000777");
        assert_eq!(json["status"], "processing");
    }

    #[test]
    fn burn_hash_is_deterministic() {
        let company = Uuid::new_v4();
        let id = Uuid::new_v4();
        let now = Utc::now();
        assert_eq!(
            burn_tx_hash(company, id, d(10), now),
            burn_tx_hash(company, id, Decimal::new(1000, 2), now)
        );
        assert_ne!(
            burn_tx_hash(company, id, d(10), now),
            burn_tx_hash(company, id, d(11), now)
        );
    }
}
