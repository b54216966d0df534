//! # Ledger Storage
//!
//! [`LedgerStore`] is the seam between route handlers and persistence. Two
//! implementations exist:
//!
//! - [`memory::MemoryStore`] — all tables behind one mutex; used when
//!   `DATABASE_URL` is unset and in tests.
//! - [`postgres::PgStore`] — PostgreSQL through SQLx.
//!
//! ## Atomicity
//!
//! Every operation that moves funds (withdrawal creation and settlement,
//! deposit completion, payments, stakes and their maturity, lock release)
//! is a single trait call. Implementations evaluate the domain checks and apply every write
//! inside one critical section: a mutex guard for the memory store, a
//! transaction with `SELECT ... FOR UPDATE` on the affected company rows for
//! PostgreSQL. A rejected operation leaves no partial state.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use usde_core::stake::{accrued_days, daily_earnings};
use usde_core::{
    BalanceChange, CompanyKind, CompanyStatus, KycDecision, KycStatus, LedgerError, LockPeriod,
    PageRequest, PayoutOutcome, Role, StakeStatus, StakeTerms, TransactionKind,
    TreasurySettings, WithdrawalContext, WithdrawalLimits, WithdrawalStatus,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    AuditLog, BankAccount, Company, Deposit, Earning, Enterprise, KycProfile, KycReview,
    LedgerEntry, LockedBalance, Payment, Stake, Ubo, Withdrawal,
};

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

// ── Inputs ──────────────────────────────────────────────────────────────────

/// A company to insert.
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub kind: CompanyKind,
    pub role: Role,
    pub kyc_status: KycStatus,
    pub parent_company_id: Option<Uuid>,
    pub enterprise_id: Option<Uuid>,
    pub company_code: Option<String>,
    pub company_address: Option<String>,
}

/// Partial company update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CompanyPatch {
    pub name: Option<String>,
    pub company_code: Option<String>,
    pub company_address: Option<String>,
    pub role: Option<Role>,
    pub status: Option<CompanyStatus>,
}

/// A withdrawal about to be created. Id and burn hash are derived by the
/// caller before the store authorizes it.
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub id: Uuid,
    pub company_id: Uuid,
    pub bank_account_id: Uuid,
    pub amount: Decimal,
    pub burn_tx_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// A payment about to be sent.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub from_id: Uuid,
    pub to_email: String,
    pub amount: Decimal,
    pub lock: LockPeriod,
}

/// One beneficial owner in a KYC submission.
#[derive(Debug, Clone)]
pub struct NewUbo {
    pub name: String,
    pub id_number: String,
    pub nationality: String,
    pub address: String,
    pub ownership_percentage: Decimal,
}

/// A complete KYC application.
#[derive(Debug, Clone)]
pub struct KycSubmission {
    pub profile: KycProfile,
    pub ubos: Vec<NewUbo>,
}

/// An audit entry about to be chained.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub target_id: Uuid,
    pub details: serde_json::Value,
}

// ── Outputs ─────────────────────────────────────────────────────────────────

/// One page of rows plus the total row count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Per-company withdrawal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalStats {
    pub total_withdrawals: u64,
    /// Pending plus processing.
    pub pending_withdrawals: u64,
    pub successful_withdrawals: u64,
    pub failed_withdrawals: u64,
    /// Sum of successful withdrawals.
    pub total_amount: Decimal,
}

/// Per-company deposit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositStats {
    pub total_deposits: u64,
    pub completed_deposits: u64,
    pub pending_deposits: u64,
    /// Fiat amount of completed deposits.
    pub total_amount: Decimal,
    pub total_fees: Decimal,
    pub total_usde_minted: Decimal,
}

/// Platform-wide counters for administrators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_companies: u64,
    pub active_companies: u64,
    pub total_usde: Decimal,
    pub total_withdrawals: u64,
    pub active_withdrawals: u64,
    pub pending_kyc: u64,
}

/// A company's KYC record with its owners and review history.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycApplication {
    #[schema(value_type = String)]
    pub kyc_status: KycStatus,
    pub profile: Option<KycProfile>,
    pub ubos: Vec<Ubo>,
    /// Newest first.
    pub reviews: Vec<KycReview>,
}

/// Sum and count of a company's accrued earnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    pub total_earnings: Decimal,
    pub count: u64,
}

/// Per-company payment counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub sent_count: u64,
    pub sent_total: Decimal,
    pub received_count: u64,
    pub received_total: Decimal,
}

/// Money movements of every company in an enterprise over one period,
/// oldest first.
#[derive(Debug, Clone, Default)]
pub struct EnterpriseActivity {
    /// Payments sent by the enterprise's companies.
    pub payments: Vec<Payment>,
    pub withdrawals: Vec<Withdrawal>,
    pub deposits: Vec<Deposit>,
}

/// Completed deposit plus the company's balance after the mint.
#[derive(Debug, Clone)]
pub struct CompletedDeposit {
    pub deposit: Deposit,
    pub usde_balance: Decimal,
}

// ── Trait ───────────────────────────────────────────────────────────────────

/// Persistence operations used by the API.
#[axum::async_trait]
pub trait LedgerStore: Send + Sync {
    // Companies

    /// Insert a company. `Duplicate` when the e-mail is taken.
    async fn insert_company(&self, new: NewCompany) -> Result<Company, StoreError>;

    /// Insert an enterprise admin company and its enterprise in one unit.
    async fn register_enterprise(
        &self,
        new: NewCompany,
        enterprise_name: String,
    ) -> Result<(Company, Enterprise), StoreError>;

    /// Insert a subsidiary under `parent_id` and mark the parent.
    async fn create_subsidiary(
        &self,
        parent_id: Uuid,
        new: NewCompany,
    ) -> Result<Company, StoreError>;

    async fn company(&self, id: Uuid) -> Result<Option<Company>, StoreError>;

    async fn company_by_email(&self, email: &str) -> Result<Option<Company>, StoreError>;

    /// Apply `patch`. `NotFound` when absent.
    async fn update_company(&self, id: Uuid, patch: CompanyPatch) -> Result<Company, StoreError>;

    /// All companies, newest first.
    async fn companies(&self, page: PageRequest) -> Result<Page<Company>, StoreError>;

    async fn subsidiaries(&self, parent_id: Uuid) -> Result<Vec<Company>, StoreError>;

    /// Companies attached to an enterprise, oldest first.
    async fn enterprise_users(&self, enterprise_id: Uuid) -> Result<Vec<Company>, StoreError>;

    // Enterprises

    async fn enterprise(&self, id: Uuid) -> Result<Option<Enterprise>, StoreError>;

    async fn update_treasury_settings(
        &self,
        id: Uuid,
        settings: TreasurySettings,
    ) -> Result<Enterprise, StoreError>;

    // Bank accounts

    /// Insert an unverified account. `Duplicate` on the same bank and number.
    async fn insert_bank_account(
        &self,
        company_id: Uuid,
        bank_name: String,
        account_num: String,
        currency: String,
    ) -> Result<BankAccount, StoreError>;

    async fn bank_accounts(&self, company_id: Uuid) -> Result<Vec<BankAccount>, StoreError>;

    async fn bank_account(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<BankAccount>, StoreError>;

    /// Mark verified. `InvalidState` when already verified.
    async fn mark_bank_account_verified(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<BankAccount, StoreError>;

    /// Delete. `InvalidState` while an active withdrawal references it.
    async fn delete_bank_account(&self, company_id: Uuid, id: Uuid) -> Result<(), StoreError>;

    // Withdrawals

    /// Snapshot of the inputs to the balance and limit checks.
    /// `NotFound` when the company is absent.
    async fn withdrawal_context(
        &self,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalContext, StoreError>;

    /// Authorize and create a withdrawal in one unit: balance, limits and
    /// the named account are checked against current state, then the
    /// withdrawal moves to `processing`, the balance is debited and one
    /// `withdraw` ledger entry is appended.
    async fn create_withdrawal(
        &self,
        new: NewWithdrawal,
        limits: WithdrawalLimits,
    ) -> Result<Withdrawal, StoreError>;

    /// Mark a `processing` withdrawal as handed to the payout gateway.
    /// Succeeds once per withdrawal; later calls get `InvalidState`, so
    /// concurrent processors cannot both pay out.
    async fn claim_withdrawal(&self, id: Uuid, now: DateTime<Utc>)
        -> Result<Withdrawal, StoreError>;

    /// Settle a claimed `processing` withdrawal with the gateway outcome. A
    /// rejection refunds the amount and appends a `refund` ledger entry.
    async fn settle_withdrawal(
        &self,
        id: Uuid,
        outcome: PayoutOutcome,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, StoreError>;

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, StoreError>;

    /// A company's withdrawals, newest first.
    async fn withdrawals(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Withdrawal>, StoreError>;

    async fn withdrawal_stats(&self, company_id: Uuid) -> Result<WithdrawalStats, StoreError>;

    /// Pending and processing withdrawals across all companies, oldest first.
    async fn active_withdrawals(&self) -> Result<Vec<Withdrawal>, StoreError>;

    // Deposits

    async fn insert_deposit(&self, deposit: Deposit) -> Result<Deposit, StoreError>;

    /// Deposits created by `company_id` at or after `since`.
    async fn recent_deposit_count(
        &self,
        company_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn deposits(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Deposit>, StoreError>;

    /// Mark completed, credit `usde_amount` and append a `mint` entry. A
    /// pending deposit past `expires_at` is marked `expired` instead and
    /// the call fails with `InvalidState`.
    async fn complete_deposit(
        &self,
        company_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CompletedDeposit, StoreError>;

    async fn deposit_stats(&self, company_id: Uuid) -> Result<DepositStats, StoreError>;

    /// Mark every pending deposit past its expiry `expired`. Returns the
    /// number marked.
    async fn expire_deposits(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // Payments and locks

    /// Debit the sender, credit the recipient, lock the funds on the
    /// recipient and append both ledger entries.
    async fn create_payment(
        &self,
        new: NewPayment,
        now: DateTime<Utc>,
    ) -> Result<Payment, StoreError>;

    async fn payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    /// Payments sent or received by `company_id`, newest first.
    async fn payments(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Payment>, StoreError>;

    async fn payment_summary(&self, company_id: Uuid) -> Result<PaymentSummary, StoreError>;

    /// Release a payment whose lock period has ended and drop its lock.
    async fn release_payment(&self, id: Uuid, now: DateTime<Utc>)
        -> Result<Payment, StoreError>;

    async fn locked_balances(&self, company_id: Uuid) -> Result<Vec<LockedBalance>, StoreError>;

    /// Remove every lock whose `release_at` has passed and mark its payment
    /// released. Returns the number of locks removed.
    async fn release_expired_locks(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // Stakes

    /// Debit `terms.amount` and append a `stake` ledger entry.
    async fn create_stake(
        &self,
        company_id: Uuid,
        terms: StakeTerms,
        now: DateTime<Utc>,
    ) -> Result<Stake, StoreError>;

    async fn stakes(
        &self,
        company_id: Uuid,
        status: Option<StakeStatus>,
        page: PageRequest,
    ) -> Result<Page<Stake>, StoreError>;

    async fn stake(&self, company_id: Uuid, id: Uuid) -> Result<Option<Stake>, StoreError>;

    async fn active_stakes(&self, company_id: Uuid) -> Result<Vec<Stake>, StoreError>;

    /// Record one earning per whole day held by each active stake, up to
    /// its term, that has not been recorded yet. Returns the number added.
    async fn accrue_stake_earnings(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Complete every active stake whose end date has passed: accrue its
    /// remaining days, credit the principal (`unstake`) and the accrued
    /// interest (`interest`), and mark it `completed`. Returns the number
    /// completed.
    async fn complete_matured_stakes(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// A company's earnings accrued at or after `since`, newest first.
    async fn earnings(
        &self,
        company_id: Uuid,
        since: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Earning>, StoreError>;

    async fn earnings_summary(
        &self,
        company_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<EarningsSummary, StoreError>;

    // Enterprises reporting

    /// Payments sent, withdrawals and deposits of the enterprise's
    /// companies with timestamps in `[start, end)`.
    async fn enterprise_activity(
        &self,
        enterprise_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EnterpriseActivity, StoreError>;

    // Ledger

    /// Ledger entries of `company_id`, newest first.
    async fn transactions(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>, StoreError>;

    // KYC

    /// Store the profile, replace the owners, set status `pending` and
    /// append a `submitted` review. `InvalidState` once approved.
    async fn submit_kyc(
        &self,
        submission: KycSubmission,
        now: DateTime<Utc>,
    ) -> Result<Company, StoreError>;

    async fn kyc_application(&self, company_id: Uuid) -> Result<KycApplication, StoreError>;

    /// Record a reviewer decision on a pending application.
    async fn review_kyc(
        &self,
        company_id: Uuid,
        reviewer_id: Uuid,
        decision: KycDecision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Company, StoreError>;

    /// Companies filtered by KYC status, newest first.
    async fn kyc_applications(
        &self,
        status: Option<KycStatus>,
        page: PageRequest,
    ) -> Result<Page<Company>, StoreError>;

    // Audit

    /// Append an entry chained to the current head.
    async fn append_audit(
        &self,
        entry: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<AuditLog, StoreError>;

    /// Newest first.
    async fn audit_logs(&self, page: PageRequest) -> Result<Page<AuditLog>, StoreError>;

    /// The full chain in append order.
    async fn audit_chain(&self) -> Result<Vec<AuditLog>, StoreError>;

    // Administration

    async fn platform_stats(&self) -> Result<PlatformStats, StoreError>;
}

/// Ledger metadata attached to a withdraw entry.
pub(crate) fn withdrawal_metadata(withdrawal_id: Uuid, burn_tx_hash: &str) -> serde_json::Value {
    serde_json::json!({ "withdrawalId": withdrawal_id, "burnTxHash": burn_tx_hash })
}

/// Fail unless `w` is `processing` and no payout has started for it.
pub(crate) fn require_claimable(w: &Withdrawal) -> Result<(), LedgerError> {
    if w.status != WithdrawalStatus::Processing {
        return Err(LedgerError::invalid_state(
            "withdrawal",
            w.status,
            "only processing withdrawals can be paid out",
        ));
    }
    if w.payout_started_at.is_some() {
        return Err(LedgerError::invalid_state(
            "withdrawal",
            w.status,
            "payout already started",
        ));
    }
    Ok(())
}

/// Fail unless a payout was started for `w`.
pub(crate) fn require_claimed(w: &Withdrawal) -> Result<(), LedgerError> {
    if w.payout_started_at.is_none() {
        return Err(LedgerError::invalid_state(
            "withdrawal",
            w.status,
            "payout has not been started",
        ));
    }
    Ok(())
}

/// Earnings owed to `stake` at `now` beyond the `recorded` days already
/// accrued.
pub(crate) fn stake_accruals(stake: &Stake, recorded: u32, now: DateTime<Utc>) -> Vec<Earning> {
    let owed = accrued_days(stake.start_date, stake.end_date, now);
    let daily = daily_earnings(stake.amount, stake.apy);
    (i64::from(recorded) + 1..=owed)
        .filter_map(|day| u32::try_from(day).ok())
        .map(|day| Earning {
            id: Uuid::new_v4(),
            company_id: stake.company_id,
            stake_id: stake.id,
            day,
            amount: daily,
            accrued_for: stake.start_date + Duration::days(i64::from(day)),
            created_at: now,
        })
        .collect()
}

/// Postings that return a matured stake's principal and `interest` to a
/// company whose balance is `balance`.
pub(crate) fn maturity_postings(
    stake: &Stake,
    balance: Decimal,
    interest: Decimal,
) -> Result<Vec<Posting>, LedgerError> {
    let metadata = serde_json::json!({ "stakeId": stake.id, "apy": stake.apy });
    let principal = BalanceChange::credit(balance, stake.amount)?;
    let mut postings = vec![Posting {
        company_id: stake.company_id,
        kind: TransactionKind::Unstake,
        amount: stake.amount,
        change: principal,
        description: "Stake matured, principal returned".into(),
        metadata: metadata.clone(),
    }];
    if interest > Decimal::ZERO {
        postings.push(Posting {
            company_id: stake.company_id,
            kind: TransactionKind::Interest,
            amount: interest,
            change: BalanceChange::credit(principal.after, interest)?,
            description: "Staking interest paid".into(),
            metadata,
        });
    }
    Ok(postings)
}

/// A balance change on one company and the ledger entry recording it.
pub(crate) struct Posting {
    pub company_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub change: BalanceChange,
    pub description: String,
    pub metadata: serde_json::Value,
}

impl Posting {
    pub(crate) fn into_entry(self, now: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            company_id: self.company_id,
            kind: self.kind,
            amount: self.amount,
            balance_before: self.change.before,
            balance_after: self.change.after,
            description: self.description,
            metadata: self.metadata,
            created_at: now,
        }
    }
}
