//! # In-Memory Store
//!
//! Every table lives behind one [`parking_lot::Mutex`]. Each trait call
//! takes the guard once, runs its checks and writes, and drops it before
//! returning, so a multi-step mutation is atomic and the guard is never
//! held across an `.await`.
//!
//! Used when `DATABASE_URL` is unset and by the test suites. State does not
//! survive a restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use usde_core::audit::GENESIS_HASH;
use usde_core::limits::utc_day_bounds;
use usde_core::stake::is_matured;
use usde_core::{
    BalanceChange, CompanyStatus, DepositStatus, KycDecision, KycStatus, LedgerError,
    PageRequest, PaymentStatus, PayoutOutcome, StakeStatus, StakeTerms, TransactionKind,
    TreasurySettings, WithdrawalContext, WithdrawalLimits, WithdrawalStatus,
};
use uuid::Uuid;

use super::{
    maturity_postings, require_claimable, require_claimed, stake_accruals, withdrawal_metadata,
    CompanyPatch, CompletedDeposit, DepositStats, EarningsSummary, EnterpriseActivity,
    KycApplication, KycSubmission, LedgerStore, NewAuditEntry, NewCompany, NewPayment,
    NewWithdrawal, Page, PaymentSummary, PlatformStats, Posting, StoreError, WithdrawalStats,
};
use crate::state::{
    AuditLog, BankAccount, Company, Deposit, Earning, Enterprise, KycProfile, KycReview,
    LedgerEntry, LockedBalance, Payment, Stake, Ubo, Withdrawal,
};

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct Tables {
    companies: HashMap<Uuid, Company>,
    enterprises: HashMap<Uuid, Enterprise>,
    bank_accounts: Vec<BankAccount>,
    locks: Vec<LockedBalance>,
    withdrawals: Vec<Withdrawal>,
    ledger: Vec<LedgerEntry>,
    deposits: Vec<Deposit>,
    payments: Vec<Payment>,
    stakes: Vec<Stake>,
    earnings: Vec<Earning>,
    kyc_profiles: HashMap<Uuid, KycProfile>,
    ubos: Vec<Ubo>,
    kyc_reviews: Vec<KycReview>,
    audit: Vec<AuditLog>,
}

impl Tables {
    fn company(&self, id: Uuid) -> Result<&Company, LedgerError> {
        self.companies
            .get(&id)
            .ok_or_else(|| LedgerError::not_found("company", id))
    }

    fn company_mut(&mut self, id: Uuid) -> Result<&mut Company, LedgerError> {
        self.companies
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("company", id))
    }

    fn email_taken(&self, email: &str) -> bool {
        self.companies.values().any(|c| c.email == email)
    }

    fn build_company(new: NewCompany, now: DateTime<Utc>) -> Company {
        Company {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            kind: new.kind,
            role: new.role,
            status: CompanyStatus::Active,
            kyc_status: new.kyc_status,
            usde_balance: Decimal::ZERO,
            balance: Decimal::ZERO,
            parent_company_id: new.parent_company_id,
            is_parent_company: false,
            enterprise_id: new.enterprise_id,
            company_code: new.company_code,
            company_address: new.company_address,
            created_at: now,
            updated_at: now,
        }
    }

    fn insert_company(&mut self, company: Company) -> Result<Company, LedgerError> {
        if self.email_taken(&company.email) {
            return Err(LedgerError::Duplicate {
                resource: "company",
                key: company.email,
            });
        }
        self.companies.insert(company.id, company.clone());
        Ok(company)
    }

    fn locked_total(&self, company_id: Uuid) -> Decimal {
        self.locks
            .iter()
            .filter(|l| l.company_id == company_id)
            .map(|l| l.amount)
            .sum()
    }

    fn available(&self, company: &Company) -> Decimal {
        company.usde_balance - self.locked_total(company.id)
    }

    fn daily_total(&self, company_id: Uuid, now: DateTime<Utc>) -> Decimal {
        let (start, end) = utc_day_bounds(now);
        self.withdrawals
            .iter()
            .filter(|w| {
                w.company_id == company_id
                    && w.status.counts_toward_daily_limit()
                    && w.timestamp >= start
                    && w.timestamp < end
            })
            .map(|w| w.amount)
            .sum()
    }

    fn context(&self, company_id: Uuid, now: DateTime<Utc>) -> Result<WithdrawalContext, LedgerError> {
        let company = self.company(company_id)?;
        Ok(WithdrawalContext {
            kyc_status: company.kyc_status,
            total_balance: company.usde_balance,
            locked_amount: self.locked_total(company_id),
            daily_total: self.daily_total(company_id, now),
            verified_bank_account: self
                .bank_accounts
                .iter()
                .find(|a| a.company_id == company_id && a.is_verified)
                .map(|a| a.id),
        })
    }

    /// Apply a posting: set the new balance and append the ledger entry.
    fn post(&mut self, posting: Posting, now: DateTime<Utc>) -> Result<LedgerEntry, LedgerError> {
        let company = self.company_mut(posting.company_id)?;
        company.usde_balance = posting.change.after;
        company.updated_at = now;
        let entry = posting.into_entry(now);
        self.ledger.push(entry.clone());
        Ok(entry)
    }

    fn release_locks_of(&mut self, payment_id: Uuid) {
        self.locks.retain(|l| l.source_payment_id != Some(payment_id));
    }

    /// Record the earnings `stake` is owed at `now`. Returns how many.
    fn accrue(&mut self, stake: &Stake, now: DateTime<Utc>) -> u64 {
        let recorded = self.earnings.iter().filter(|e| e.stake_id == stake.id).count();
        let accruals = stake_accruals(stake, u32::try_from(recorded).unwrap_or(u32::MAX), now);
        let added = accruals.len() as u64;
        self.earnings.extend(accruals);
        added
    }

    fn earnings_of(&self, company_id: Uuid, since: Option<DateTime<Utc>>) -> Vec<&Earning> {
        let mut rows: Vec<&Earning> = self
            .earnings
            .iter()
            .filter(|e| e.company_id == company_id && since.map_or(true, |s| e.accrued_for >= s))
            .collect();
        rows.sort_by_key(|e| e.accrued_for);
        rows
    }

    fn enterprise_members(&self, enterprise_id: Uuid) -> Vec<Uuid> {
        self.companies
            .values()
            .filter(|c| c.enterprise_id == Some(enterprise_id))
            .map(|c| c.id)
            .collect()
    }
}

/// Rows are stored oldest first; list endpoints return newest first.
fn newest_first<'a, T: Clone + 'a>(
    rows: impl DoubleEndedIterator<Item = &'a T>,
    page: PageRequest,
) -> Page<T> {
    let rows: Vec<T> = rows.rev().cloned().collect();
    Page {
        total: rows.len() as u64,
        items: page.slice(&rows),
    }
}

fn companies_newest_first<'a>(
    companies: impl Iterator<Item = &'a Company>,
    page: PageRequest,
) -> Page<Company> {
    let mut rows: Vec<Company> = companies.cloned().collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Page {
        total: rows.len() as u64,
        items: page.slice(&rows),
    }
}

#[axum::async_trait]
impl LedgerStore for MemoryStore {
    // ── Companies ───────────────────────────────────────────────────

    async fn insert_company(&self, new: NewCompany) -> Result<Company, StoreError> {
        let mut t = self.tables.lock();
        Ok(t.insert_company(Tables::build_company(new, Utc::now()))?)
    }

    async fn register_enterprise(
        &self,
        new: NewCompany,
        enterprise_name: String,
    ) -> Result<(Company, Enterprise), StoreError> {
        let now = Utc::now();
        let mut t = self.tables.lock();
        let enterprise_id = Uuid::new_v4();
        let mut company = Tables::build_company(new, now);
        company.enterprise_id = Some(enterprise_id);
        let company = t.insert_company(company)?;
        let enterprise = Enterprise {
            id: enterprise_id,
            name: enterprise_name,
            admin_id: company.id,
            settings: TreasurySettings::default(),
            created_at: now,
            updated_at: now,
        };
        t.enterprises.insert(enterprise_id, enterprise.clone());
        Ok((company, enterprise))
    }

    async fn create_subsidiary(
        &self,
        parent_id: Uuid,
        mut new: NewCompany,
    ) -> Result<Company, StoreError> {
        let now = Utc::now();
        let mut t = self.tables.lock();
        let parent = t.company(parent_id)?;
        new.parent_company_id = Some(parent_id);
        new.enterprise_id = parent.enterprise_id;
        let company = t.insert_company(Tables::build_company(new, now))?;
        let parent = t.company_mut(parent_id)?;
        parent.is_parent_company = true;
        parent.updated_at = now;
        Ok(company)
    }

    async fn company(&self, id: Uuid) -> Result<Option<Company>, StoreError> {
        Ok(self.tables.lock().companies.get(&id).cloned())
    }

    async fn company_by_email(&self, email: &str) -> Result<Option<Company>, StoreError> {
        let t = self.tables.lock();
        Ok(t.companies.values().find(|c| c.email == email).cloned())
    }

    async fn update_company(&self, id: Uuid, patch: CompanyPatch) -> Result<Company, StoreError> {
        let mut t = self.tables.lock();
        let company = t.company_mut(id)?;
        if let Some(name) = patch.name {
            company.name = name;
        }
        if let Some(code) = patch.company_code {
            company.company_code = Some(code);
        }
        if let Some(address) = patch.company_address {
            company.company_address = Some(address);
        }
        if let Some(role) = patch.role {
            company.role = role;
        }
        if let Some(status) = patch.status {
            company.status = status;
        }
        company.updated_at = Utc::now();
        Ok(company.clone())
    }

    async fn companies(&self, page: PageRequest) -> Result<Page<Company>, StoreError> {
        let t = self.tables.lock();
        Ok(companies_newest_first(t.companies.values(), page))
    }

    async fn subsidiaries(&self, parent_id: Uuid) -> Result<Vec<Company>, StoreError> {
        let t = self.tables.lock();
        let mut rows: Vec<Company> = t
            .companies
            .values()
            .filter(|c| c.parent_company_id == Some(parent_id))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }

    async fn enterprise_users(&self, enterprise_id: Uuid) -> Result<Vec<Company>, StoreError> {
        let t = self.tables.lock();
        let mut rows: Vec<Company> = t
            .companies
            .values()
            .filter(|c| c.enterprise_id == Some(enterprise_id))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }

    // ── Enterprises ─────────────────────────────────────────────────

    async fn enterprise(&self, id: Uuid) -> Result<Option<Enterprise>, StoreError> {
        Ok(self.tables.lock().enterprises.get(&id).cloned())
    }

    async fn update_treasury_settings(
        &self,
        id: Uuid,
        settings: TreasurySettings,
    ) -> Result<Enterprise, StoreError> {
        let mut t = self.tables.lock();
        let enterprise = t
            .enterprises
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("enterprise", id))?;
        enterprise.settings = settings;
        enterprise.updated_at = Utc::now();
        Ok(enterprise.clone())
    }

    // ── Bank accounts ───────────────────────────────────────────────

    async fn insert_bank_account(
        &self,
        company_id: Uuid,
        bank_name: String,
        account_num: String,
        currency: String,
    ) -> Result<BankAccount, StoreError> {
        let mut t = self.tables.lock();
        t.company(company_id)?;
        let duplicate = t.bank_accounts.iter().any(|a| {
            a.company_id == company_id && a.bank_name == bank_name && a.account_num == account_num
        });
        if duplicate {
            return Err(LedgerError::Duplicate {
                resource: "bank account",
                key: account_num,
            }
            .into());
        }
        let account = BankAccount {
            id: Uuid::new_v4(),
            company_id,
            bank_name,
            account_num,
            currency,
            is_verified: false,
            created_at: Utc::now(),
        };
        t.bank_accounts.push(account.clone());
        Ok(account)
    }

    async fn bank_accounts(&self, company_id: Uuid) -> Result<Vec<BankAccount>, StoreError> {
        let t = self.tables.lock();
        Ok(t.bank_accounts
            .iter()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn bank_account(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<BankAccount>, StoreError> {
        let t = self.tables.lock();
        Ok(t.bank_accounts
            .iter()
            .find(|a| a.id == id && a.company_id == company_id)
            .cloned())
    }

    async fn mark_bank_account_verified(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<BankAccount, StoreError> {
        let mut t = self.tables.lock();
        let account = t
            .bank_accounts
            .iter_mut()
            .find(|a| a.id == id && a.company_id == company_id)
            .ok_or_else(|| LedgerError::not_found("bank account", id))?;
        if account.is_verified {
            return Err(LedgerError::invalid_state(
                "bank account",
                "verified",
                "bank account is already verified",
            )
            .into());
        }
        account.is_verified = true;
        Ok(account.clone())
    }

    async fn delete_bank_account(&self, company_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.tables.lock();
        let index = t
            .bank_accounts
            .iter()
            .position(|a| a.id == id && a.company_id == company_id)
            .ok_or_else(|| LedgerError::not_found("bank account", id))?;
        let in_use = t
            .withdrawals
            .iter()
            .any(|w| w.bank_account_id == id && w.status.is_active());
        if in_use {
            return Err(LedgerError::invalid_state(
                "bank account",
                "in_use",
                "bank account has pending withdrawals",
            )
            .into());
        }
        t.bank_accounts.remove(index);
        Ok(())
    }

    // ── Withdrawals ─────────────────────────────────────────────────

    async fn withdrawal_context(
        &self,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalContext, StoreError> {
        Ok(self.tables.lock().context(company_id, now)?)
    }

    async fn create_withdrawal(
        &self,
        new: NewWithdrawal,
        limits: WithdrawalLimits,
    ) -> Result<Withdrawal, StoreError> {
        let mut t = self.tables.lock();
        let named_account_ok = t.bank_accounts.iter().any(|a| {
            a.id == new.bank_account_id && a.company_id == new.company_id && a.is_verified
        });
        let ctx = WithdrawalContext {
            verified_bank_account: named_account_ok.then_some(new.bank_account_id),
            ..t.context(new.company_id, new.timestamp)?
        };
        limits.authorize(&ctx, new.amount)?;

        let status = WithdrawalStatus::Pending.transition(WithdrawalStatus::Processing)?;
        let change = BalanceChange::debit(
            ctx.total_balance,
            ctx.total_balance - ctx.locked_amount,
            new.amount,
        )?;
        let withdrawal = Withdrawal {
            id: new.id,
            company_id: new.company_id,
            bank_account_id: new.bank_account_id,
            amount: new.amount,
            status,
            burn_tx_hash: Some(new.burn_tx_hash.clone()),
            payout_id: None,
            notes: None,
            timestamp: new.timestamp,
            payout_started_at: None,
            processed_at: None,
        };
        t.post(
            Posting {
                company_id: new.company_id,
                kind: TransactionKind::Withdraw,
                amount: new.amount,
                change,
                description: "USDE burned for bank withdrawal".into(),
                metadata: withdrawal_metadata(new.id, &new.burn_tx_hash),
            },
            new.timestamp,
        )?;
        t.withdrawals.push(withdrawal.clone());
        Ok(withdrawal)
    }

    async fn claim_withdrawal(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, StoreError> {
        let mut t = self.tables.lock();
        let withdrawal = t
            .withdrawals
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| LedgerError::not_found("withdrawal", id))?;
        require_claimable(withdrawal)?;
        withdrawal.payout_started_at = Some(now);
        Ok(withdrawal.clone())
    }

    async fn settle_withdrawal(
        &self,
        id: Uuid,
        outcome: PayoutOutcome,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, StoreError> {
        let mut t = self.tables.lock();
        let index = t
            .withdrawals
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| LedgerError::not_found("withdrawal", id))?;
        let current = t.withdrawals[index].clone();
        require_claimed(&current)?;
        let status = current.status.transition(outcome.final_status())?;

        let (payout_id, notes) = match outcome {
            PayoutOutcome::Paid { payout_id } => (Some(payout_id), None),
            PayoutOutcome::Rejected { reason } => {
                let balance = t.company(current.company_id)?.usde_balance;
                let change = BalanceChange::credit(balance, current.amount)?;
                t.post(
                    Posting {
                        company_id: current.company_id,
                        kind: TransactionKind::Refund,
                        amount: current.amount,
                        change,
                        description: "Refund for failed bank withdrawal".into(),
                        metadata: serde_json::json!({
                            "withdrawalId": current.id,
                            "reason": reason,
                        }),
                    },
                    now,
                )?;
                (None, Some(reason))
            }
        };

        let withdrawal = &mut t.withdrawals[index];
        withdrawal.status = status;
        withdrawal.payout_id = payout_id;
        withdrawal.notes = notes;
        withdrawal.processed_at = Some(now);
        Ok(withdrawal.clone())
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, StoreError> {
        let t = self.tables.lock();
        Ok(t.withdrawals.iter().find(|w| w.id == id).cloned())
    }

    async fn withdrawals(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Withdrawal>, StoreError> {
        let t = self.tables.lock();
        let mut rows: Vec<&Withdrawal> = t
            .withdrawals
            .iter()
            .filter(|w| w.company_id == company_id)
            .collect();
        rows.sort_by_key(|w| w.timestamp);
        Ok(newest_first(rows.into_iter(), page))
    }

    async fn withdrawal_stats(&self, company_id: Uuid) -> Result<WithdrawalStats, StoreError> {
        let t = self.tables.lock();
        let mut stats = WithdrawalStats::default();
        for w in t.withdrawals.iter().filter(|w| w.company_id == company_id) {
            stats.total_withdrawals += 1;
            match w.status {
                WithdrawalStatus::Pending | WithdrawalStatus::Processing => {
                    stats.pending_withdrawals += 1
                }
                WithdrawalStatus::Success => {
                    stats.successful_withdrawals += 1;
                    stats.total_amount += w.amount;
                }
                WithdrawalStatus::Failed => stats.failed_withdrawals += 1,
            }
        }
        Ok(stats)
    }

    async fn active_withdrawals(&self) -> Result<Vec<Withdrawal>, StoreError> {
        let t = self.tables.lock();
        Ok(t.withdrawals
            .iter()
            .filter(|w| w.status.is_active())
            .cloned()
            .collect())
    }

    // ── Deposits ────────────────────────────────────────────────────

    async fn insert_deposit(&self, deposit: Deposit) -> Result<Deposit, StoreError> {
        let mut t = self.tables.lock();
        t.company(deposit.company_id)?;
        t.deposits.push(deposit.clone());
        Ok(deposit)
    }

    async fn recent_deposit_count(
        &self,
        company_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let t = self.tables.lock();
        Ok(t.deposits
            .iter()
            .filter(|d| d.company_id == company_id && d.created_at >= since)
            .count() as u64)
    }

    async fn deposits(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Deposit>, StoreError> {
        let t = self.tables.lock();
        Ok(newest_first(
            t.deposits.iter().filter(|d| d.company_id == company_id),
            page,
        ))
    }

    async fn complete_deposit(
        &self,
        company_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CompletedDeposit, StoreError> {
        let mut t = self.tables.lock();
        let index = t
            .deposits
            .iter()
            .position(|d| d.id == id && d.company_id == company_id)
            .ok_or_else(|| LedgerError::not_found("deposit", id))?;
        let deposit = t.deposits[index].clone();
        if deposit.status.is_lapsed(deposit.expires_at, now) {
            t.deposits[index].status = DepositStatus::Expired;
        }
        deposit.status.require_completable(deposit.expires_at, now)?;

        let balance = t.company(company_id)?.usde_balance;
        let change = BalanceChange::credit(balance, deposit.usde_amount)?;
        t.post(
            Posting {
                company_id,
                kind: TransactionKind::Mint,
                amount: deposit.usde_amount,
                change,
                description: "USDE minted from fiat deposit".into(),
                metadata: serde_json::json!({
                    "depositId": deposit.id,
                    "fiatAmount": deposit.amount,
                    "fee": deposit.fee,
                }),
            },
            now,
        )?;

        let stored = &mut t.deposits[index];
        stored.status = DepositStatus::Completed;
        stored.completed_at = Some(now);
        Ok(CompletedDeposit {
            deposit: stored.clone(),
            usde_balance: change.after,
        })
    }

    async fn deposit_stats(&self, company_id: Uuid) -> Result<DepositStats, StoreError> {
        let t = self.tables.lock();
        let mut stats = DepositStats::default();
        for d in t.deposits.iter().filter(|d| d.company_id == company_id) {
            stats.total_deposits += 1;
            match d.status {
                DepositStatus::Completed => {
                    stats.completed_deposits += 1;
                    stats.total_amount += d.amount;
                    stats.total_fees += d.fee;
                    stats.total_usde_minted += d.usde_amount;
                }
                DepositStatus::Pending => stats.pending_deposits += 1,
                DepositStatus::Rejected | DepositStatus::Expired => {}
            }
        }
        Ok(stats)
    }

    async fn expire_deposits(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.tables.lock();
        let mut expired = 0;
        for deposit in t
            .deposits
            .iter_mut()
            .filter(|d| d.status.is_lapsed(d.expires_at, now))
        {
            deposit.status = DepositStatus::Expired;
            expired += 1;
        }
        Ok(expired)
    }

    // ── Payments and locks ──────────────────────────────────────────

    async fn create_payment(
        &self,
        new: NewPayment,
        now: DateTime<Utc>,
    ) -> Result<Payment, StoreError> {
        let mut t = self.tables.lock();
        let recipient = t
            .companies
            .values()
            .find(|c| c.email == new.to_email)
            .ok_or_else(|| LedgerError::not_found("company", &new.to_email))?
            .clone();
        if recipient.id == new.from_id {
            return Err(LedgerError::Validation("cannot send a payment to yourself".into()).into());
        }
        let sender = t.company(new.from_id)?.clone();
        sender.kyc_status.require_approved()?;

        let debit = BalanceChange::debit(sender.usde_balance, t.available(&sender), new.amount)?;
        let credit = BalanceChange::credit(recipient.usde_balance, new.amount)?;

        let payment = Payment {
            id: Uuid::new_v4(),
            from_id: sender.id,
            to_id: recipient.id,
            amount: new.amount,
            lock_days: new.lock.days(),
            release_at: new.lock.release_at(now),
            status: PaymentStatus::Pending,
            released_at: None,
            timestamp: now,
        };
        let metadata = serde_json::json!({
            "paymentId": payment.id,
            "lockDays": payment.lock_days,
            "releaseAt": payment.release_at,
        });
        t.post(
            Posting {
                company_id: sender.id,
                kind: TransactionKind::PaymentSent,
                amount: new.amount,
                change: debit,
                description: format!("Payment to {}", recipient.name),
                metadata: metadata.clone(),
            },
            now,
        )?;
        t.post(
            Posting {
                company_id: recipient.id,
                kind: TransactionKind::PaymentReceived,
                amount: new.amount,
                change: credit,
                description: format!("Payment from {}", sender.name),
                metadata,
            },
            now,
        )?;
        t.locks.push(LockedBalance {
            id: Uuid::new_v4(),
            company_id: recipient.id,
            amount: new.amount,
            release_at: payment.release_at,
            source_payment_id: Some(payment.id),
            created_at: now,
        });
        t.payments.push(payment.clone());
        Ok(payment)
    }

    async fn payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let t = self.tables.lock();
        Ok(t.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn payments(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Payment>, StoreError> {
        let t = self.tables.lock();
        Ok(newest_first(
            t.payments
                .iter()
                .filter(|p| p.from_id == company_id || p.to_id == company_id),
            page,
        ))
    }

    async fn payment_summary(&self, company_id: Uuid) -> Result<PaymentSummary, StoreError> {
        let t = self.tables.lock();
        let mut summary = PaymentSummary::default();
        for p in &t.payments {
            if p.from_id == company_id {
                summary.sent_count += 1;
                summary.sent_total += p.amount;
            }
            if p.to_id == company_id {
                summary.received_count += 1;
                summary.received_total += p.amount;
            }
        }
        Ok(summary)
    }

    async fn release_payment(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Payment, StoreError> {
        let mut t = self.tables.lock();
        let payment = t
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| LedgerError::not_found("payment", id))?;
        payment.status.require_releasable(payment.release_at, now)?;
        payment.status = PaymentStatus::Released;
        payment.released_at = Some(now);
        let payment = payment.clone();
        t.release_locks_of(id);
        Ok(payment)
    }

    async fn locked_balances(&self, company_id: Uuid) -> Result<Vec<LockedBalance>, StoreError> {
        let t = self.tables.lock();
        Ok(t.locks
            .iter()
            .filter(|l| l.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn release_expired_locks(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.tables.lock();
        let (expired, kept): (Vec<LockedBalance>, Vec<LockedBalance>) =
            std::mem::take(&mut t.locks)
                .into_iter()
                .partition(|l| l.release_at <= now);
        t.locks = kept;
        for lock in &expired {
            let Some(payment_id) = lock.source_payment_id else {
                continue;
            };
            if let Some(p) = t
                .payments
                .iter_mut()
                .find(|p| p.id == payment_id && p.status == PaymentStatus::Pending)
            {
                p.status = PaymentStatus::Released;
                p.released_at = Some(now);
            }
        }
        Ok(expired.len() as u64)
    }

    // ── Stakes ──────────────────────────────────────────────────────

    async fn create_stake(
        &self,
        company_id: Uuid,
        terms: StakeTerms,
        now: DateTime<Utc>,
    ) -> Result<Stake, StoreError> {
        let mut t = self.tables.lock();
        let company = t.company(company_id)?;
        let change = BalanceChange::debit(company.usde_balance, t.available(company), terms.amount)?;
        let stake = Stake {
            id: Uuid::new_v4(),
            company_id,
            amount: terms.amount,
            apy: terms.apy,
            start_date: now,
            end_date: terms.end_date(now),
            status: StakeStatus::Active,
            earnings_paid: Decimal::ZERO,
            completed_at: None,
            created_at: now,
        };
        t.post(
            Posting {
                company_id,
                kind: TransactionKind::Stake,
                amount: terms.amount,
                change,
                description: format!("Staked USDE for {} days", terms.lock_days),
                metadata: serde_json::json!({ "stakeId": stake.id, "apy": terms.apy }),
            },
            now,
        )?;
        t.stakes.push(stake.clone());
        Ok(stake)
    }

    async fn stakes(
        &self,
        company_id: Uuid,
        status: Option<StakeStatus>,
        page: PageRequest,
    ) -> Result<Page<Stake>, StoreError> {
        let t = self.tables.lock();
        Ok(newest_first(
            t.stakes.iter().filter(|s| {
                s.company_id == company_id && status.map_or(true, |st| s.status == st)
            }),
            page,
        ))
    }

    async fn stake(&self, company_id: Uuid, id: Uuid) -> Result<Option<Stake>, StoreError> {
        let t = self.tables.lock();
        Ok(t.stakes
            .iter()
            .find(|s| s.id == id && s.company_id == company_id)
            .cloned())
    }

    async fn active_stakes(&self, company_id: Uuid) -> Result<Vec<Stake>, StoreError> {
        let t = self.tables.lock();
        Ok(t.stakes
            .iter()
            .filter(|s| s.company_id == company_id && s.status == StakeStatus::Active)
            .cloned()
            .collect())
    }

    async fn accrue_stake_earnings(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.tables.lock();
        let active: Vec<Stake> = t
            .stakes
            .iter()
            .filter(|s| s.status == StakeStatus::Active)
            .cloned()
            .collect();
        Ok(active.iter().map(|stake| t.accrue(stake, now)).sum())
    }

    async fn complete_matured_stakes(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.tables.lock();
        let matured: Vec<Stake> = t
            .stakes
            .iter()
            .filter(|s| s.status == StakeStatus::Active && is_matured(s.end_date, now))
            .cloned()
            .collect();
        for stake in &matured {
            t.accrue(stake, now);
            let interest: Decimal = t
                .earnings
                .iter()
                .filter(|e| e.stake_id == stake.id)
                .map(|e| e.amount)
                .sum();
            let balance = t.company(stake.company_id)?.usde_balance;
            for posting in maturity_postings(stake, balance, interest)? {
                t.post(posting, now)?;
            }
            if let Some(stored) = t.stakes.iter_mut().find(|s| s.id == stake.id) {
                stored.status = StakeStatus::Completed;
                stored.earnings_paid = interest;
                stored.completed_at = Some(now);
            }
        }
        Ok(matured.len() as u64)
    }

    async fn earnings(
        &self,
        company_id: Uuid,
        since: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Earning>, StoreError> {
        let t = self.tables.lock();
        Ok(newest_first(t.earnings_of(company_id, since).into_iter(), page))
    }

    async fn earnings_summary(
        &self,
        company_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<EarningsSummary, StoreError> {
        let t = self.tables.lock();
        let rows = t.earnings_of(company_id, since);
        Ok(EarningsSummary {
            total_earnings: rows.iter().map(|e| e.amount).sum(),
            count: rows.len() as u64,
        })
    }

    // ── Enterprise reporting ────────────────────────────────────────

    async fn enterprise_activity(
        &self,
        enterprise_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EnterpriseActivity, StoreError> {
        let t = self.tables.lock();
        let members = t.enterprise_members(enterprise_id);
        let within = |at: DateTime<Utc>| at >= start && at < end;
        let mut activity = EnterpriseActivity {
            payments: t
                .payments
                .iter()
                .filter(|p| members.contains(&p.from_id) && within(p.timestamp))
                .cloned()
                .collect(),
            withdrawals: t
                .withdrawals
                .iter()
                .filter(|w| members.contains(&w.company_id) && within(w.timestamp))
                .cloned()
                .collect(),
            deposits: t
                .deposits
                .iter()
                .filter(|d| members.contains(&d.company_id) && within(d.created_at))
                .cloned()
                .collect(),
        };
        activity.payments.sort_by_key(|p| p.timestamp);
        activity.withdrawals.sort_by_key(|w| w.timestamp);
        activity.deposits.sort_by_key(|d| d.created_at);
        Ok(activity)
    }

    // ── Ledger ──────────────────────────────────────────────────────

    async fn transactions(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        let t = self.tables.lock();
        Ok(newest_first(
            t.ledger.iter().filter(|e| e.company_id == company_id),
            page,
        ))
    }

    // ── KYC ─────────────────────────────────────────────────────────

    async fn submit_kyc(
        &self,
        submission: KycSubmission,
        now: DateTime<Utc>,
    ) -> Result<Company, StoreError> {
        let mut t = self.tables.lock();
        let company_id = submission.profile.company_id;
        let status = t.company(company_id)?.kyc_status;
        if !status.accepts_submission() {
            return Err(
                LedgerError::invalid_state("kyc", status, "KYC is already approved").into(),
            );
        }

        t.kyc_profiles.insert(company_id, submission.profile);
        t.ubos.retain(|u| u.company_id != company_id);
        t.ubos.extend(submission.ubos.into_iter().map(|u| Ubo {
            id: Uuid::new_v4(),
            company_id,
            name: u.name,
            id_number: u.id_number,
            nationality: u.nationality,
            address: u.address,
            ownership_percentage: u.ownership_percentage,
        }));
        t.kyc_reviews.push(KycReview {
            id: Uuid::new_v4(),
            company_id,
            reviewer_id: None,
            decision: "submitted".into(),
            notes: None,
            created_at: now,
        });

        let company = t.company_mut(company_id)?;
        company.kyc_status = KycStatus::Pending;
        company.updated_at = now;
        Ok(company.clone())
    }

    async fn kyc_application(&self, company_id: Uuid) -> Result<KycApplication, StoreError> {
        let t = self.tables.lock();
        let company = t.company(company_id)?;
        Ok(KycApplication {
            kyc_status: company.kyc_status,
            profile: t.kyc_profiles.get(&company_id).cloned(),
            ubos: t
                .ubos
                .iter()
                .filter(|u| u.company_id == company_id)
                .cloned()
                .collect(),
            reviews: t
                .kyc_reviews
                .iter()
                .rev()
                .filter(|r| r.company_id == company_id)
                .cloned()
                .collect(),
        })
    }

    async fn review_kyc(
        &self,
        company_id: Uuid,
        reviewer_id: Uuid,
        decision: KycDecision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Company, StoreError> {
        let mut t = self.tables.lock();
        let status = t.company(company_id)?.kyc_status;
        if status != KycStatus::Pending {
            return Err(LedgerError::invalid_state(
                "kyc",
                status,
                "only pending applications can be reviewed",
            )
            .into());
        }
        t.kyc_reviews.push(KycReview {
            id: Uuid::new_v4(),
            company_id,
            reviewer_id: Some(reviewer_id),
            decision: decision.to_string(),
            notes,
            created_at: now,
        });
        let company = t.company_mut(company_id)?;
        company.kyc_status = decision.resulting_status();
        company.updated_at = now;
        Ok(company.clone())
    }

    async fn kyc_applications(
        &self,
        status: Option<KycStatus>,
        page: PageRequest,
    ) -> Result<Page<Company>, StoreError> {
        let t = self.tables.lock();
        Ok(companies_newest_first(
            t.companies
                .values()
                .filter(|c| match status {
                    Some(s) => c.kyc_status == s,
                    None => c.kyc_status != KycStatus::NotSubmitted,
                }),
            page,
        ))
    }

    // ── Audit ───────────────────────────────────────────────────────

    async fn append_audit(
        &self,
        entry: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<AuditLog, StoreError> {
        let mut t = self.tables.lock();
        let previous_hash = t
            .audit
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.entry_hash.clone());
        let entry_hash = AuditLog::chain_hash(
            &previous_hash,
            &entry.action,
            entry.actor_id,
            entry.target_id,
            &entry.details,
        );
        let log = AuditLog {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action,
            target_id: entry.target_id,
            details: entry.details,
            previous_hash,
            entry_hash,
            created_at: now,
        };
        t.audit.push(log.clone());
        Ok(log)
    }

    async fn audit_logs(&self, page: PageRequest) -> Result<Page<AuditLog>, StoreError> {
        let t = self.tables.lock();
        Ok(newest_first(t.audit.iter(), page))
    }

    async fn audit_chain(&self) -> Result<Vec<AuditLog>, StoreError> {
        Ok(self.tables.lock().audit.clone())
    }

    // ── Administration ──────────────────────────────────────────────

    async fn platform_stats(&self) -> Result<PlatformStats, StoreError> {
        let t = self.tables.lock();
        Ok(PlatformStats {
            total_companies: t.companies.len() as u64,
            active_companies: t
                .companies
                .values()
                .filter(|c| c.status == CompanyStatus::Active)
                .count() as u64,
            total_usde: t.companies.values().map(|c| c.usde_balance).sum(),
            total_withdrawals: t.withdrawals.len() as u64,
            active_withdrawals: t.withdrawals.iter().filter(|w| w.status.is_active()).count()
                as u64,
            pending_kyc: t
                .companies
                .values()
                .filter(|c| c.kyc_status == KycStatus::Pending)
                .count() as u64,
        })
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Credit `amount` through a completed deposit.
    pub(crate) async fn fund(&self, company_id: Uuid, amount: Decimal) {
        let now = Utc::now();
        let deposit = Deposit {
            id: Uuid::new_v4(),
            company_id,
            amount,
            fee: Decimal::ZERO,
            fee_rate: Decimal::ZERO,
            usde_amount: amount,
            payment_method: "bank_transfer".into(),
            status: DepositStatus::Pending,
            risk_score: 0,
            risk_decision: usde_core::RiskDecision::Approved,
            expires_at: now + chrono::Duration::hours(2),
            completed_at: None,
            created_at: now,
        };
        let id = deposit.id;
        self.insert_deposit(deposit).await.unwrap();
        self.complete_deposit(company_id, id, now).await.unwrap();
    }

    /// Backdate a withdrawal's timestamp.
    pub(crate) fn backdate_withdrawal(&self, id: Uuid, by: chrono::Duration) {
        let mut t = self.tables.lock();
        if let Some(w) = t.withdrawals.iter_mut().find(|w| w.id == id) {
            w.timestamp -= by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use usde_core::{CompanyKind, Role};

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn new_company(email: &str) -> NewCompany {
        NewCompany {
            name: "Acme Trading".into(),
            email: email.into(),
            password_hash: "hash".into(),
            kind: CompanyKind::Company,
            role: Role::EnterpriseAdmin,
            kyc_status: KycStatus::Pending,
            parent_company_id: None,
            enterprise_id: None,
            company_code: None,
            company_address: None,
        }
    }

    /// Approved company with `balance` USDE and one verified bank account.
    async fn ready_company(store: &MemoryStore, balance: i64) -> (Uuid, Uuid) {
        let company = store
            .insert_company(new_company(&format!("{}@acme.test", Uuid::new_v4())))
            .await
            .unwrap();
        store.tables.lock().company_mut(company.id).unwrap().kyc_status = KycStatus::Approved;
        store.fund(company.id, d(balance)).await;
        let account = store
            .insert_bank_account(company.id, "First Bank".into(), "000123".into(), "USD".into())
            .await
            .unwrap();
        store
            .mark_bank_account_verified(company.id, account.id)
            .await
            .unwrap();
        (company.id, account.id)
    }

    fn withdrawal(company_id: Uuid, account_id: Uuid, amount: i64) -> NewWithdrawal {
        NewWithdrawal {
            id: Uuid::new_v4(),
            company_id,
            bank_account_id: account_id,
            amount: d(amount),
            burn_tx_hash: "0xabc".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.insert_company(new_company("a@acme.test")).await.unwrap();
        let err = store
            .insert_company(new_company("a@acme.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn withdrawal_debits_once_and_appends_one_entry() {
        let store = MemoryStore::new();
        let (company_id, account_id) = ready_company(&store, 5000).await;

        let w = store
            .create_withdrawal(withdrawal(company_id, account_id, 3000), WithdrawalLimits::default())
            .await
            .unwrap();
        assert_eq!(w.status, WithdrawalStatus::Processing);
        assert_eq!(w.burn_tx_hash.as_deref(), Some("0xabc"));

        let company = store.company(company_id).await.unwrap().unwrap();
        assert_eq!(company.usde_balance, d(2000));

        let entries = store
            .transactions(company_id, PageRequest::default())
            .await
            .unwrap();
        let withdraws: Vec<_> = entries
            .items
            .iter()
            .filter(|e| e.kind == TransactionKind::Withdraw)
            .collect();
        assert_eq!(withdraws.len(), 1);
        assert_eq!(withdraws[0].balance_before, d(5000));
        assert_eq!(withdraws[0].balance_after, d(2000));
        assert_eq!(withdraws[0].metadata["withdrawalId"], w.id.to_string());
    }

    #[tokio::test]
    async fn rejected_withdrawal_leaves_no_state() {
        let store = MemoryStore::new();
        let (company_id, account_id) = ready_company(&store, 8000).await;

        let err = store
            .create_withdrawal(withdrawal(company_id, account_id, 6000), WithdrawalLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::SingleLimitExceeded { .. })
        ));
        assert_eq!(
            store.company(company_id).await.unwrap().unwrap().usde_balance,
            d(8000)
        );
        let page = store
            .withdrawals(company_id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn unverified_named_account_is_missing() {
        let store = MemoryStore::new();
        let (company_id, _) = ready_company(&store, 5000).await;
        let other = store
            .insert_bank_account(company_id, "Other Bank".into(), "999".into(), "USD".into())
            .await
            .unwrap();
        let err = store
            .create_withdrawal(withdrawal(company_id, other.id, 100), WithdrawalLimits::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::BankAccountMissing)));
    }

    #[tokio::test]
    async fn failed_payout_refunds_and_frees_daily_limit() {
        let store = MemoryStore::new();
        let (company_id, account_id) = ready_company(&store, 20_000).await;
        let limits = WithdrawalLimits::default();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let w = store
                .create_withdrawal(withdrawal(company_id, account_id, 5000), limits)
                .await
                .unwrap();
            ids.push(w.id);
        }
        // Daily limit reached.
        let err = store
            .create_withdrawal(withdrawal(company_id, account_id, 1), limits)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::DailyLimitExceeded { .. })
        ));

        store.claim_withdrawal(ids[0], Utc::now()).await.unwrap();
        let settled = store
            .settle_withdrawal(
                ids[0],
                PayoutOutcome::Rejected {
                    reason: "bank refused".into(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(settled.status, WithdrawalStatus::Failed);
        assert_eq!(settled.notes.as_deref(), Some("bank refused"));
        assert!(settled.processed_at.is_some());
        assert_eq!(
            store.company(company_id).await.unwrap().unwrap().usde_balance,
            d(15_000)
        );

        // The failed withdrawal no longer counts.
        store
            .create_withdrawal(withdrawal(company_id, account_id, 5000), limits)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn settle_twice_is_invalid_state() {
        let store = MemoryStore::new();
        let (company_id, account_id) = ready_company(&store, 5000).await;
        let w = store
            .create_withdrawal(withdrawal(company_id, account_id, 1000), WithdrawalLimits::default())
            .await
            .unwrap();
        let paid = PayoutOutcome::Paid {
            payout_id: "po_1".into(),
        };
        store.claim_withdrawal(w.id, Utc::now()).await.unwrap();
        store
            .settle_withdrawal(w.id, paid.clone(), Utc::now())
            .await
            .unwrap();
        let err = store
            .settle_withdrawal(w.id, paid, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn payout_is_claimed_once() {
        let store = MemoryStore::new();
        let (company_id, account_id) = ready_company(&store, 5000).await;
        let w = store
            .create_withdrawal(withdrawal(company_id, account_id, 1000), WithdrawalLimits::default())
            .await
            .unwrap();

        // Unclaimed withdrawals cannot be settled.
        let err = store
            .settle_withdrawal(
                w.id,
                PayoutOutcome::Paid {
                    payout_id: "po_1".into(),
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));

        let claimed = store.claim_withdrawal(w.id, Utc::now()).await.unwrap();
        assert!(claimed.payout_started_at.is_some());
        let err = store.claim_withdrawal(w.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));
        let err = store
            .claim_withdrawal(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn yesterdays_withdrawals_do_not_count() {
        let store = MemoryStore::new();
        let (company_id, account_id) = ready_company(&store, 20_000).await;
        let limits = WithdrawalLimits::default();
        for _ in 0..2 {
            let w = store
                .create_withdrawal(withdrawal(company_id, account_id, 5000), limits)
                .await
                .unwrap();
            store.backdate_withdrawal(w.id, Duration::days(1));
        }
        let ctx = store.withdrawal_context(company_id, Utc::now()).await.unwrap();
        assert_eq!(ctx.daily_total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn concurrent_withdrawals_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let (company_id, account_id) = ready_company(&store, 5000).await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .create_withdrawal(
                            withdrawal(company_id, account_id, 3000),
                            WithdrawalLimits::default(),
                        )
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(
            store.company(company_id).await.unwrap().unwrap().usde_balance,
            d(2000)
        );
    }

    #[tokio::test]
    async fn payment_locks_recipient_funds_until_released() {
        let store = MemoryStore::new();
        let (sender, _) = ready_company(&store, 5000).await;
        let recipient = store
            .insert_company(new_company("vendor@acme.test"))
            .await
            .unwrap();

        let payment = store
            .create_payment(
                NewPayment {
                    from_id: sender,
                    to_email: "vendor@acme.test".into(),
                    amount: d(1200),
                    lock: usde_core::LockPeriod::Days30,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let ctx = store
            .withdrawal_context(recipient.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(ctx.total_balance, d(1200));
        assert_eq!(ctx.locked_amount, d(1200));

        let err = store
            .release_payment(payment.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));

        let released = store
            .release_expired_locks(Utc::now() + Duration::days(31))
            .await
            .unwrap();
        assert_eq!(released, 1);
        assert!(store.locked_balances(recipient.id).await.unwrap().is_empty());
        let payment = store.payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Released);
    }

    #[tokio::test]
    async fn self_payment_rejected() {
        let store = MemoryStore::new();
        let (sender, _) = ready_company(&store, 5000).await;
        let email = store.company(sender).await.unwrap().unwrap().email;
        let err = store
            .create_payment(
                NewPayment {
                    from_id: sender,
                    to_email: email,
                    amount: d(10),
                    lock: usde_core::LockPeriod::Days30,
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn expired_deposit_cannot_complete() {
        let store = MemoryStore::new();
        let company = store.insert_company(new_company("d@acme.test")).await.unwrap();
        let now = Utc::now();
        let deposit = Deposit {
            id: Uuid::new_v4(),
            company_id: company.id,
            amount: d(100),
            fee: Decimal::new(25, 2),
            fee_rate: Decimal::new(25, 4),
            usde_amount: Decimal::new(9975, 2),
            payment_method: "card".into(),
            status: DepositStatus::Pending,
            risk_score: 50,
            risk_decision: usde_core::RiskDecision::ManualReview,
            expires_at: now - Duration::minutes(1),
            completed_at: None,
            created_at: now - Duration::hours(3),
        };
        let id = deposit.id;
        store.insert_deposit(deposit).await.unwrap();
        let err = store.complete_deposit(company.id, id, now).await.unwrap_err();
        assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));
        assert_eq!(
            store.company(company.id).await.unwrap().unwrap().usde_balance,
            Decimal::ZERO
        );
        let page = store.deposits(company.id, PageRequest::default()).await.unwrap();
        assert_eq!(page.items[0].status, DepositStatus::Expired);
        assert_eq!(store.deposit_stats(company.id).await.unwrap().pending_deposits, 0);
    }

    #[tokio::test]
    async fn sweep_expires_lapsed_deposits_only() {
        let store = MemoryStore::new();
        let company = store.insert_company(new_company("e@acme.test")).await.unwrap();
        let now = Utc::now();
        for expires_in in [-5, 30] {
            store
                .insert_deposit(Deposit {
                    id: Uuid::new_v4(),
                    company_id: company.id,
                    amount: d(100),
                    fee: Decimal::ZERO,
                    fee_rate: Decimal::ZERO,
                    usde_amount: d(100),
                    payment_method: "card".into(),
                    status: DepositStatus::Pending,
                    risk_score: 10,
                    risk_decision: usde_core::RiskDecision::Approved,
                    expires_at: now + Duration::minutes(expires_in),
                    completed_at: None,
                    created_at: now - Duration::hours(1),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.expire_deposits(now).await.unwrap(), 1);
        assert_eq!(store.expire_deposits(now).await.unwrap(), 0);
        assert_eq!(store.deposit_stats(company.id).await.unwrap().pending_deposits, 1);
    }

    #[tokio::test]
    async fn matured_stake_returns_principal_and_interest() {
        let store = MemoryStore::new();
        let (company_id, _) = ready_company(&store, 36_500).await;
        let now = Utc::now();
        let terms = StakeTerms::new(d(36_500), 30, Some(Decimal::new(4, 2))).unwrap();
        let stake = store
            .create_stake(company_id, terms, now - Duration::days(400))
            .await
            .unwrap();
        assert_eq!(
            store.company(company_id).await.unwrap().unwrap().usde_balance,
            Decimal::ZERO
        );

        assert_eq!(store.complete_matured_stakes(now).await.unwrap(), 1);

        // 30 days at 4.00 a day.
        let company = store.company(company_id).await.unwrap().unwrap();
        assert_eq!(company.usde_balance, d(36_620));
        let stake = store.stake(company_id, stake.id).await.unwrap().unwrap();
        assert_eq!(stake.status, StakeStatus::Completed);
        assert_eq!(stake.earnings_paid, d(120));
        assert_eq!(stake.completed_at, Some(now));

        let summary = store.earnings_summary(company_id, None).await.unwrap();
        assert_eq!(summary.count, 30);
        assert_eq!(summary.total_earnings, d(120));

        let entries = store
            .transactions(company_id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(entries.items[0].kind, TransactionKind::Interest);
        assert_eq!(entries.items[0].balance_after, d(36_620));
        assert_eq!(entries.items[1].kind, TransactionKind::Unstake);
        assert_eq!(entries.items[1].balance_after, d(36_500));

        // Nothing is paid twice.
        assert_eq!(store.complete_matured_stakes(now).await.unwrap(), 0);
        assert_eq!(store.accrue_stake_earnings(now).await.unwrap(), 0);
        assert_eq!(
            store.company(company_id).await.unwrap().unwrap().usde_balance,
            d(36_620)
        );
    }

    #[tokio::test]
    async fn accrual_catches_up_without_duplicates() {
        let store = MemoryStore::new();
        let (company_id, _) = ready_company(&store, 36_500).await;
        let now = Utc::now();
        let terms = StakeTerms::new(d(36_500), 90, Some(Decimal::new(4, 2))).unwrap();
        store
            .create_stake(company_id, terms, now - Duration::days(3) - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.accrue_stake_earnings(now).await.unwrap(), 3);
        assert_eq!(store.accrue_stake_earnings(now).await.unwrap(), 0);
        assert_eq!(
            store
                .accrue_stake_earnings(now + Duration::days(1))
                .await
                .unwrap(),
            1
        );
        // Accrual records earnings without paying them out.
        assert_eq!(
            store.company(company_id).await.unwrap().unwrap().usde_balance,
            Decimal::ZERO
        );
        assert_eq!(store.complete_matured_stakes(now).await.unwrap(), 0);

        let recent = store
            .earnings(company_id, Some(now - Duration::days(1)), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(recent.total, 2);
        assert_eq!(recent.items[0].day, 4);
        assert_eq!(recent.items[1].day, 3);
    }

    #[tokio::test]
    async fn enterprise_activity_covers_member_companies_in_period() {
        let store = MemoryStore::new();
        let (member, account_id) = ready_company(&store, 10_000).await;
        let (outsider, outsider_account) = ready_company(&store, 10_000).await;
        let enterprise_id = Uuid::new_v4();
        store.tables.lock().company_mut(member).unwrap().enterprise_id = Some(enterprise_id);

        let now = Utc::now();
        store
            .create_withdrawal(withdrawal(member, account_id, 1000), WithdrawalLimits::default())
            .await
            .unwrap();
        let old = store
            .create_withdrawal(withdrawal(member, account_id, 500), WithdrawalLimits::default())
            .await
            .unwrap();
        store.backdate_withdrawal(old.id, Duration::days(40));
        store
            .create_withdrawal(
                withdrawal(outsider, outsider_account, 700),
                WithdrawalLimits::default(),
            )
            .await
            .unwrap();

        let activity = store
            .enterprise_activity(enterprise_id, now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(activity.withdrawals.len(), 1);
        assert_eq!(activity.withdrawals[0].amount, d(1000));
        // The funding deposit made by `ready_company`.
        assert_eq!(activity.deposits.len(), 1);
        assert!(activity.payments.is_empty());
    }

    #[tokio::test]
    async fn audit_chain_is_linked() {
        let store = MemoryStore::new();
        for action in ["kyc.review", "company.status"] {
            store
                .append_audit(
                    NewAuditEntry {
                        actor_id: Uuid::new_v4(),
                        action: action.into(),
                        target_id: Uuid::new_v4(),
                        details: serde_json::json!({}),
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        let chain = store.audit_chain().await.unwrap();
        assert_eq!(chain[0].previous_hash, GENESIS_HASH);
        assert_eq!(chain[1].previous_hash, chain[0].entry_hash);
        assert_eq!(usde_core::audit::verify_chain(&chain), None);
    }
}
