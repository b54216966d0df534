//! # PostgreSQL Store
//!
//! Each fund-moving operation runs in one transaction. The affected company
//! rows are read with `SELECT ... FOR UPDATE` before any check is evaluated,
//! so two requests for the same company serialize and every check sees the
//! other's committed writes. Payments lock both companies in id order.
//!
//! Sweeps (deposit expiry, earnings accrual, stake maturity) touch one
//! company per transaction so they never wait on a second company lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use usde_core::limits::utc_day_bounds;
use usde_core::stake::is_matured;
use usde_core::{
    BalanceChange, DepositStatus, KycDecision, KycStatus, LedgerError, PageRequest,
    PaymentStatus, PayoutOutcome, StakeStatus, StakeTerms, TransactionKind, TreasurySettings,
    WithdrawalContext, WithdrawalLimits, WithdrawalStatus,
};
use uuid::Uuid;

use super::{
    maturity_postings, require_claimable, require_claimed, stake_accruals, withdrawal_metadata,
    CompanyPatch, CompletedDeposit, DepositStats, EarningsSummary, EnterpriseActivity,
    KycApplication, KycSubmission, LedgerStore, NewAuditEntry, NewCompany, NewPayment,
    NewWithdrawal, Page, PaymentSummary, PlatformStats, Posting, StoreError, WithdrawalStats,
};
use crate::db;
use crate::state::{
    AuditLog, BankAccount, Company, Deposit, Earning, Enterprise, KycReview, LedgerEntry,
    LockedBalance, Payment, Stake, Ubo, Withdrawal,
};

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for shutdown.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn company_record(new: NewCompany, now: DateTime<Utc>) -> Company {
    Company {
        id: Uuid::new_v4(),
        name: new.name,
        email: new.email,
        password_hash: new.password_hash,
        kind: new.kind,
        role: new.role,
        status: usde_core::CompanyStatus::Active,
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

async fn lock_company(conn: &mut PgConnection, id: Uuid) -> Result<Company, StoreError> {
    db::companies::by_id_for_update(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("company", id).into())
}

async fn post(conn: &mut PgConnection, posting: Posting, now: DateTime<Utc>) -> Result<(), StoreError> {
    db::companies::set_usde_balance(conn, posting.company_id, posting.change.after, now).await?;
    db::ledger::append(conn, &posting.into_entry(now)).await
}

/// Record the days `stake` is owed at `now` that are not yet recorded.
async fn accrue(conn: &mut PgConnection, stake: &Stake, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let (recorded, _) = db::earnings::for_stake(conn, stake.id).await?;
    let accruals = stake_accruals(stake, recorded, now);
    if accruals.is_empty() {
        return Ok(0);
    }
    db::earnings::insert_all(conn, &accruals).await
}

#[axum::async_trait]
impl LedgerStore for PgStore {
    // ── Companies ───────────────────────────────────────────────────

    async fn insert_company(&self, new: NewCompany) -> Result<Company, StoreError> {
        let company = company_record(new, Utc::now());
        let mut conn = self.pool.acquire().await?;
        db::companies::insert(&mut conn, &company).await?;
        Ok(company)
    }

    async fn register_enterprise(
        &self,
        new: NewCompany,
        enterprise_name: String,
    ) -> Result<(Company, Enterprise), StoreError> {
        let now = Utc::now();
        let mut company = company_record(new, now);
        let enterprise = Enterprise {
            id: Uuid::new_v4(),
            name: enterprise_name,
            admin_id: company.id,
            settings: TreasurySettings::default(),
            created_at: now,
            updated_at: now,
        };
        company.enterprise_id = Some(enterprise.id);

        let mut tx = self.pool.begin().await?;
        db::enterprises::insert(&mut tx, &enterprise).await?;
        db::companies::insert(&mut tx, &company).await?;
        tx.commit().await?;
        Ok((company, enterprise))
    }

    async fn create_subsidiary(
        &self,
        parent_id: Uuid,
        mut new: NewCompany,
    ) -> Result<Company, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let parent = lock_company(&mut tx, parent_id).await?;
        new.parent_company_id = Some(parent_id);
        new.enterprise_id = parent.enterprise_id;
        let company = company_record(new, now);
        db::companies::insert(&mut tx, &company).await?;
        db::companies::mark_parent(&mut tx, parent_id, now).await?;
        tx.commit().await?;
        Ok(company)
    }

    async fn company(&self, id: Uuid) -> Result<Option<Company>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::companies::by_id(&mut conn, id).await
    }

    async fn company_by_email(&self, email: &str) -> Result<Option<Company>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::companies::by_email(&mut conn, email).await
    }

    async fn update_company(&self, id: Uuid, patch: CompanyPatch) -> Result<Company, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::companies::update(&mut conn, id, &patch, Utc::now())
            .await?
            .ok_or_else(|| LedgerError::not_found("company", id).into())
    }

    async fn companies(&self, page: PageRequest) -> Result<Page<Company>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::companies::list(&mut conn, None, false, page).await?;
        Ok(Page { items, total })
    }

    async fn subsidiaries(&self, parent_id: Uuid) -> Result<Vec<Company>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::companies::subsidiaries(&mut conn, parent_id).await
    }

    async fn enterprise_users(&self, enterprise_id: Uuid) -> Result<Vec<Company>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::companies::by_enterprise(&mut conn, enterprise_id).await
    }

    // ── Enterprises ─────────────────────────────────────────────────

    async fn enterprise(&self, id: Uuid) -> Result<Option<Enterprise>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::enterprises::by_id(&mut conn, id).await
    }

    async fn update_treasury_settings(
        &self,
        id: Uuid,
        settings: TreasurySettings,
    ) -> Result<Enterprise, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::enterprises::update_settings(&mut conn, id, &settings, Utc::now())
            .await?
            .ok_or_else(|| LedgerError::not_found("enterprise", id).into())
    }

    // ── Bank accounts ───────────────────────────────────────────────

    async fn insert_bank_account(
        &self,
        company_id: Uuid,
        bank_name: String,
        account_num: String,
        currency: String,
    ) -> Result<BankAccount, StoreError> {
        let account = BankAccount {
            id: Uuid::new_v4(),
            company_id,
            bank_name,
            account_num,
            currency,
            is_verified: false,
            created_at: Utc::now(),
        };
        let mut conn = self.pool.acquire().await?;
        db::bank_accounts::insert(&mut conn, &account).await?;
        Ok(account)
    }

    async fn bank_accounts(&self, company_id: Uuid) -> Result<Vec<BankAccount>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::bank_accounts::for_company(&mut conn, company_id).await
    }

    async fn bank_account(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<BankAccount>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::bank_accounts::owned(&mut conn, company_id, id, false).await
    }

    async fn mark_bank_account_verified(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<BankAccount, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut account = db::bank_accounts::owned(&mut tx, company_id, id, true)
            .await?
            .ok_or_else(|| LedgerError::not_found("bank account", id))?;
        if account.is_verified {
            return Err(LedgerError::invalid_state(
                "bank account",
                "verified",
                "bank account is already verified",
            )
            .into());
        }
        db::bank_accounts::set_verified(&mut tx, id).await?;
        tx.commit().await?;
        account.is_verified = true;
        Ok(account)
    }

    async fn delete_bank_account(&self, company_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        // Withdrawal creation locks the company row first; so does this.
        lock_company(&mut tx, company_id).await?;
        db::bank_accounts::owned(&mut tx, company_id, id, true)
            .await?
            .ok_or_else(|| LedgerError::not_found("bank account", id))?;
        if db::withdrawals::account_in_use(&mut tx, id).await? {
            return Err(LedgerError::invalid_state(
                "bank account",
                "in_use",
                "bank account has pending withdrawals",
            )
            .into());
        }
        db::bank_accounts::delete(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    // ── Withdrawals ─────────────────────────────────────────────────

    async fn withdrawal_context(
        &self,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalContext, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let company = db::companies::by_id(&mut conn, company_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("company", company_id))?;
        let (start, end) = utc_day_bounds(now);
        Ok(WithdrawalContext {
            kyc_status: company.kyc_status,
            total_balance: company.usde_balance,
            locked_amount: db::locks::total(&mut conn, company_id).await?,
            daily_total: db::withdrawals::daily_total(&mut conn, company_id, start, end).await?,
            verified_bank_account: db::bank_accounts::first_verified(&mut conn, company_id).await?,
        })
    }

    async fn create_withdrawal(
        &self,
        new: NewWithdrawal,
        limits: WithdrawalLimits,
    ) -> Result<Withdrawal, StoreError> {
        let mut tx = self.pool.begin().await?;
        let company = lock_company(&mut tx, new.company_id).await?;
        let locked_amount = db::locks::total(&mut tx, new.company_id).await?;
        let (start, end) = utc_day_bounds(new.timestamp);
        let daily_total =
            db::withdrawals::daily_total(&mut tx, new.company_id, start, end).await?;
        let account =
            db::bank_accounts::owned(&mut tx, new.company_id, new.bank_account_id, false).await?;

        let ctx = WithdrawalContext {
            kyc_status: company.kyc_status,
            total_balance: company.usde_balance,
            locked_amount,
            daily_total,
            verified_bank_account: account.filter(|a| a.is_verified).map(|a| a.id),
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
        db::withdrawals::insert(&mut tx, &withdrawal).await?;
        post(
            &mut tx,
            Posting {
                company_id: new.company_id,
                kind: TransactionKind::Withdraw,
                amount: new.amount,
                change,
                description: "USDE burned for bank withdrawal".into(),
                metadata: withdrawal_metadata(new.id, &new.burn_tx_hash),
            },
            new.timestamp,
        )
        .await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn claim_withdrawal(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, StoreError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(claimed) = db::withdrawals::claim(&mut conn, id, now).await? {
            return Ok(claimed);
        }
        // Nothing updated: report why.
        let current = db::withdrawals::by_id(&mut conn, id, false)
            .await?
            .ok_or_else(|| LedgerError::not_found("withdrawal", id))?;
        require_claimable(&current)?;
        Err(LedgerError::invalid_state("withdrawal", current.status, "payout already started").into())
    }

    async fn settle_withdrawal(
        &self,
        id: Uuid,
        outcome: PayoutOutcome,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut withdrawal = db::withdrawals::by_id(&mut tx, id, true)
            .await?
            .ok_or_else(|| LedgerError::not_found("withdrawal", id))?;
        require_claimed(&withdrawal)?;
        withdrawal.status = withdrawal.status.transition(outcome.final_status())?;
        withdrawal.processed_at = Some(now);

        match outcome {
            PayoutOutcome::Paid { payout_id } => withdrawal.payout_id = Some(payout_id),
            PayoutOutcome::Rejected { reason } => {
                let company = lock_company(&mut tx, withdrawal.company_id).await?;
                let change = BalanceChange::credit(company.usde_balance, withdrawal.amount)?;
                post(
                    &mut tx,
                    Posting {
                        company_id: company.id,
                        kind: TransactionKind::Refund,
                        amount: withdrawal.amount,
                        change,
                        description: "Refund for failed bank withdrawal".into(),
                        metadata: serde_json::json!({
                            "withdrawalId": withdrawal.id,
                            "reason": reason,
                        }),
                    },
                    now,
                )
                .await?;
                withdrawal.notes = Some(reason);
            }
        }

        db::withdrawals::settle(&mut tx, &withdrawal).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::withdrawals::by_id(&mut conn, id, false).await
    }

    async fn withdrawals(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Withdrawal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::withdrawals::for_company(&mut conn, company_id, page).await?;
        Ok(Page { items, total })
    }

    async fn withdrawal_stats(&self, company_id: Uuid) -> Result<WithdrawalStats, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::withdrawals::stats(&mut conn, company_id).await
    }

    async fn active_withdrawals(&self) -> Result<Vec<Withdrawal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::withdrawals::active(&mut conn).await
    }

    // ── Deposits ────────────────────────────────────────────────────

    async fn insert_deposit(&self, deposit: Deposit) -> Result<Deposit, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::deposits::insert(&mut conn, &deposit).await?;
        Ok(deposit)
    }

    async fn recent_deposit_count(
        &self,
        company_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::deposits::count_since(&mut conn, company_id, since).await
    }

    async fn deposits(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Deposit>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::deposits::for_company(&mut conn, company_id, page).await?;
        Ok(Page { items, total })
    }

    async fn complete_deposit(
        &self,
        company_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CompletedDeposit, StoreError> {
        let mut tx = self.pool.begin().await?;
        let company = lock_company(&mut tx, company_id).await?;
        let mut deposit = db::deposits::owned_for_update(&mut tx, company_id, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("deposit", id))?;
        if let Err(e) = deposit.status.require_completable(deposit.expires_at, now) {
            if deposit.status.is_lapsed(deposit.expires_at, now) {
                db::deposits::mark_expired(&mut tx, id).await?;
                tx.commit().await?;
            }
            return Err(e.into());
        }

        let change = BalanceChange::credit(company.usde_balance, deposit.usde_amount)?;
        post(
            &mut tx,
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
        )
        .await?;
        db::deposits::mark_completed(&mut tx, id, now).await?;
        tx.commit().await?;

        deposit.status = DepositStatus::Completed;
        deposit.completed_at = Some(now);
        Ok(CompletedDeposit {
            deposit,
            usde_balance: change.after,
        })
    }

    async fn deposit_stats(&self, company_id: Uuid) -> Result<DepositStats, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::deposits::stats(&mut conn, company_id).await
    }

    async fn expire_deposits(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::deposits::expire_lapsed(&mut conn, now).await
    }

    // ── Payments and locks ──────────────────────────────────────────

    async fn create_payment(
        &self,
        new: NewPayment,
        now: DateTime<Utc>,
    ) -> Result<Payment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let recipient_id = db::companies::by_email(&mut tx, &new.to_email)
            .await?
            .map(|c| c.id)
            .ok_or_else(|| LedgerError::not_found("company", &new.to_email))?;
        if recipient_id == new.from_id {
            return Err(LedgerError::Validation("cannot send a payment to yourself".into()).into());
        }

        let locked = db::companies::lock_many(&mut tx, &[new.from_id, recipient_id]).await?;
        let find = |id: Uuid| {
            locked
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| LedgerError::not_found("company", id))
        };
        let sender = find(new.from_id)?;
        let recipient = find(recipient_id)?;
        sender.kyc_status.require_approved()?;

        let sender_locks = db::locks::total(&mut tx, sender.id).await?;
        let debit = BalanceChange::debit(
            sender.usde_balance,
            sender.usde_balance - sender_locks,
            new.amount,
        )?;
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
        db::payments::insert(&mut tx, &payment).await?;
        post(
            &mut tx,
            Posting {
                company_id: sender.id,
                kind: TransactionKind::PaymentSent,
                amount: new.amount,
                change: debit,
                description: format!("Payment to {}", recipient.name),
                metadata: metadata.clone(),
            },
            now,
        )
        .await?;
        post(
            &mut tx,
            Posting {
                company_id: recipient.id,
                kind: TransactionKind::PaymentReceived,
                amount: new.amount,
                change: credit,
                description: format!("Payment from {}", sender.name),
                metadata,
            },
            now,
        )
        .await?;
        db::locks::insert(
            &mut tx,
            &LockedBalance {
                id: Uuid::new_v4(),
                company_id: recipient.id,
                amount: new.amount,
                release_at: payment.release_at,
                source_payment_id: Some(payment.id),
                created_at: now,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::payments::by_id(&mut conn, id, false).await
    }

    async fn payments(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Payment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::payments::for_company(&mut conn, company_id, page).await?;
        Ok(Page { items, total })
    }

    async fn payment_summary(&self, company_id: Uuid) -> Result<PaymentSummary, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::payments::summary(&mut conn, company_id).await
    }

    async fn release_payment(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Payment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut payment = db::payments::by_id(&mut tx, id, true)
            .await?
            .ok_or_else(|| LedgerError::not_found("payment", id))?;
        payment.status.require_releasable(payment.release_at, now)?;
        db::payments::mark_released(&mut tx, &[id], now).await?;
        db::locks::delete_for_payment(&mut tx, id).await?;
        tx.commit().await?;
        payment.status = PaymentStatus::Released;
        payment.released_at = Some(now);
        Ok(payment)
    }

    async fn locked_balances(&self, company_id: Uuid) -> Result<Vec<LockedBalance>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::locks::for_company(&mut conn, company_id).await
    }

    async fn release_expired_locks(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let released = db::locks::delete_expired(&mut tx, now).await?;
        let payment_ids: Vec<Uuid> = released.iter().flatten().copied().collect();
        if !payment_ids.is_empty() {
            db::payments::mark_released(&mut tx, &payment_ids, now).await?;
        }
        tx.commit().await?;
        Ok(released.len() as u64)
    }

    // ── Stakes ──────────────────────────────────────────────────────

    async fn create_stake(
        &self,
        company_id: Uuid,
        terms: StakeTerms,
        now: DateTime<Utc>,
    ) -> Result<Stake, StoreError> {
        let mut tx = self.pool.begin().await?;
        let company = lock_company(&mut tx, company_id).await?;
        let locked = db::locks::total(&mut tx, company_id).await?;
        let change = BalanceChange::debit(
            company.usde_balance,
            company.usde_balance - locked,
            terms.amount,
        )?;
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
        db::stakes::insert(&mut tx, &stake).await?;
        post(
            &mut tx,
            Posting {
                company_id,
                kind: TransactionKind::Stake,
                amount: terms.amount,
                change,
                description: format!("Staked USDE for {} days", terms.lock_days),
                metadata: serde_json::json!({ "stakeId": stake.id, "apy": terms.apy }),
            },
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(stake)
    }

    async fn stakes(
        &self,
        company_id: Uuid,
        status: Option<StakeStatus>,
        page: PageRequest,
    ) -> Result<Page<Stake>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) =
            db::stakes::for_company(&mut conn, company_id, status, Some(page)).await?;
        Ok(Page { items, total })
    }

    async fn stake(&self, company_id: Uuid, id: Uuid) -> Result<Option<Stake>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::stakes::owned(&mut conn, company_id, id).await
    }

    async fn active_stakes(&self, company_id: Uuid) -> Result<Vec<Stake>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (rows, _) =
            db::stakes::for_company(&mut conn, company_id, Some(StakeStatus::Active), None)
                .await?;
        Ok(rows)
    }

    async fn accrue_stake_earnings(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let mut accrued = 0;
        for stake in db::stakes::active(&mut conn, None).await? {
            accrued += accrue(&mut conn, &stake, now).await?;
        }
        Ok(accrued)
    }

    async fn complete_matured_stakes(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let matured = {
            let mut conn = self.pool.acquire().await?;
            db::stakes::active(&mut conn, Some(now)).await?
        };
        let mut completed = 0;
        for candidate in matured {
            let mut tx = self.pool.begin().await?;
            let company = lock_company(&mut tx, candidate.company_id).await?;
            // Another sweep may have completed it since the listing.
            let Some(stake) = db::stakes::by_id_for_update(&mut tx, candidate.id).await? else {
                continue;
            };
            if stake.status != StakeStatus::Active || !is_matured(stake.end_date, now) {
                continue;
            }
            accrue(&mut tx, &stake, now).await?;
            let (_, interest) = db::earnings::for_stake(&mut tx, stake.id).await?;
            for posting in maturity_postings(&stake, company.usde_balance, interest)? {
                post(&mut tx, posting, now).await?;
            }
            db::stakes::complete(&mut tx, stake.id, interest, now).await?;
            tx.commit().await?;
            completed += 1;
        }
        Ok(completed)
    }

    async fn earnings(
        &self,
        company_id: Uuid,
        since: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Page<Earning>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::earnings::for_company(&mut conn, company_id, since, page).await?;
        Ok(Page { items, total })
    }

    async fn earnings_summary(
        &self,
        company_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<EarningsSummary, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::earnings::summary(&mut conn, company_id, since).await
    }

    // ── Enterprise reporting ────────────────────────────────────────

    async fn enterprise_activity(
        &self,
        enterprise_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EnterpriseActivity, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(EnterpriseActivity {
            payments: db::payments::sent_by_enterprise(&mut conn, enterprise_id, start, end).await?,
            withdrawals: db::withdrawals::for_enterprise(&mut conn, enterprise_id, start, end)
                .await?,
            deposits: db::deposits::for_enterprise(&mut conn, enterprise_id, start, end).await?,
        })
    }

    // ── Ledger ──────────────────────────────────────────────────────

    async fn transactions(
        &self,
        company_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::ledger::for_company(&mut conn, company_id, page).await?;
        Ok(Page { items, total })
    }

    // ── KYC ─────────────────────────────────────────────────────────

    async fn submit_kyc(
        &self,
        submission: KycSubmission,
        now: DateTime<Utc>,
    ) -> Result<Company, StoreError> {
        let company_id = submission.profile.company_id;
        let mut tx = self.pool.begin().await?;
        let mut company = lock_company(&mut tx, company_id).await?;
        if !company.kyc_status.accepts_submission() {
            return Err(LedgerError::invalid_state(
                "kyc",
                company.kyc_status,
                "KYC is already approved",
            )
            .into());
        }

        let ubos: Vec<Ubo> = submission
            .ubos
            .into_iter()
            .map(|u| Ubo {
                id: Uuid::new_v4(),
                company_id,
                name: u.name,
                id_number: u.id_number,
                nationality: u.nationality,
                address: u.address,
                ownership_percentage: u.ownership_percentage,
            })
            .collect();
        db::kyc::upsert_profile(&mut tx, &submission.profile).await?;
        db::kyc::replace_ubos(&mut tx, company_id, &ubos).await?;
        db::kyc::append_review(
            &mut tx,
            &KycReview {
                id: Uuid::new_v4(),
                company_id,
                reviewer_id: None,
                decision: "submitted".into(),
                notes: None,
                created_at: now,
            },
        )
        .await?;
        db::companies::set_kyc_status(&mut tx, company_id, KycStatus::Pending, now).await?;
        tx.commit().await?;

        company.kyc_status = KycStatus::Pending;
        company.updated_at = now;
        Ok(company)
    }

    async fn kyc_application(&self, company_id: Uuid) -> Result<KycApplication, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let company = db::companies::by_id(&mut conn, company_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("company", company_id))?;
        Ok(KycApplication {
            kyc_status: company.kyc_status,
            profile: db::kyc::profile(&mut conn, company_id).await?,
            ubos: db::kyc::ubos(&mut conn, company_id).await?,
            reviews: db::kyc::reviews(&mut conn, company_id).await?,
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
        let mut tx = self.pool.begin().await?;
        let mut company = lock_company(&mut tx, company_id).await?;
        if company.kyc_status != KycStatus::Pending {
            return Err(LedgerError::invalid_state(
                "kyc",
                company.kyc_status,
                "only pending applications can be reviewed",
            )
            .into());
        }
        db::kyc::append_review(
            &mut tx,
            &KycReview {
                id: Uuid::new_v4(),
                company_id,
                reviewer_id: Some(reviewer_id),
                decision: decision.to_string(),
                notes,
                created_at: now,
            },
        )
        .await?;
        let status = decision.resulting_status();
        db::companies::set_kyc_status(&mut tx, company_id, status, now).await?;
        tx.commit().await?;

        company.kyc_status = status;
        company.updated_at = now;
        Ok(company)
    }

    async fn kyc_applications(
        &self,
        status: Option<KycStatus>,
        page: PageRequest,
    ) -> Result<Page<Company>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) =
            db::companies::list(&mut conn, status, status.is_none(), page).await?;
        Ok(Page { items, total })
    }

    // ── Audit ───────────────────────────────────────────────────────

    async fn append_audit(
        &self,
        entry: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<AuditLog, StoreError> {
        let mut tx = self.pool.begin().await?;
        let log = db::audit::append(&mut tx, entry, now).await?;
        tx.commit().await?;
        Ok(log)
    }

    async fn audit_logs(&self, page: PageRequest) -> Result<Page<AuditLog>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (items, total) = db::audit::page(&mut conn, page).await?;
        Ok(Page { items, total })
    }

    async fn audit_chain(&self) -> Result<Vec<AuditLog>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        db::audit::chain(&mut conn).await
    }

    // ── Administration ──────────────────────────────────────────────

    async fn platform_stats(&self) -> Result<PlatformStats, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let (total_companies, active_companies, pending_kyc, total_usde) =
            db::companies::totals(&mut conn).await?;
        let (total_withdrawals, active_withdrawals) = db::withdrawals::counts(&mut conn).await?;
        Ok(PlatformStats {
            total_companies,
            active_companies,
            total_usde,
            total_withdrawals,
            active_withdrawals,
            pending_kyc,
        })
    }
}
