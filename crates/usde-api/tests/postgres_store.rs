//! PostgreSQL store tests.
//!
//! These exercise [`PgStore`] against a live database and run only when
//! `DATABASE_URL` is set; without it every test returns early:
//!
//!   DATABASE_URL=postgres://... cargo test -p usde-api --test postgres_store
//!
//! Each test works on companies with fresh e-mails so runs can share a
//! database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use usde_api::state::Deposit;
use usde_api::store::postgres::PgStore;
use usde_api::store::{LedgerStore, NewCompany, NewWithdrawal, StoreError};
use usde_core::{
    CompanyKind, DepositStatus, KycStatus, LedgerError, PageRequest, PayoutOutcome, RiskDecision,
    Role, StakeStatus, StakeTerms, TransactionKind, WithdrawalLimits, WithdrawalStatus,
};
use uuid::Uuid;

fn d(v: i64) -> Decimal {
    Decimal::from(v)
}

/// Connect and migrate, or `None` when no database is configured.
async fn pg_store() -> Option<PgStore> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL store test");
            return None;
        }
    };
    let pool = usde_api::db::init_pool(&url)
        .await
        .expect("connect and migrate");
    Some(PgStore::new(pool))
}

fn pending_deposit(company_id: Uuid, amount: Decimal, created_at: chrono::DateTime<Utc>) -> Deposit {
    Deposit {
        id: Uuid::new_v4(),
        company_id,
        amount,
        fee: Decimal::ZERO,
        fee_rate: Decimal::ZERO,
        usde_amount: amount,
        payment_method: "bank_transfer".into(),
        status: DepositStatus::Pending,
        risk_score: 0,
        risk_decision: RiskDecision::Approved,
        expires_at: created_at + Duration::hours(2),
        completed_at: None,
        created_at,
    }
}

/// Approved company holding `balance` USDE with one verified bank account.
async fn ready_company(store: &PgStore, balance: i64) -> (Uuid, Uuid) {
    let company = store
        .insert_company(NewCompany {
            name: "Acme Trading".into(),
            email: format!("{}@acme.test", Uuid::new_v4()),
            password_hash: "hash".into(),
            kind: CompanyKind::Company,
            role: Role::EnterpriseAdmin,
            kyc_status: KycStatus::Approved,
            parent_company_id: None,
            enterprise_id: None,
            company_code: None,
            company_address: None,
        })
        .await
        .unwrap();

    let now = Utc::now();
    let deposit = store
        .insert_deposit(pending_deposit(company.id, d(balance), now))
        .await
        .unwrap();
    store.complete_deposit(company.id, deposit.id, now).await.unwrap();

    let account = store
        .insert_bank_account(
            company.id,
            "First Bank".into(),
            Uuid::new_v4().simple().to_string(),
            "USD".into(),
        )
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

async fn balance(store: &PgStore, company_id: Uuid) -> Decimal {
    store.company(company_id).await.unwrap().unwrap().usde_balance
}

#[tokio::test]
async fn withdrawal_debits_balance_and_records_entry() {
    let Some(store) = pg_store().await else { return };
    let (company_id, account_id) = ready_company(&store, 5000).await;

    let w = store
        .create_withdrawal(withdrawal(company_id, account_id, 3000), WithdrawalLimits::default())
        .await
        .unwrap();
    assert_eq!(w.status, WithdrawalStatus::Processing);
    assert_eq!(balance(&store, company_id).await, d(2000));

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
}

#[tokio::test]
async fn failed_payout_refunds_once() {
    let Some(store) = pg_store().await else { return };
    let (company_id, account_id) = ready_company(&store, 5000).await;

    let w = store
        .create_withdrawal(withdrawal(company_id, account_id, 3000), WithdrawalLimits::default())
        .await
        .unwrap();

    // Settling an unclaimed withdrawal is refused.
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

    store.claim_withdrawal(w.id, Utc::now()).await.unwrap();
    let err = store.claim_withdrawal(w.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));

    let settled = store
        .settle_withdrawal(
            w.id,
            PayoutOutcome::Rejected {
                reason: "bank refused".into(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(settled.status, WithdrawalStatus::Failed);
    assert_eq!(balance(&store, company_id).await, d(5000));

    let err = store
        .settle_withdrawal(
            w.id,
            PayoutOutcome::Rejected {
                reason: "again".into(),
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));
    assert_eq!(balance(&store, company_id).await, d(5000));

    let refunds = store
        .transactions(company_id, PageRequest::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .filter(|e| e.kind == TransactionKind::Refund)
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_never_overdraw() {
    let Some(store) = pg_store().await else { return };
    let store = Arc::new(store);
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
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(StoreError::Ledger(LedgerError::InsufficientBalance { .. })) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(balance(&store, company_id).await, d(2000));

    let page = store
        .withdrawals(company_id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn lapsed_deposit_is_persisted_expired() {
    let Some(store) = pg_store().await else { return };
    let (company_id, _) = ready_company(&store, 100).await;

    let created_at = Utc::now() - Duration::hours(3);
    let deposit = store
        .insert_deposit(pending_deposit(company_id, d(250), created_at))
        .await
        .unwrap();
    let err = store
        .complete_deposit(company_id, deposit.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Ledger(LedgerError::InvalidState { .. })));

    let deposits = store
        .deposits(company_id, PageRequest::default())
        .await
        .unwrap();
    let stored = deposits
        .items
        .iter()
        .find(|dep| dep.id == deposit.id)
        .unwrap();
    assert_eq!(stored.status, DepositStatus::Expired);
    assert_eq!(balance(&store, company_id).await, d(100));
}

#[tokio::test]
async fn matured_stake_pays_principal_and_interest() {
    let Some(store) = pg_store().await else { return };
    let (company_id, _) = ready_company(&store, 36_500).await;

    let terms = StakeTerms::new(d(36_500), 30, Some(Decimal::new(4, 2))).unwrap();
    let stake = store
        .create_stake(company_id, terms, Utc::now() - Duration::days(400))
        .await
        .unwrap();
    assert_eq!(balance(&store, company_id).await, Decimal::ZERO);

    assert!(store.complete_matured_stakes(Utc::now()).await.unwrap() >= 1);

    let completed = store.stake(company_id, stake.id).await.unwrap().unwrap();
    assert_eq!(completed.status, StakeStatus::Completed);
    assert_eq!(completed.earnings_paid, d(120));
    assert!(completed.completed_at.is_some());
    assert_eq!(balance(&store, company_id).await, d(36_620));

    let earnings = store
        .earnings_summary(company_id, None)
        .await
        .unwrap();
    assert_eq!(earnings.count, 30);
    assert_eq!(earnings.total_earnings, d(120));

    // A second sweep leaves the completed stake alone.
    store.complete_matured_stakes(Utc::now()).await.unwrap();
    assert_eq!(balance(&store, company_id).await, d(36_620));
}
