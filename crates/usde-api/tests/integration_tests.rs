//! # Integration Tests for usde-api
//!
//! Drives the full router over the in-memory store: registration, KYC
//! approval, bank account verification, deposit funding, withdrawals with
//! limit enforcement and payout refunds, payments with locks, the deposit
//! rate limit, staking on the dashboard, enterprise budgets and reports,
//! the admin sweep and the public OpenAPI document.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use usde_api::bootstrap::ensure_system_admin;
use usde_api::config::{AppConfig, BootstrapAdmin};
use usde_api::services::payout::PayoutGateway;
use usde_api::state::{AppState, BankAccount, Withdrawal};
use usde_api::store::memory::MemoryStore;
use usde_core::PayoutOutcome;

const ADMIN_EMAIL: &str = "admin@usde.test";
const ADMIN_PASSWORD: &str = "admin-secret";

/// Gateway with a fixed answer: accounts always verify, payouts succeed
/// or are refused depending on `pays`.
struct FixedBank {
    pays: bool,
}

#[axum::async_trait]
impl PayoutGateway for FixedBank {
    async fn payout(&self, _withdrawal: &Withdrawal) -> PayoutOutcome {
        if self.pays {
            PayoutOutcome::Paid {
                payout_id: "po_test_00000001".into(),
            }
        } else {
            PayoutOutcome::Rejected {
                reason: "account closed".into(),
            }
        }
    }

    async fn verify_account(&self, _account: &BankAccount) -> bool {
        true
    }
}

/// Helper: app plus an admin token, with the given payout behavior.
async fn test_app(pays: bool) -> (Router, String) {
    let state = AppState::with_gateway(
        AppConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(FixedBank { pays }),
    );
    ensure_system_admin(
        state.store.as_ref(),
        &BootstrapAdmin {
            email: ADMIN_EMAIL.into(),
            password: ADMIN_PASSWORD.into(),
        },
    )
    .await
    .unwrap();

    let app = usde_api::app(state);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "admin login: {body}");
    let token = body["token"].as_str().unwrap().to_string();
    (app, token)
}

/// Helper: one request, JSON body parsed (or `Null` when empty).
async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Helper: register a company, returning its token and id.
async fn register(app: &Router, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "name": "Acme Trading", "email": email, "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register: {body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["company"]["id"].as_str().unwrap().to_string(),
    )
}

/// Helper: submit KYC and have the admin approve it.
async fn approve_kyc(app: &Router, admin: &str, token: &str, company_id: &str) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/kyc/submit",
        Some(token),
        Some(json!({
            "englishName": "Acme Trading Ltd",
            "registrationNumber": "REG-2291",
            "country": "SG",
            "address": "1 Harbourfront Ave, Singapore",
            "incorporationDate": "2019-04-01",
            "companyType": "Private Limited",
            "isPep": false,
            "hasSanctions": false,
            "complianceAgreed": true,
            "ubos": [{
                "name": "Jane Tan",
                "idNumber": "S1234567A",
                "nationality": "SG",
                "address": "8 Marina Boulevard, Singapore",
                "ownershipPercentage": 100
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "kyc submit: {body}");

    let (status, body) = send(
        app,
        Method::PUT,
        &format!("/api/admin/kyc/{company_id}/review"),
        Some(admin),
        Some(json!({ "decision": "approved", "notes": "documents match" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "kyc review: {body}");
    assert_eq!(body["company"]["kycStatus"], "approved");
}

/// Helper: add and verify a bank account, returning its id.
async fn verified_account(app: &Router, token: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/bank-accounts",
        Some(token),
        Some(json!({ "bankName": "DBS", "accountNum": "0012345678" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "add account: {body}");
    let id = body["bankAccount"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/bank-accounts/{id}/verify"),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "verify account: {body}");
    assert_eq!(body["bankAccount"]["isVerified"], true);
    id
}

/// Helper: deposit 5012.53 and complete it, minting 5000.00 USDE.
async fn fund(app: &Router, token: &str) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/deposits",
        Some(token),
        Some(json!({ "amount": 5012.53, "paymentMethod": "bank_transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "deposit: {body}");
    let id = body["deposit"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/deposits/{id}/complete"),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "complete deposit: {body}");
    assert_eq!(body["usdeBalance"].as_f64(), Some(5000.0));
}

/// Helper: an approved, funded company with a verified account.
async fn ready_company(app: &Router, admin: &str, email: &str) -> (String, String) {
    let (token, company_id) = register(app, email).await;
    approve_kyc(app, admin, &token, &company_id).await;
    let account = verified_account(app, &token).await;
    fund(app, &token).await;
    (token, account)
}

async fn total_balance(app: &Router, token: &str) -> f64 {
    let (status, body) = send(app, Method::GET, "/api/bank-accounts/balance", Some(token), None).await;
    assert_eq!(status, StatusCode::OK, "balance: {body}");
    body["totalBalance"].as_f64().unwrap()
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_protected_route_requires_token() {
    let (app, _) = test_app(true).await;
    let (status, body) = send(&app, Method::GET, "/api/withdrawals", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let (app, _) = test_app(true).await;
    let (status, _) = send(&app, Method::GET, "/api/auth/profile", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let (app, _) = test_app(true).await;
    register(&app, "dup@acme.test").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "name": "Acme Again", "email": "DUP@acme.test", "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_suspended_company_loses_access() {
    let (app, admin) = test_app(true).await;
    let (token, company_id) = register(&app, "suspend@acme.test").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/admin/companies/{company_id}/status"),
        Some(&admin),
        Some(json!({ "status": "suspended", "reason": "chargeback" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "suspend: {body}");

    let (status, _) = send(&app, Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Withdrawals --------------------------------------------------------------

#[tokio::test]
async fn test_withdrawal_debits_and_settles() {
    let (app, admin) = test_app(true).await;
    let (token, account) = ready_company(&app, &admin, "treasury@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals",
        Some(&token),
        Some(json!({ "amount": 3000, "bankAccountId": account })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "withdraw: {body}");
    assert_eq!(body["withdrawal"]["status"], "processing");
    assert_eq!(body["withdrawal"]["bankAccount"]["bankName"], "DBS");
    let id = body["withdrawal"]["id"].as_str().unwrap().to_string();
    assert_eq!(total_balance(&app, &token).await, 2000.0);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/withdrawals/{id}/process"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "process: {body}");
    assert_eq!(body["result"]["status"], "success");
    assert_eq!(body["result"]["payoutId"], "po_test_00000001");
    assert_eq!(total_balance(&app, &token).await, 2000.0);

    // Settled withdrawals cannot be processed twice.
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/withdrawals/{id}/process"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn test_withdrawal_over_single_limit_rejected() {
    let (app, admin) = test_app(true).await;
    let (token, account) = ready_company(&app, &admin, "big@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals/check-limits",
        Some(&token),
        Some(json!({ "amount": 6000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SINGLE_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["details"]["singleLimit"].as_f64(), Some(5000.0));

    // Creation checks the balance first.
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals",
        Some(&token),
        Some(json!({ "amount": 6000, "bankAccountId": account })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
    assert_eq!(total_balance(&app, &token).await, 5000.0);

    let (_, body) = send(&app, Method::GET, "/api/withdrawals", Some(&token), None).await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_withdrawal_over_balance_rejected() {
    let (app, admin) = test_app(true).await;
    let (token, account) = ready_company(&app, &admin, "short@acme.test").await;

    let first = json!({ "amount": 4000, "bankAccountId": account });
    let (status, _) = send(&app, Method::POST, "/api/withdrawals", Some(&token), Some(first)).await;
    assert_eq!(status, StatusCode::CREATED);

    let second = json!({ "amount": 1500, "bankAccountId": account });
    let (status, body) = send(&app, Method::POST, "/api/withdrawals", Some(&token), Some(second)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
}

#[tokio::test]
async fn test_withdrawal_requires_approved_kyc() {
    let (app, _) = test_app(true).await;
    let (token, _) = register(&app, "pending@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals/check-limits",
        Some(&token),
        Some(json!({ "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "KYC_REQUIRED");
}

#[tokio::test]
async fn test_refused_payout_refunds() {
    let (app, admin) = test_app(false).await;
    let (token, account) = ready_company(&app, &admin, "refund@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals",
        Some(&token),
        Some(json!({ "amount": 1200, "bankAccountId": account })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "withdraw: {body}");
    let id = body["withdrawal"]["id"].as_str().unwrap().to_string();
    assert_eq!(total_balance(&app, &token).await, 3800.0);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/withdrawals/{id}/process"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "process: {body}");
    assert_eq!(body["result"]["status"], "failed");
    assert_eq!(body["result"]["error"], "account closed");
    assert_eq!(total_balance(&app, &token).await, 5000.0);

    let (status, body) = send(&app, Method::GET, "/api/transactions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = body["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["type"].as_str())
        .collect();
    assert!(kinds.contains(&"refund"), "ledger: {kinds:?}");
}

#[tokio::test]
async fn test_other_company_withdrawal_is_not_found() {
    let (app, admin) = test_app(true).await;
    let (owner, account) = ready_company(&app, &admin, "owner@acme.test").await;
    let (stranger, _) = register(&app, "stranger@acme.test").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals",
        Some(&owner),
        Some(json!({ "amount": 100, "bankAccountId": account })),
    )
    .await;
    let id = body["withdrawal"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/withdrawals/{id}/process"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Payments and locks -------------------------------------------------------

#[tokio::test]
async fn test_locked_payment_not_withdrawable() {
    let (app, admin) = test_app(true).await;
    let (payer, _) = ready_company(&app, &admin, "payer@acme.test").await;
    let (payee, payee_account) = ready_company(&app, &admin, "payee@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(&payer),
        Some(json!({ "toEmail": "PAYEE@acme.test", "amount": 1000, "lockDays": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "payment: {body}");

    let (status, body) = send(&app, Method::GET, "/api/payments/locked-balances", Some(&payee), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalLocked"].as_f64(), Some(1000.0));

    let (_, body) = send(&app, Method::GET, "/api/bank-accounts/balance", Some(&payee), None).await;
    assert_eq!(body["totalBalance"].as_f64(), Some(6000.0));
    assert_eq!(body["availableBalance"].as_f64(), Some(5000.0));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/withdrawals/check-balance",
        Some(&payee),
        Some(json!({ "amount": 5500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hasEnoughBalance"], false);

    let first = json!({ "amount": 4500, "bankAccountId": payee_account });
    let (status, _) = send(&app, Method::POST, "/api/withdrawals", Some(&payee), Some(first)).await;
    assert_eq!(status, StatusCode::CREATED);

    // 1500 remains on the books but 1000 of it is locked.
    let second = json!({ "amount": 600, "bankAccountId": payee_account });
    let (status, body) = send(&app, Method::POST, "/api/withdrawals", Some(&payee), Some(second)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
}

// -- Deposits -----------------------------------------------------------------

#[tokio::test]
async fn test_sixth_deposit_rate_limited() {
    let (app, _) = test_app(true).await;
    let (token, _) = register(&app, "busy@acme.test").await;
    let deposit = json!({ "amount": 100, "paymentMethod": "bank_transfer" });

    for i in 0..5 {
        let (status, body) = send(&app, Method::POST, "/api/deposits", Some(&token), Some(deposit.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "deposit {i}: {body}");
        assert_eq!(body["risk"]["decision"], "manual_review");
    }
    let (status, body) = send(&app, Method::POST, "/api/deposits", Some(&token), Some(deposit)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // History is not rate limited.
    let (status, body) = send(&app, Method::GET, "/api/deposits", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deposits"].as_array().unwrap().len(), 5);
}

// -- Administration -----------------------------------------------------------

#[tokio::test]
async fn test_admin_routes_forbidden_to_companies() {
    let (app, _) = test_app(true).await;
    let (token, _) = register(&app, "nosy@acme.test").await;
    let (status, _) = send(&app, Method::GET, "/api/admin/companies", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_audit_chain_intact_after_review() {
    let (app, admin) = test_app(true).await;
    let (token, company_id) = register(&app, "audited@acme.test").await;
    approve_kyc(&app, &admin, &token, &company_id).await;

    let (status, body) = send(&app, Method::GET, "/api/admin/audit-logs/verify", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert!(body["entries"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_admin_sweep_reports_counts() {
    let (app, admin) = test_app(true).await;
    let (status, body) = send(&app, Method::POST, "/api/admin/sweep", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "sweep: {body}");
    assert_eq!(body["stakesCompleted"], 0);
    assert_eq!(body["depositsExpired"], 0);

    let (token, _) = register(&app, "sweeper@acme.test").await;
    let (status, _) = send(&app, Method::POST, "/api/admin/sweep", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// -- Dashboards and reports ---------------------------------------------------

#[tokio::test]
async fn test_dashboard_shows_stakes_and_payments() {
    let (app, admin) = test_app(true).await;
    let (payer, _) = ready_company(&app, &admin, "staker@acme.test").await;
    register(&app, "supplier@acme.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/stakes",
        Some(&payer),
        Some(json!({ "amount": 1000, "lockPeriod": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "stake: {body}");
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/payments",
        Some(&payer),
        Some(json!({ "toEmail": "supplier@acme.test", "amount": 500, "lockDays": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "payment: {body}");

    let (status, body) = send(&app, Method::GET, "/api/dashboard", Some(&payer), None).await;
    assert_eq!(status, StatusCode::OK, "dashboard: {body}");
    let overview = &body["overview"];
    assert_eq!(overview["availableBalance"].as_f64(), Some(3500.0));
    assert_eq!(overview["lockedAmount"].as_f64(), Some(0.0));
    assert_eq!(overview["activeStakesCount"], 1);
    // 1000 at 4% a year.
    assert_eq!(overview["currentDailyEarnings"].as_f64(), Some(0.11));
    assert_eq!(overview["totalEarnings"].as_f64(), Some(0.0));
    assert_eq!(body["statistics"]["stakes"]["total"].as_f64(), Some(1000.0));
    assert_eq!(body["statistics"]["payments"]["sentCount"], 1);
    assert_eq!(body["statistics"]["payments"]["sentTotal"].as_f64(), Some(500.0));
    assert_eq!(body["recentActivities"]["payments"].as_array().unwrap().len(), 1);
    assert_eq!(body["recentActivities"]["stakes"].as_array().unwrap().len(), 1);
    assert!(body["company"].get("passwordHash").is_none());

    let (status, body) = send(&app, Method::GET, "/api/dashboard/earnings?period=7d", Some(&payer), None).await;
    assert_eq!(status, StatusCode::OK, "earnings: {body}");
    assert_eq!(body["summary"]["period"], "7d");
    assert_eq!(body["summary"]["count"], 0);
    assert!(body["earnings"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, Method::GET, "/api/dashboard/earnings?period=2w", Some(&payer), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_enterprise_dashboard_tracks_budget() {
    let (app, admin) = test_app(true).await;
    let (token, account) = ready_company(&app, &admin, "treasurer@acme.test").await;
    register(&app, "vendor@acme.test").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/enterprise/settings",
        Some(&token),
        Some(json!({
            "monthlyBudget": 2000,
            "quarterlyBudget": 6000,
            "approvalThreshold": 1000,
            "autoApprovalEnabled": false,
            "riskFlagThreshold": 5000,
            "approvalWorkflow": "single"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "settings: {body}");

    let withdrawal = json!({ "amount": 1500, "bankAccountId": account });
    let (status, _) = send(&app, Method::POST, "/api/withdrawals", Some(&token), Some(withdrawal)).await;
    assert_eq!(status, StatusCode::CREATED);
    let payment = json!({ "toEmail": "vendor@acme.test", "amount": 1000, "lockDays": 30 });
    let (status, _) = send(&app, Method::POST, "/api/payments", Some(&token), Some(payment)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::GET, "/api/enterprise/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "dashboard: {body}");
    assert_eq!(body["monthToDate"]["payments"].as_f64(), Some(1000.0));
    assert_eq!(body["monthToDate"]["withdrawals"].as_f64(), Some(1500.0));
    assert_eq!(body["monthlyBudget"]["spent"].as_f64(), Some(2500.0));
    assert_eq!(body["monthlyBudget"]["remaining"].as_f64(), Some(-500.0));
    assert_eq!(body["monthlyBudget"]["overBudget"], true);
    assert_eq!(body["quarterlyBudget"]["overBudget"], false);
    assert_eq!(body["memberCount"], 1);
    assert!(!body["recentTransactions"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, Method::GET, "/api/enterprise/reports/monthly", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "report: {body}");
    assert_eq!(body["paymentCount"], 1);
    assert_eq!(body["withdrawalCount"], 1);
    assert_eq!(body["depositCount"], 1);
    assert_eq!(body["totalWithdrawals"].as_f64(), Some(1500.0));
    assert_eq!(body["period"].as_str().unwrap().len(), 7);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/enterprise/reports/monthly?year=2001&month=1",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], "2001-01");
    assert_eq!(body["paymentCount"], 0);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/enterprise/reports/monthly?year=2026&month=13",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- OpenAPI ------------------------------------------------------------------

#[tokio::test]
async fn test_openapi_served_without_auth() {
    let (app, _) = test_app(true).await;
    let (status, body) = send(&app, Method::GET, "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "USDE Back Office API");
    assert!(body["paths"]["/api/withdrawals"].is_object());
    assert!(body["paths"]["/api/enterprise/reports/monthly"].is_object());
    assert!(body["paths"]["/api/dashboard/earnings"].is_object());
}
