//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor, and the record types every store returns.
//!
//! ## Architecture
//!
//! Every service object is built once in [`AppState::new`] and injected
//! here; nothing is a process global:
//!
//! - **store** — [`LedgerStore`] (PostgreSQL or in-memory)
//! - **withdrawals** — the Withdrawal Service
//! - **payouts** — bank gateway used for payouts and account verification
//! - **tokens** — JWT signing and verification keys
//! - **metrics** / **deposit_limiter** — request counters and the deposit
//!   rate limiter

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use usde_core::audit::{ChainLink, ChainedEntry};
use usde_core::{
    CompanyKind, CompanyStatus, DepositStatus, KycStatus, PaymentStatus, RiskDecision, Role,
    StakeStatus, TransactionKind, TreasurySettings, WithdrawalStatus,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::TokenKeys;
use crate::config::AppConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::payout::{PayoutGateway, SimulatedBank};
use crate::services::withdrawal::WithdrawalService;
use crate::store::memory::MemoryStore;
use crate::store::LedgerStore;

// ── Records ─────────────────────────────────────────────────────────────────

/// A tenant account. Companies authenticate, hold balances and own every
/// other record.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[schema(value_type = String)]
    pub kind: CompanyKind,
    #[schema(value_type = String)]
    pub role: Role,
    #[schema(value_type = String)]
    pub status: CompanyStatus,
    #[schema(value_type = String)]
    pub kyc_status: KycStatus,
    /// USDE token balance.
    pub usde_balance: Decimal,
    /// Fiat balance.
    pub balance: Decimal,
    pub parent_company_id: Option<Uuid>,
    pub is_parent_company: bool,
    pub enterprise_id: Option<Uuid>,
    pub company_code: Option<String>,
    pub company_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Enterprise record owning treasury settings.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Enterprise {
    pub id: Uuid,
    pub name: String,
    pub admin_id: Uuid,
    #[schema(value_type = Object)]
    pub settings: TreasurySettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A payout destination. Must be verified before use.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub id: Uuid,
    pub company_id: Uuid,
    pub bank_name: String,
    pub account_num: String,
    pub currency: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Funds reserved on a company until `release_at`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LockedBalance {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub release_at: DateTime<Utc>,
    pub source_payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A request to burn USDE and pay out fiat to a bank account.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: Uuid,
    pub company_id: Uuid,
    pub bank_account_id: Uuid,
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub status: WithdrawalStatus,
    pub burn_tx_hash: Option<String>,
    pub payout_id: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set when a payout attempt claims the withdrawal; at most once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Append-only ledger entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fiat deposit order.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    pub fee_rate: Decimal,
    pub usde_amount: Decimal,
    pub payment_method: String,
    #[schema(value_type = String)]
    pub status: DepositStatus,
    pub risk_score: u32,
    #[schema(value_type = String)]
    pub risk_decision: RiskDecision,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inter-company payment with a lock on the recipient.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub amount: Decimal,
    pub lock_days: u32,
    pub release_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub status: PaymentStatus,
    pub released_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Staked USDE.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub apy: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[schema(value_type = String)]
    pub status: StakeStatus,
    /// Interest credited at maturity; zero while active.
    pub earnings_paid: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One day of interest accrued on a stake.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Earning {
    pub id: Uuid,
    pub company_id: Uuid,
    pub stake_id: Uuid,
    /// Day of the term this accrual covers, from 1.
    pub day: u32,
    pub amount: Decimal,
    /// End of the day accrued.
    pub accrued_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Company information submitted with a KYC application.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycProfile {
    pub company_id: Uuid,
    pub english_name: String,
    pub registration_number: String,
    pub country: String,
    pub address: String,
    pub incorporation_date: String,
    pub company_type: String,
    pub is_pep: bool,
    pub has_sanctions: bool,
    pub compliance_agreed: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Ultimate beneficial owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ubo {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub id_number: String,
    pub nationality: String,
    pub address: String,
    pub ownership_percentage: Decimal,
}

/// One step in a company's KYC history.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycReview {
    pub id: Uuid,
    pub company_id: Uuid,
    pub reviewer_id: Option<Uuid>,
    /// `submitted`, `approved`, `rejected` or `request_info`.
    pub decision: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Hash-chained administrative audit entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub target_id: Uuid,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub previous_hash: String,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Hash for an entry with these fields following `previous_hash`.
    pub fn chain_hash(
        previous_hash: &str,
        action: &str,
        actor_id: Uuid,
        target_id: Uuid,
        details: &serde_json::Value,
    ) -> String {
        let actor = actor_id.to_string();
        let target = target_id.to_string();
        let details = details.to_string();
        ChainLink {
            previous_hash,
            action,
            actor: &actor,
            target: &target,
            details: &details,
        }
        .hash()
    }
}

impl ChainedEntry for AuditLog {
    fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    fn entry_hash(&self) -> &str {
        &self.entry_hash
    }

    fn computed_hash(&self) -> String {
        Self::chain_hash(
            &self.previous_hash,
            &self.action,
            self.actor_id,
            self.target_id,
            &self.details,
        )
    }
}

// ── Application State ───────────────────────────────────────────────────────

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub withdrawals: WithdrawalService,
    pub payouts: Arc<dyn PayoutGateway>,
    pub tokens: TokenKeys,
    pub metrics: ApiMetrics,
    /// Five deposit requests per company per 15 minutes.
    pub deposit_limiter: RateLimiter,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire every service from `config` around an existing store, using the
    /// simulated bank configured by `config.payout`.
    pub fn new(config: AppConfig, store: Arc<dyn LedgerStore>) -> Self {
        let payouts: Arc<dyn PayoutGateway> = Arc::new(SimulatedBank::new(config.payout));
        Self::with_gateway(config, store, payouts)
    }

    /// Wire every service around an explicit store and payout gateway.
    pub fn with_gateway(
        config: AppConfig,
        store: Arc<dyn LedgerStore>,
        payouts: Arc<dyn PayoutGateway>,
    ) -> Self {
        let metrics = ApiMetrics::new();
        let withdrawals = WithdrawalService::new(
            Arc::clone(&store),
            Arc::clone(&payouts),
            config.limits,
            metrics.clone(),
        );
        Self {
            store,
            withdrawals,
            payouts,
            tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl),
            metrics,
            deposit_limiter: RateLimiter::new(RateLimitConfig::deposits()),
            config: Arc::new(config),
        }
    }

    /// In-memory state with development defaults.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usde_core::audit::{verify_chain, GENESIS_HASH};

    fn audit(previous: &str, action: &str) -> AuditLog {
        let actor_id = Uuid::new_v4();
        let target_id = Uuid::new_v4();
        let details = serde_json::json!({ "status": "suspended" });
        AuditLog {
            id: Uuid::new_v4(),
            actor_id,
            action: action.to_string(),
            target_id,
            entry_hash: AuditLog::chain_hash(previous, action, actor_id, target_id, &details),
            details,
            previous_hash: previous.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn audit_chain_links() {
        let first = audit(GENESIS_HASH, "company.status");
        let second = audit(&first.entry_hash, "kyc.review");
        assert_eq!(verify_chain(&[first.clone(), second.clone()]), None);
        assert_eq!(verify_chain(&[second, first]), Some(0));
    }

    #[test]
    fn company_serializes_camel_case_without_password() {
        let now = Utc::now();
        let company = Company {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            email: "ops@acme.test".into(),
            password_hash: "$argon2id$secret".into(),
            kind: CompanyKind::Enterprise,
            role: Role::EnterpriseAdmin,
            status: CompanyStatus::Active,
            kyc_status: KycStatus::Pending,
            usde_balance: Decimal::from(5000),
            balance: Decimal::ZERO,
            parent_company_id: None,
            is_parent_company: false,
            enterprise_id: None,
            company_code: None,
            company_address: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&company).unwrap();
        assert_eq!(json["kycStatus"], "pending");
        assert_eq!(json["role"], "enterprise_admin");
        assert_eq!(json["usdeBalance"].as_f64(), Some(5000.0));
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("argon2"));
    }
}
