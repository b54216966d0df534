//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI document,
//! served unauthenticated at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer JWT security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token from /api/auth/login or /api/auth/register.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI document for the whole API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "USDE Back Office API",
        version = "0.3.0",
        description = "Back office for the USDE stablecoin.\n\nProvides:\n- **Withdrawals** with atomic balance and daily/single limit enforcement and simulated bank payouts\n- **Deposits** with fee quotes, risk scoring and USDE minting\n- **Payments** between companies with time-locked balances\n- **Staking** with simple-interest earnings\n- **KYC**, bank accounts, enterprise users and treasury settings\n- **Administration** with a hash-chained audit log\n\nAuthentication: `Authorization: Bearer <token>`. Only register, login and this document are public.",
        license(name = "BUSL-1.1")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Auth ─────────────────────────────────────────────────────────
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::profile,
        // ── Withdrawals ──────────────────────────────────────────────────
        crate::routes::withdrawals::check_balance,
        crate::routes::withdrawals::check_limits,
        crate::routes::withdrawals::withdrawal_limits,
        crate::routes::withdrawals::create_withdrawal,
        crate::routes::withdrawals::withdrawal_history,
        crate::routes::withdrawals::process_withdrawal,
        crate::routes::withdrawals::withdrawal_stats,
        // ── Companies ────────────────────────────────────────────────────
        crate::routes::companies::current_company,
        crate::routes::companies::update_profile,
        crate::routes::companies::create_subsidiary,
        crate::routes::companies::list_subsidiaries,
        crate::routes::companies::consolidated_balance,
        // ── KYC ──────────────────────────────────────────────────────────
        crate::routes::kyc::submit,
        crate::routes::kyc::status,
        crate::routes::kyc::applications,
        crate::routes::kyc::review,
        // ── Bank accounts ────────────────────────────────────────────────
        crate::routes::bank_accounts::list_accounts,
        crate::routes::bank_accounts::add_account,
        crate::routes::bank_accounts::verify_account,
        crate::routes::bank_accounts::delete_account,
        crate::routes::bank_accounts::withdrawable_balance,
        // ── Deposits ─────────────────────────────────────────────────────
        crate::routes::deposits::create_deposit,
        crate::routes::deposits::complete_deposit,
        crate::routes::deposits::deposit_history,
        crate::routes::deposits::deposit_stats,
        // ── Payments ─────────────────────────────────────────────────────
        crate::routes::payments::create_payment,
        crate::routes::payments::payment_history,
        crate::routes::payments::locked_balances,
        crate::routes::payments::release_payment,
        // ── Stakes ───────────────────────────────────────────────────────
        crate::routes::stakes::create_stake,
        crate::routes::stakes::list_stakes,
        crate::routes::stakes::get_stake,
        crate::routes::stakes::stake_summary,
        crate::routes::dashboard::dashboard,
        crate::routes::dashboard::earnings_history,
        // ── Ledger ───────────────────────────────────────────────────────
        crate::routes::transactions::list_transactions,
        // ── Enterprise ───────────────────────────────────────────────────
        crate::routes::enterprise::list_users,
        crate::routes::enterprise::create_user,
        crate::routes::enterprise::update_user,
        crate::routes::enterprise::deactivate_user,
        crate::routes::enterprise::get_settings,
        crate::routes::enterprise::update_settings,
        crate::routes::enterprise::dashboard,
        crate::routes::enterprise::monthly_report,
        // ── Administration ───────────────────────────────────────────────
        crate::routes::admin::list_companies,
        crate::routes::admin::update_status,
        crate::routes::admin::pending_withdrawals,
        crate::routes::admin::platform_stats,
        crate::routes::admin::audit_logs,
        crate::routes::admin::verify_audit_chain,
        crate::routes::admin::release_locks,
        crate::routes::admin::sweep,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Records
        crate::state::Company,
        crate::state::Enterprise,
        crate::state::BankAccount,
        crate::state::LockedBalance,
        crate::state::Withdrawal,
        crate::state::LedgerEntry,
        crate::state::Deposit,
        crate::state::Payment,
        crate::state::Stake,
        crate::state::KycProfile,
        crate::state::Ubo,
        crate::state::KycReview,
        crate::state::AuditLog,
        crate::store::WithdrawalStats,
        crate::store::DepositStats,
        crate::store::PlatformStats,
        crate::middleware::metrics::MetricsSnapshot,
        // Auth
        crate::routes::auth::RegisterRequest,
        crate::routes::auth::LoginRequest,
        crate::routes::auth::AuthResponse,
        crate::routes::auth::ProfileResponse,
        // Withdrawals
        crate::routes::withdrawals::AmountRequest,
        crate::routes::withdrawals::CreateWithdrawalRequest,
        crate::routes::withdrawals::BalanceCheckResponse,
        crate::routes::withdrawals::LimitCheckResponse,
        crate::routes::withdrawals::WithdrawalCreatedResponse,
        crate::routes::withdrawals::TransferProcessedResponse,
        crate::routes::withdrawals::WithdrawalLimitsResponse,
        crate::services::withdrawal::TransferOutcome,
        crate::services::withdrawal::BankAccountSummary,
        crate::services::withdrawal::WithdrawalView,
        crate::services::withdrawal::WithdrawalHistory,
        // Companies
        crate::routes::companies::UpdateProfileRequest,
        crate::routes::companies::CreateSubsidiaryRequest,
        crate::routes::companies::CompanyResponse,
        crate::routes::companies::SubsidiariesResponse,
        crate::routes::companies::BalanceLine,
        crate::routes::companies::ConsolidatedBalance,
        // KYC
        crate::routes::kyc::UboInput,
        crate::routes::kyc::SubmitKycRequest,
        crate::routes::kyc::KycSubmittedResponse,
        crate::routes::kyc::KycStatusResponse,
        crate::routes::kyc::KycApplicationsResponse,
        crate::routes::kyc::ReviewKycRequest,
        crate::routes::kyc::KycReviewedResponse,
        // Bank accounts
        crate::routes::bank_accounts::AddBankAccountRequest,
        crate::routes::bank_accounts::BankAccountsResponse,
        crate::routes::bank_accounts::BankAccountResponse,
        crate::routes::bank_accounts::MessageResponse,
        crate::routes::bank_accounts::WithdrawableBalance,
        // Deposits
        crate::routes::deposits::CreateDepositRequest,
        crate::routes::deposits::RiskSummary,
        crate::routes::deposits::DepositCreatedResponse,
        crate::routes::deposits::DepositCompletedResponse,
        crate::routes::deposits::DepositHistory,
        // Payments
        crate::routes::payments::CreatePaymentRequest,
        crate::routes::payments::PaymentResponse,
        crate::routes::payments::PaymentHistory,
        crate::routes::payments::LockView,
        crate::routes::payments::LockedBalancesResponse,
        // Stakes
        crate::routes::stakes::CreateStakeRequest,
        crate::routes::stakes::StakeView,
        crate::routes::stakes::StakeResponse,
        crate::routes::stakes::StakeDetail,
        crate::routes::stakes::StakeList,
        crate::routes::stakes::StakeSummary,
        crate::routes::dashboard::Overview,
        crate::routes::dashboard::StakeTotals,
        crate::routes::dashboard::DashboardStatistics,
        crate::routes::dashboard::RecentActivities,
        crate::routes::dashboard::Dashboard,
        crate::routes::dashboard::PeriodSummary,
        crate::routes::dashboard::EarningsHistory,
        crate::state::Earning,
        crate::store::EarningsSummary,
        crate::store::PaymentSummary,
        // Ledger
        crate::routes::transactions::TransactionHistory,
        // Enterprise
        crate::routes::enterprise::CreateUserRequest,
        crate::routes::enterprise::UpdateUserRequest,
        crate::routes::enterprise::EnterpriseUsersResponse,
        crate::routes::enterprise::EnterpriseUserResponse,
        crate::routes::enterprise::SettingsResponse,
        crate::routes::enterprise::Spend,
        crate::routes::enterprise::EnterpriseDashboard,
        crate::routes::enterprise::ReportTransactions,
        crate::routes::enterprise::MonthlyReport,
        // Administration
        crate::routes::admin::CompanyList,
        crate::routes::admin::UpdateStatusRequest,
        crate::routes::admin::CompanyStatusResponse,
        crate::routes::admin::PendingWithdrawals,
        crate::routes::admin::AdminStats,
        crate::routes::admin::AuditLogPage,
        crate::routes::admin::ChainVerification,
        crate::routes::admin::LocksReleased,
        crate::services::sweeper::SweepReport,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and session profile"),
        (name = "withdrawals", description = "Balance and limit checks, withdrawal creation and bank payouts"),
        (name = "companies", description = "Company profile and parent/subsidiary hierarchy"),
        (name = "kyc", description = "KYC applications and reviewer decisions"),
        (name = "bank_accounts", description = "Payout destinations and their verification"),
        (name = "deposits", description = "Fiat deposits, fees, risk assessment and USDE minting"),
        (name = "payments", description = "Inter-company payments and locked balances"),
        (name = "stakes", description = "Staking and earnings"),
        (name = "dashboard", description = "Company overview and earnings history"),
        (name = "transactions", description = "Per-company ledger history"),
        (name = "enterprise", description = "Enterprise users, treasury settings, budgets and reports"),
        (name = "admin", description = "Platform administration and the audit log"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
