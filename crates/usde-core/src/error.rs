//! # Ledger Errors
//!
//! The closed set of domain failures. Each variant carries the values that
//! caused it so the API layer can return them as structured details instead
//! of parsing messages.

use rust_decimal::Decimal;
use thiserror::Error;

/// A domain rule rejected an operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The available balance (total minus locked) does not cover the amount.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance available for spending.
        available: Decimal,
        /// Amount the caller asked for.
        requested: Decimal,
    },

    /// The company's KYC application is not approved.
    #[error("KYC approval required (current status: {status})")]
    KycRequired {
        /// Current KYC status wire name.
        status: String,
    },

    /// No verified bank account is available for the withdrawal.
    #[error("a verified bank account is required")]
    BankAccountMissing,

    /// Today's withdrawals plus this one exceed the daily limit.
    #[error("daily withdrawal limit exceeded: limit {limit}, used {used}, requested {requested}")]
    DailyLimitExceeded {
        /// Process-wide daily limit.
        limit: Decimal,
        /// Sum of today's pending, processing and successful withdrawals.
        used: Decimal,
        /// Amount the caller asked for.
        requested: Decimal,
    },

    /// The amount exceeds the per-withdrawal limit.
    #[error("single withdrawal limit exceeded: limit {limit}, requested {requested}")]
    SingleLimitExceeded {
        /// Process-wide single withdrawal limit.
        limit: Decimal,
        /// Amount the caller asked for.
        requested: Decimal,
    },

    /// A referenced record does not exist (or is not visible to the caller).
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record, e.g. `"withdrawal"`.
        resource: &'static str,
        /// Identifier as given by the caller.
        id: String,
    },

    /// The record exists but is not in a state that allows the operation.
    #[error("{resource} is {state}: {reason}")]
    InvalidState {
        /// Kind of record.
        resource: &'static str,
        /// Current state wire name.
        state: String,
        /// Why the operation is not allowed.
        reason: String,
    },

    /// A unique key is already taken.
    #[error("{resource} already exists: {key}")]
    Duplicate {
        /// Kind of record.
        resource: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// An amount is zero, negative or outside its allowed range.
    #[error("invalid amount: {reason}")]
    InvalidAmount {
        /// What is wrong with the amount.
        reason: String,
    },

    /// The deposit risk assessment rejected the request.
    #[error("deposit rejected by risk assessment (score {score})")]
    RiskRejected {
        /// Accumulated risk score.
        score: u32,
    },

    /// The bank did not confirm the account.
    #[error("bank account verification failed")]
    BankVerificationFailed,

    /// Input failed a domain validation rule.
    #[error("{0}")]
    Validation(String),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`].
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`LedgerError::InvalidState`].
    pub fn invalid_state(
        resource: &'static str,
        state: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            resource,
            state: state.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::KycRequired { .. } => "KYC_REQUIRED",
            Self::BankAccountMissing => "BANK_ACCOUNT_MISSING",
            Self::DailyLimitExceeded { .. } => "DAILY_LIMIT_EXCEEDED",
            Self::SingleLimitExceeded { .. } => "SINGLE_LIMIT_EXCEEDED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Duplicate { .. } => "CONFLICT",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::RiskRejected { .. } => "RISK_REJECTED",
            Self::BankVerificationFailed => "BANK_VERIFICATION_FAILED",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}
