#![deny(missing_docs)]

//! # usde-core — Domain Rules for the USDE Back Office
//!
//! Pure domain logic with no I/O. Every crate that moves money depends on
//! this one, so the rules that decide whether a balance mutation is allowed
//! live here exactly once:
//!
//! - [`limits`]: available balance and withdrawal limit evaluation.
//! - [`withdrawal`]: the withdrawal state machine.
//! - [`ledger`]: balance postings that can never leave a negative balance.
//! - [`deposit`], [`payment`], [`stake`]: fee, risk, lock and earnings rules.
//! - [`kyc`], [`rbac`], [`company`], [`enterprise`]: account model.
//! - [`treasury`]: reporting periods and budget usage.
//! - [`audit`]: SHA-256 hash chain for the admin audit log.
//!
//! Storage backends gather the inputs (balances, locks, today's withdrawals)
//! under their own locking discipline and hand them to these functions, so
//! the in-memory and PostgreSQL stores cannot disagree on a decision.
//!
//! All errors are variants of [`LedgerError`]: a closed set with structured
//! fields, no `Box<dyn Error>`, no `.unwrap()` outside tests.

/// Implements `as_str`, `Display` and `FromStr` for a closed enum from its
/// wire names, so JSON, SQL columns and log fields all agree.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire name used in JSON bodies and database columns.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err($crate::unknown_variant($kind, other)),
                }
            }
        }
    };
}

pub mod audit;
pub mod company;
pub mod deposit;
pub mod enterprise;
pub mod error;
pub mod kyc;
pub mod ledger;
pub mod limits;
pub mod pagination;
pub mod payment;
pub mod rbac;
pub mod stake;
pub mod treasury;
pub mod withdrawal;

pub use company::{CompanyKind, CompanyStatus};
pub use deposit::{DepositQuote, DepositStatus, RiskAssessment, RiskDecision};
pub use enterprise::{ApprovalWorkflow, TreasurySettings};
pub use error::LedgerError;
pub use kyc::{KycDecision, KycStatus};
pub use ledger::{BalanceChange, TransactionKind};
pub use limits::{BalanceCheck, LimitCheck, WithdrawalContext, WithdrawalLimits};
pub use pagination::{PageRequest, Pagination};
pub use payment::{LockPeriod, PaymentStatus};
pub use rbac::{Permission, Role};
pub use stake::{EarningsPeriod, StakeStatus, StakeTerms};
pub use treasury::BudgetUsage;
pub use withdrawal::{PayoutOutcome, WithdrawalStatus};

/// Parse a lowercase wire name into one of the closed enums in this crate.
///
/// Shared by the `FromStr` impls so that every enum reports unknown values
/// with the same [`LedgerError::Validation`] shape.
pub(crate) fn unknown_variant(kind: &str, value: &str) -> LedgerError {
    LedgerError::Validation(format!("unknown {kind}: '{value}'"))
}
