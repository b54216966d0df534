//! # KYC Lifecycle
//!
//! ```text
//! not_submitted ──submit──▶ pending ──review──▶ approved
//!                              ▲        ├────▶ rejected
//!                              │        └────▶ request_info
//!                              └──resubmit───────┘
//! ```
//!
//! Only `approved` companies may withdraw, add bank accounts or send
//! payments. Resubmission is allowed from every state except `approved`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// KYC status of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    /// No application yet.
    NotSubmitted,
    /// Awaiting review.
    Pending,
    /// Reviewed and approved.
    Approved,
    /// Reviewed and rejected.
    Rejected,
    /// Reviewer asked for more information.
    RequestInfo,
}

wire_enum!(KycStatus, "KYC status", {
    NotSubmitted => "not_submitted",
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    RequestInfo => "request_info",
});

impl KycStatus {
    /// Whether the company may perform money-moving operations.
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Fail with [`LedgerError::KycRequired`] unless approved.
    pub fn require_approved(&self) -> Result<(), LedgerError> {
        if self.is_approved() {
            Ok(())
        } else {
            Err(LedgerError::KycRequired {
                status: self.as_str().to_string(),
            })
        }
    }

    /// Whether a new application may be submitted from this status.
    pub fn accepts_submission(&self) -> bool {
        !matches!(self, Self::Approved)
    }
}

/// A reviewer's decision on a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycDecision {
    /// Approve the application.
    Approved,
    /// Reject the application.
    Rejected,
    /// Ask the company for more information.
    RequestInfo,
}

wire_enum!(KycDecision, "KYC decision", {
    Approved => "approved",
    Rejected => "rejected",
    RequestInfo => "request_info",
});

impl KycDecision {
    /// Status the company moves to after this decision.
    pub fn resulting_status(&self) -> KycStatus {
        match self {
            Self::Approved => KycStatus::Approved,
            Self::Rejected => KycStatus::Rejected,
            Self::RequestInfo => KycStatus::RequestInfo,
        }
    }
}

/// Check the ownership percentages of an application's beneficial owners.
///
/// At least one owner is required, each share must be within `0..=100`,
/// and the shares may not sum to more than 100.
pub fn validate_ownership(shares: &[Decimal]) -> Result<(), LedgerError> {
    if shares.is_empty() {
        return Err(LedgerError::Validation(
            "at least one beneficial owner is required".into(),
        ));
    }
    let hundred = Decimal::from(100);
    for (i, share) in shares.iter().enumerate() {
        if share.is_sign_negative() || *share > hundred {
            return Err(LedgerError::Validation(format!(
                "owner {i}: ownership percentage must be between 0 and 100"
            )));
        }
    }
    let total: Decimal = shares.iter().copied().sum();
    if total > hundred {
        return Err(LedgerError::Validation(format!(
            "total ownership percentage is {total}, cannot exceed 100"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_approved_passes() {
        assert!(KycStatus::Approved.require_approved().is_ok());
        for status in [
            KycStatus::NotSubmitted,
            KycStatus::Pending,
            KycStatus::Rejected,
            KycStatus::RequestInfo,
        ] {
            match status.require_approved() {
                Err(LedgerError::KycRequired { status: s }) => assert_eq!(s, status.as_str()),
                other => panic!("expected KycRequired, got {other:?}"),
            }
        }
    }

    #[test]
    fn approved_company_cannot_resubmit() {
        assert!(!KycStatus::Approved.accepts_submission());
        assert!(KycStatus::Rejected.accepts_submission());
        assert!(KycStatus::RequestInfo.accepts_submission());
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(KycDecision::Approved.resulting_status(), KycStatus::Approved);
        assert_eq!(
            KycDecision::RequestInfo.resulting_status(),
            KycStatus::RequestInfo
        );
    }

    #[test]
    fn ownership_over_one_hundred_rejected() {
        let shares = [Decimal::from(60), Decimal::from(50)];
        assert!(validate_ownership(&shares).is_err());
    }

    #[test]
    fn ownership_exactly_one_hundred_accepted() {
        let shares = [Decimal::from(60), Decimal::from(40)];
        assert!(validate_ownership(&shares).is_ok());
    }

    #[test]
    fn empty_owner_list_rejected() {
        assert!(validate_ownership(&[]).is_err());
    }

    #[test]
    fn negative_share_rejected() {
        assert!(validate_ownership(&[Decimal::from(-1)]).is_err());
    }
}
