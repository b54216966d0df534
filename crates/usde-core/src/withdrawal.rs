//! # Withdrawal State Machine
//!
//! ```text
//! pending ──▶ processing ──▶ success
//!                       └──▶ failed
//! ```
//!
//! `success` and `failed` are terminal. A failed withdrawal is never
//! retried; the company creates a new one. Any transition not drawn above
//! is rejected with [`LedgerError::InvalidState`].

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Lifecycle status of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Created, tokens not yet burned.
    Pending,
    /// Tokens burned and balance debited; bank payout outstanding.
    Processing,
    /// Bank payout confirmed. Terminal.
    Success,
    /// Bank payout failed and the amount was refunded. Terminal.
    Failed,
}

wire_enum!(WithdrawalStatus, "withdrawal status", {
    Pending => "pending",
    Processing => "processing",
    Success => "success",
    Failed => "failed",
});

impl WithdrawalStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether the withdrawal still references its bank account.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Whether the amount counts toward today's daily limit.
    ///
    /// Failed withdrawals were refunded and do not count.
    pub fn counts_toward_daily_limit(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Validate a transition and return the new status.
    pub fn transition(self, to: Self) -> Result<Self, LedgerError> {
        let allowed = matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Failed)
        );
        if allowed {
            Ok(to)
        } else {
            Err(LedgerError::invalid_state(
                "withdrawal",
                self,
                format!("cannot move from {self} to {to}"),
            ))
        }
    }
}

/// What the bank reported for a payout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    /// Funds sent; carries the bank's payout reference.
    Paid {
        /// Bank payout reference.
        payout_id: String,
    },
    /// The bank refused the transfer.
    Rejected {
        /// Reason reported by the bank.
        reason: String,
    },
}

impl PayoutOutcome {
    /// Final withdrawal status for this outcome.
    pub fn final_status(&self) -> WithdrawalStatus {
        match self {
            Self::Paid { .. } => WithdrawalStatus::Success,
            Self::Rejected { .. } => WithdrawalStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let s = WithdrawalStatus::Pending
            .transition(WithdrawalStatus::Processing)
            .unwrap();
        assert_eq!(s.transition(WithdrawalStatus::Success).unwrap(), WithdrawalStatus::Success);
        assert_eq!(
            WithdrawalStatus::Processing
                .transition(WithdrawalStatus::Failed)
                .unwrap(),
            WithdrawalStatus::Failed
        );
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        for from in [WithdrawalStatus::Success, WithdrawalStatus::Failed] {
            assert!(from.is_terminal());
            for to in [
                WithdrawalStatus::Pending,
                WithdrawalStatus::Processing,
                WithdrawalStatus::Success,
                WithdrawalStatus::Failed,
            ] {
                assert!(from.transition(to).is_err(), "{from} -> {to} must fail");
            }
        }
    }

    #[test]
    fn pending_cannot_skip_processing() {
        let err = WithdrawalStatus::Pending
            .transition(WithdrawalStatus::Success)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));
    }

    #[test]
    fn failed_excluded_from_daily_limit() {
        assert!(WithdrawalStatus::Pending.counts_toward_daily_limit());
        assert!(WithdrawalStatus::Processing.counts_toward_daily_limit());
        assert!(WithdrawalStatus::Success.counts_toward_daily_limit());
        assert!(!WithdrawalStatus::Failed.counts_toward_daily_limit());
    }

    #[test]
    fn outcome_final_status() {
        let paid = PayoutOutcome::Paid {
            payout_id: "po_1".into(),
        };
        let rejected = PayoutOutcome::Rejected {
            reason: "bank down".into(),
        };
        assert_eq!(paid.final_status(), WithdrawalStatus::Success);
        assert_eq!(rejected.final_status(), WithdrawalStatus::Failed);
    }
}
