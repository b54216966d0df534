//! Treasury settings for an enterprise.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// How many approvers a payment above the threshold needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalWorkflow {
    /// One approver.
    Single,
    /// Two approvers.
    Dual,
    /// Committee vote.
    Committee,
}

wire_enum!(ApprovalWorkflow, "approval workflow", {
    Single => "single",
    Dual => "dual",
    Committee => "committee",
});

/// Budgets and thresholds an enterprise admin configures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasurySettings {
    /// Monthly spending budget.
    pub monthly_budget: Decimal,
    /// Quarterly spending budget.
    pub quarterly_budget: Decimal,
    /// Payments above this amount need approval.
    pub approval_threshold: Decimal,
    /// Whether payments under the threshold are approved automatically.
    pub auto_approval_enabled: bool,
    /// Payments above this amount are flagged for risk review.
    pub risk_flag_threshold: Decimal,
    /// Approval workflow for payments above the threshold.
    pub approval_workflow: ApprovalWorkflow,
}

impl Default for TreasurySettings {
    fn default() -> Self {
        Self {
            monthly_budget: Decimal::from(1_000_000),
            quarterly_budget: Decimal::from(3_000_000),
            approval_threshold: Decimal::from(50_000),
            auto_approval_enabled: false,
            risk_flag_threshold: Decimal::from(100_000),
            approval_workflow: ApprovalWorkflow::Single,
        }
    }
}

impl TreasurySettings {
    /// All amounts must be non-negative and the monthly budget may not
    /// exceed the quarterly one.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let amounts = [
            ("monthlyBudget", self.monthly_budget),
            ("quarterlyBudget", self.quarterly_budget),
            ("approvalThreshold", self.approval_threshold),
            ("riskFlagThreshold", self.risk_flag_threshold),
        ];
        for (name, value) in amounts {
            if value.is_sign_negative() {
                return Err(LedgerError::Validation(format!("{name} must not be negative")));
            }
        }
        if self.monthly_budget > self.quarterly_budget {
            return Err(LedgerError::Validation(
                "monthlyBudget cannot exceed quarterlyBudget".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TreasurySettings::default().validate().is_ok());
    }

    #[test]
    fn negative_threshold_rejected() {
        let settings = TreasurySettings {
            approval_threshold: Decimal::from(-5),
            ..TreasurySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn monthly_above_quarterly_rejected() {
        let settings = TreasurySettings {
            monthly_budget: Decimal::from(10),
            quarterly_budget: Decimal::from(5),
            ..TreasurySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn workflow_json_names() {
        let json = serde_json::to_value(TreasurySettings::default()).unwrap();
        assert_eq!(json["approvalWorkflow"], "single");
        assert_eq!(json["autoApprovalEnabled"], false);
    }
}
