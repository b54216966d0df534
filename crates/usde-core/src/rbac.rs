//! # Roles and Permissions
//!
//! Roles are ordered by privilege; the `Ord` derivation follows declaration
//! order, so `FinanceOperator < FinanceManager < EnterpriseAdmin <
//! SystemAdmin` and a minimum-role check is a single comparison.
//!
//! Each role maps statically to a set of [`Permission`]s. Higher roles hold
//! every permission of the roles below them.

use serde::{Deserialize, Serialize};

/// Caller role, persisted on the company row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Day-to-day treasury operations on its own company.
    #[serde(rename = "enterprise_finance_operator")]
    FinanceOperator,
    /// Operator rights plus reporting and approvals.
    #[serde(rename = "enterprise_finance_manager")]
    FinanceManager,
    /// Manages its enterprise: users, subsidiaries, treasury settings.
    #[serde(rename = "enterprise_admin")]
    EnterpriseAdmin,
    /// Platform operator: KYC review, company status, audit log.
    #[serde(rename = "system_admin")]
    SystemAdmin,
}

wire_enum!(Role, "role", {
    FinanceOperator => "enterprise_finance_operator",
    FinanceManager => "enterprise_finance_manager",
    EnterpriseAdmin => "enterprise_admin",
    SystemAdmin => "system_admin",
});

/// A single capability checked by route handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read own ledger, deposits, withdrawals, payments and stakes.
    ViewTransactions,
    /// Deposit, withdraw, pay, stake and manage bank accounts.
    FinancialOperations,
    /// Read consolidated parent/subsidiary balances.
    ConsolidatedReporting,
    /// Approve payments above the enterprise threshold.
    ApprovePayments,
    /// Create and list subsidiaries.
    ManageSubsidiaries,
    /// Create, update and deactivate enterprise users.
    ManageEnterpriseUsers,
    /// Read and change treasury settings.
    ApprovalWorkflows,
    /// Review KYC applications.
    ReviewKyc,
    /// List companies and change their status.
    ManageAllCompanies,
    /// Read and verify the audit log.
    AuditLogs,
}

wire_enum!(Permission, "permission", {
    ViewTransactions => "view_transactions",
    FinancialOperations => "financial_operations",
    ConsolidatedReporting => "consolidated_reporting",
    ApprovePayments => "approve_payments",
    ManageSubsidiaries => "manage_subsidiaries",
    ManageEnterpriseUsers => "manage_enterprise_users",
    ApprovalWorkflows => "approval_workflows",
    ReviewKyc => "review_kyc",
    ManageAllCompanies => "manage_all_companies",
    AuditLogs => "audit_logs",
});

impl Permission {
    /// The lowest role that holds this permission.
    pub fn minimum_role(&self) -> Role {
        match self {
            Self::ViewTransactions | Self::FinancialOperations => Role::FinanceOperator,
            Self::ConsolidatedReporting | Self::ApprovePayments => Role::FinanceManager,
            Self::ManageSubsidiaries | Self::ManageEnterpriseUsers | Self::ApprovalWorkflows => {
                Role::EnterpriseAdmin
            }
            Self::ReviewKyc | Self::ManageAllCompanies | Self::AuditLogs => Role::SystemAdmin,
        }
    }
}

impl Role {
    /// Every permission, in declaration order.
    pub const ALL_PERMISSIONS: [Permission; 10] = [
        Permission::ViewTransactions,
        Permission::FinancialOperations,
        Permission::ConsolidatedReporting,
        Permission::ApprovePayments,
        Permission::ManageSubsidiaries,
        Permission::ManageEnterpriseUsers,
        Permission::ApprovalWorkflows,
        Permission::ReviewKyc,
        Permission::ManageAllCompanies,
        Permission::AuditLogs,
    ];

    /// Whether this role holds `permission`.
    pub fn grants(&self, permission: Permission) -> bool {
        *self >= permission.minimum_role()
    }

    /// All permissions held by this role.
    pub fn permissions(&self) -> Vec<Permission> {
        Self::ALL_PERMISSIONS
            .into_iter()
            .filter(|p| self.grants(*p))
            .collect()
    }

    /// Roles an enterprise admin may assign to its users.
    pub fn is_enterprise_assignable(&self) -> bool {
        matches!(self, Self::FinanceOperator | Self::FinanceManager)
    }
}
