//! Company classification and account status.

use serde::{Deserialize, Serialize};

/// Where a company sits in the enterprise hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyKind {
    /// Root account created at registration; owns an enterprise record.
    Enterprise,
    /// Stand-alone company.
    Company,
    /// Created under a parent company.
    Subsidiary,
}

wire_enum!(CompanyKind, "company kind", {
    Enterprise => "enterprise",
    Company => "company",
    Subsidiary => "subsidiary",
});

/// Whether the account may authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    /// Normal operation.
    Active,
    /// Blocked by an administrator or deactivated by its enterprise admin.
    Suspended,
}

wire_enum!(CompanyStatus, "company status", {
    Active => "active",
    Suspended => "suspended",
});

impl CompanyStatus {
    /// Only active companies pass the auth middleware.
    pub fn can_authenticate(&self) -> bool {
        matches!(self, Self::Active)
    }
}
