//! # Bank Payout Gateway
//!
//! [`PayoutGateway`] is the seam to the bank: it sends withdrawal payouts
//! and verifies newly added accounts. [`SimulatedBank`] stands in for a real
//! bank: it waits a fixed delay and succeeds with a configured probability.
//! A refused payout is an ordinary [`PayoutOutcome::Rejected`], never an
//! error.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use usde_core::PayoutOutcome;

use crate::config::PayoutConfig;
use crate::state::{BankAccount, Withdrawal};

/// Reason reported when the simulated bank refuses a payout.
pub const SIMULATED_FAILURE: &str = "Bank transfer failed - insufficient funds or invalid account";

/// Bank operations used by the API.
#[axum::async_trait]
pub trait PayoutGateway: Send + Sync {
    /// Send the withdrawal amount to its bank account.
    async fn payout(&self, withdrawal: &Withdrawal) -> PayoutOutcome;

    /// Confirm that the account exists and accepts USD transfers.
    async fn verify_account(&self, account: &BankAccount) -> bool;
}

/// Simulated bank with a fixed delay and success probability.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedBank {
    config: PayoutConfig,
}

impl SimulatedBank {
    pub fn new(config: PayoutConfig) -> Self {
        Self { config }
    }

    async fn succeeds(&self) -> bool {
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        rand::thread_rng().gen_bool(self.config.success_rate)
    }
}

#[axum::async_trait]
impl PayoutGateway for SimulatedBank {
    async fn payout(&self, withdrawal: &Withdrawal) -> PayoutOutcome {
        if self.succeeds().await {
            let payout_id = payout_reference();
            tracing::debug!(withdrawal_id = %withdrawal.id, %payout_id, "simulated payout sent");
            PayoutOutcome::Paid { payout_id }
        } else {
            tracing::debug!(withdrawal_id = %withdrawal.id, "simulated payout refused");
            PayoutOutcome::Rejected {
                reason: SIMULATED_FAILURE.to_string(),
            }
        }
    }

    async fn verify_account(&self, account: &BankAccount) -> bool {
        let verified = self.succeeds().await;
        tracing::debug!(bank_account_id = %account.id, verified, "simulated account verification");
        verified
    }
}

/// `po_<unix millis>_<8 random alphanumerics>`.
fn payout_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("po_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use usde_core::WithdrawalStatus;
    use uuid::Uuid;

    fn withdrawal() -> Withdrawal {
        Withdrawal {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            bank_account_id: Uuid::new_v4(),
            amount: Decimal::from(100),
            status: WithdrawalStatus::Processing,
            burn_tx_hash: None,
            payout_id: None,
            notes: None,
            timestamp: Utc::now(),
            payout_started_at: None,
            processed_at: None,
        }
    }

    fn bank(success_rate: f64) -> SimulatedBank {
        SimulatedBank::new(PayoutConfig {
            delay: Duration::ZERO,
            success_rate,
        })
    }

    #[tokio::test]
    async fn certain_success_pays_out() {
        match bank(1.0).payout(&withdrawal()).await {
            PayoutOutcome::Paid { payout_id } => {
                assert!(payout_id.starts_with("po_"));
                assert_eq!(payout_id.rsplit('_').next().map(str::len), Some(8));
            }
            other => panic!("expected payout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn certain_failure_is_rejection() {
        let outcome = bank(0.0).payout(&withdrawal()).await;
        assert_eq!(
            outcome,
            PayoutOutcome::Rejected {
                reason: SIMULATED_FAILURE.to_string()
            }
        );
    }
}
