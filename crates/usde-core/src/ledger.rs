//! # Ledger Postings
//!
//! Every change to a company's USDE balance is recorded as an append-only
//! ledger entry carrying the balance before and after. [`BalanceChange`] is
//! the only way to compute those two numbers, and a debit that would leave
//! the balance negative is refused here, before any store writes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Tokens minted for a completed deposit.
    Mint,
    /// Tokens burned for a withdrawal.
    Withdraw,
    /// Failed withdrawal credited back.
    Refund,
    /// Outgoing inter-company payment.
    PaymentSent,
    /// Incoming inter-company payment.
    PaymentReceived,
    /// Tokens moved into a stake.
    Stake,
    /// Principal returned from a matured stake.
    Unstake,
    /// Interest paid out by a matured stake.
    Interest,
}

wire_enum!(TransactionKind, "transaction kind", {
    Mint => "mint",
    Withdraw => "withdraw",
    Refund => "refund",
    PaymentSent => "payment_sent",
    PaymentReceived => "payment_received",
    Stake => "stake",
    Unstake => "unstake",
    Interest => "interest",
});

impl TransactionKind {
    /// Whether this kind reduces the balance.
    pub fn is_debit(&self) -> bool {
        matches!(self, Self::Withdraw | Self::PaymentSent | Self::Stake)
    }
}

/// Before/after pair for one posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    /// Balance before the posting.
    pub before: Decimal,
    /// Balance after the posting.
    pub after: Decimal,
}

impl BalanceChange {
    /// Subtract `amount` from `balance`.
    ///
    /// `available` is the spendable part of `balance` (locks excluded); the
    /// debit must fit inside it.
    pub fn debit(
        balance: Decimal,
        available: Decimal,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        require_positive(amount)?;
        if available < amount || balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        Ok(Self {
            before: balance,
            after: balance - amount,
        })
    }

    /// Add `amount` to `balance`.
    pub fn credit(balance: Decimal, amount: Decimal) -> Result<Self, LedgerError> {
        require_positive(amount)?;
        Ok(Self {
            before: balance,
            after: balance + amount,
        })
    }

    /// Signed difference, negative for debits.
    pub fn delta(&self) -> Decimal {
        self.after - self.before
    }
}

/// Fail with [`LedgerError::InvalidAmount`] unless `amount > 0`.
pub fn require_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            reason: format!("amount must be greater than zero, got {amount}"),
        });
    }
    Ok(())
}
