//! # Inter-Company Payments and Locked Balances
//!
//! A payment debits the sender and credits the recipient immediately, but
//! the credited amount is locked on the recipient for 30, 90 or 180 days.
//! Locked funds count toward the recipient's balance and are excluded from
//! its available balance until released.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Permitted lock periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum LockPeriod {
    /// 30 days.
    Days30,
    /// 90 days.
    Days90,
    /// 180 days.
    Days180,
}

impl LockPeriod {
    /// Number of days.
    pub fn days(&self) -> u32 {
        match self {
            Self::Days30 => 30,
            Self::Days90 => 90,
            Self::Days180 => 180,
        }
    }

    /// Release time for a payment made at `from`.
    pub fn release_at(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::days(i64::from(self.days()))
    }
}

impl TryFrom<u32> for LockPeriod {
    type Error = LedgerError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            30 => Ok(Self::Days30),
            90 => Ok(Self::Days90),
            180 => Ok(Self::Days180),
            other => Err(LedgerError::Validation(format!(
                "lock days must be 30, 90, or 180 (got {other})"
            ))),
        }
    }
}

impl From<LockPeriod> for u32 {
    fn from(period: LockPeriod) -> Self {
        period.days()
    }
}

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Funds locked on the recipient.
    Pending,
    /// Lock released.
    Released,
}

wire_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Released => "released",
});

impl PaymentStatus {
    /// Check that a payment may be released at `now`.
    pub fn require_releasable(
        &self,
        release_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if *self == Self::Released {
            return Err(LedgerError::invalid_state(
                "payment",
                self,
                "payment already released",
            ));
        }
        if release_at > now {
            return Err(LedgerError::invalid_state(
                "payment",
                self,
                format!("lock period has not ended (releases at {})", release_at.to_rfc3339()),
            ));
        }
        Ok(())
    }
}

/// Whole days until `release_at`, rounded up; never negative.
pub fn days_remaining(release_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (release_at - now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + 86_399) / 86_400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_three_periods_allowed() {
        assert_eq!(LockPeriod::try_from(30).unwrap(), LockPeriod::Days30);
        assert_eq!(LockPeriod::try_from(180).unwrap().days(), 180);
        assert!(LockPeriod::try_from(60).is_err());
        assert!(LockPeriod::try_from(0).is_err());
    }

    #[test]
    fn deserializes_from_number() {
        let p: LockPeriod = serde_json::from_str("90").unwrap();
        assert_eq!(p, LockPeriod::Days90);
        assert!(serde_json::from_str::<LockPeriod>("45").is_err());
        assert_eq!(serde_json::to_string(&LockPeriod::Days30).unwrap(), "30");
    }

    #[test]
    fn release_respects_lock_end() {
        let now = Utc::now();
        let release_at = LockPeriod::Days30.release_at(now);
        assert!(PaymentStatus::Pending
            .require_releasable(release_at, now)
            .is_err());
        assert!(PaymentStatus::Pending
            .require_releasable(release_at, release_at)
            .is_ok());
        assert!(PaymentStatus::Released
            .require_releasable(now, now)
            .is_err());
    }

    #[test]
    fn days_remaining_rounds_up() {
        let now = Utc::now();
        assert_eq!(days_remaining(now + Duration::hours(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(2), now), 2);
        assert_eq!(days_remaining(now - Duration::days(2), now), 0);
    }
}
