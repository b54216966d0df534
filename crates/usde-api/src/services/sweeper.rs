//! # Background Sweep
//!
//! One background task that periodically:
//!
//! 1. removes every balance lock whose `release_at` has passed and marks
//!    its payment released;
//! 2. marks pending deposits past their window `expired`;
//! 3. records the daily earnings each active stake is owed;
//! 4. completes stakes whose term has ended, crediting principal and
//!    interest.
//!
//! Every step is idempotent, so a missed or repeated tick only delays work.
//! Started by the binary after the store is ready and stopped before the
//! pool closes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::store::{LedgerStore, StoreError};

/// What one sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub locks_released: u64,
    pub deposits_expired: u64,
    pub earnings_accrued: u64,
    pub stakes_completed: u64,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Release every expired lock now. Returns the number released.
pub async fn release_expired(store: &dyn LedgerStore) -> Result<u64, StoreError> {
    let released = store.release_expired_locks(Utc::now()).await?;
    if released > 0 {
        tracing::info!(released, "expired balance locks released");
    }
    Ok(released)
}

/// Run every sweep step as of `now`.
pub async fn run_sweep(store: &dyn LedgerStore, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
    let report = SweepReport {
        locks_released: store.release_expired_locks(now).await?,
        deposits_expired: store.expire_deposits(now).await?,
        earnings_accrued: store.accrue_stake_earnings(now).await?,
        stakes_completed: store.complete_matured_stakes(now).await?,
    };
    if !report.is_empty() {
        tracing::info!(
            locks_released = report.locks_released,
            deposits_expired = report.deposits_expired,
            earnings_accrued = report.earnings_accrued,
            stakes_completed = report.stakes_completed,
            "sweep applied"
        );
    }
    Ok(report)
}

/// Handle to the running sweep task.
#[derive(Debug)]
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping every `interval`. The first sweep runs immediately.
    pub fn spawn(store: Arc<dyn LedgerStore>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = run_sweep(store.as_ref(), Utc::now()).await {
                            tracing::error!(error = %err, "sweep failed");
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            tracing::debug!("sweeper stopped");
        });
        tracing::info!(interval_secs = interval.as_secs(), "sweeper started");
        Self { shutdown, handle }
    }

    /// Signal the task and wait for it to finish its current sweep.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "sweeper task panicked");
        }
    }
}
