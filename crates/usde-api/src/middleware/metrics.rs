//! # Request Metrics
//!
//! In-process atomic counters, read by `GET /api/admin/stats`. One
//! [`ApiMetrics`] is built per [`AppState`](crate::state::AppState); clones
//! share the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Shared metrics state.
#[derive(Debug, Clone)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub withdrawals_created: Arc<AtomicU64>,
    pub withdrawals_succeeded: Arc<AtomicU64>,
    pub withdrawals_failed: Arc<AtomicU64>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub withdrawals_created: u64,
    pub withdrawals_succeeded: u64,
    pub withdrawals_failed: u64,
}

impl ApiMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            withdrawals_created: Arc::new(AtomicU64::new(0)),
            withdrawals_succeeded: Arc::new(AtomicU64::new(0)),
            withdrawals_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return current request count.
    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Return current error count.
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn record_withdrawal_created(&self) {
        self.withdrawals_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a settled payout by its final result.
    pub fn record_payout(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.withdrawals_succeeded
        } else {
            &self.withdrawals_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests(),
            errors: self.errors(),
            withdrawals_created: self.withdrawals_created.load(Ordering::Relaxed),
            withdrawals_succeeded: self.withdrawals_succeeded.load(Ordering::Relaxed),
            withdrawals_failed: self.withdrawals_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    state.metrics.request_count.fetch_add(1, Ordering::Relaxed);
    if response.status().is_server_error() || response.status().is_client_error() {
        state.metrics.error_count.fetch_add(1, Ordering::Relaxed);
    }

    response
}
