//! # Rate Limiting
//!
//! Fixed-window limiter keyed by an arbitrary string. Deposits use one
//! window per company: five requests per fifteen minutes. The limiter is
//! in-process; each replica counts on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Deposit creation: 5 requests per 15 minutes.
    pub fn deposits() -> Self {
        Self {
            max_requests: 5,
            window_secs: 15 * 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window_secs: 60,
        }
    }
}

/// Per-key rate limit state.
#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request for `key`. Returns `false` once the window is full.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        let window = Duration::from_secs(self.config.window_secs);

        // Expired windows would reset on next use anyway.
        buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < window);

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }

    /// Window length, for the `Retry-After` hint.
    pub fn window_secs(&self) -> u64 {
        self.config.window_secs
    }

    /// Number of keys with an open window.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Applies the deposit limiter to `POST /api/deposits`, keyed by the
/// caller's company. Runs inside the auth middleware.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::POST && request.uri().path() == "/api/deposits" {
        if let Some(caller) = request.extensions().get::<CallerIdentity>() {
            if !state.deposit_limiter.check(&caller.company_id.to_string()) {
                tracing::warn!(company_id = %caller.company_id, "deposit rate limit exceeded");
                return AppError::RateLimited(format!(
                    "too many deposit requests, retry in {} seconds",
                    state.deposit_limiter.window_secs()
                ))
                .into_response();
            }
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_requests() {
        let limiter = RateLimiter::new(RateLimitConfig::deposits());
        for _ in 0..5 {
            assert!(limiter.check("company-a"));
        }
        assert!(!limiter.check("company-a"));
        assert!(limiter.check("company-b"), "keys are independent");
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_secs: 60,
        });
        let start = Instant::now();
        assert!(limiter.check_at("k", start));
        assert!(!limiter.check_at("k", start + Duration::from_secs(59)));
        assert!(limiter.check_at("k", start + Duration::from_secs(60)));
    }

    #[test]
    fn stale_windows_are_dropped() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 5,
            window_secs: 60,
        });
        let start = Instant::now();
        for i in 0..100 {
            assert!(limiter.check_at(&format!("company-{i}"), start));
        }
        assert_eq!(limiter.tracked_keys(), 100);

        assert!(limiter.check_at("latecomer", start + Duration::from_secs(61)));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
