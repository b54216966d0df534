//! # usde-api — Axum API Service for the USDE Back Office
//!
//! HTTP surface over the rules in `usde-core`. Handlers validate the
//! request, check the caller's permission and hand the mutation to a
//! [`LedgerStore`](store::LedgerStore) operation that applies it atomically.
//!
//! ## API Surface
//!
//! | Prefix                   | Module                     | Domain                  |
//! |--------------------------|----------------------------|-------------------------|
//! | `/api/auth/*`            | [`routes::auth`]           | Registration, sessions  |
//! | `/api/withdrawals/*`     | [`routes::withdrawals`]    | Withdrawals and limits  |
//! | `/api/companies/*`       | [`routes::companies`]      | Profile, subsidiaries   |
//! | `/api/kyc/*`             | [`routes::kyc`]            | KYC applications        |
//! | `/api/bank-accounts/*`   | [`routes::bank_accounts`]  | Payout destinations     |
//! | `/api/deposits/*`        | [`routes::deposits`]       | Deposits and minting    |
//! | `/api/payments/*`        | [`routes::payments`]       | Payments and locks      |
//! | `/api/stakes/*`          | [`routes::stakes`]         | Staking                 |
//! | `/api/transactions`      | [`routes::transactions`]   | Ledger history          |
//! | `/api/enterprise/*`      | [`routes::enterprise`]     | Users, treasury         |
//! | `/api/admin/*`           | [`routes::admin`], [`routes::kyc`] | Administration  |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! Register, login and `/openapi.json` skip the auth and rate-limit layers.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::Router;

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    // Auth runs before rate limiting so the limiter can key on the caller.
    let protected = Router::new()
        .merge(routes::auth::router())
        .merge(routes::withdrawals::router())
        .merge(routes::companies::router())
        .merge(routes::kyc::router())
        .merge(routes::bank_accounts::router())
        .merge(routes::deposits::router())
        .merge(routes::payments::router())
        .merge(routes::stakes::router())
        .merge(routes::dashboard::router())
        .merge(routes::transactions::router())
        .merge(routes::enterprise::router())
        .merge(routes::admin::router())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), auth::auth_middleware));

    let public = Router::new()
        .merge(routes::auth::public_router())
        .merge(openapi::router());

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::metrics::metrics_middleware,
        ))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}
