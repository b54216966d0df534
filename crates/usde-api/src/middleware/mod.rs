//! # HTTP Middleware
//!
//! - [`metrics`]: request, error and withdrawal counters.
//! - [`rate_limit`]: fixed-window limiter keyed per caller.
//! - [`tracing_layer`]: per-request tracing spans.

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;
