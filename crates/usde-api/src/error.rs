//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Domain failures from `usde-core` keep their stable code and carry their
//! structured fields in `details`, so clients can read the daily limit or
//! available balance without parsing the message. Internal errors are logged
//! and replaced with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use usde_core::LedgerError;
use utoipa::ToSchema;

use crate::store::StoreError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "SINGLE_LIMIT_EXCEEDED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Structured fields of domain errors; absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many requests in the current window (429).
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// A domain rule rejected the operation. Status depends on the variant.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Ledger(err) => (ledger_status(err), err.code()),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Structured fields for domain errors.
    fn details(&self) -> Option<serde_json::Value> {
        let Self::Ledger(err) = self else {
            return None;
        };
        match err {
            LedgerError::InsufficientBalance {
                available,
                requested,
            } => Some(json!({ "availableBalance": available, "requestedAmount": requested })),
            LedgerError::KycRequired { status } => Some(json!({ "kycStatus": status })),
            LedgerError::DailyLimitExceeded {
                limit,
                used,
                requested,
            } => Some(json!({
                "dailyLimit": limit,
                "dailyUsed": used,
                "requestedAmount": requested,
            })),
            LedgerError::SingleLimitExceeded { limit, requested } => {
                Some(json!({ "singleLimit": limit, "requestedAmount": requested }))
            }
            LedgerError::NotFound { resource, id } => {
                Some(json!({ "resource": resource, "id": id }))
            }
            LedgerError::InvalidState {
                resource, state, ..
            } => Some(json!({ "resource": resource, "state": state })),
            LedgerError::Duplicate { resource, key } => {
                Some(json!({ "resource": resource, "key": key }))
            }
            LedgerError::RiskRejected { score } => Some(json!({ "riskScore": score })),
            LedgerError::BankAccountMissing
            | LedgerError::InvalidAmount { .. }
            | LedgerError::BankVerificationFailed
            | LedgerError::Validation(_) => None,
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InsufficientBalance { .. }
        | LedgerError::BankAccountMissing
        | LedgerError::DailyLimitExceeded { .. }
        | LedgerError::SingleLimitExceeded { .. }
        | LedgerError::BankVerificationFailed => StatusCode::BAD_REQUEST,
        LedgerError::KycRequired { .. } | LedgerError::RiskRejected { .. } => {
            StatusCode::FORBIDDEN
        }
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::InvalidState { .. } | LedgerError::Duplicate { .. } => StatusCode::CONFLICT,
        LedgerError::InvalidAmount { .. } | LedgerError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Ledger(e) => Self::Ledger(e),
            StoreError::Database(e) => Self::Internal(format!("database error: {e}")),
            StoreError::Corrupt(msg) => Self::Internal(format!("corrupt record: {msg}")),
        }
    }
}
