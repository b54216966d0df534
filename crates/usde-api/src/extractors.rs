//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers to extract and
//! validate JSON bodies, and the shared pagination query.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use usde_core::PageRequest;
use utoipa::IntoParams;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// `?page=&limit=` on list endpoints. Defaults page 1, limit 10; limit is
/// capped at 100.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest::new(q.page, q.limit)
    }
}

/// Length check on a trimmed string field.
pub(crate) fn min_len(field: &str, value: &str, min: usize) -> Result<(), String> {
    if value.trim().chars().count() < min {
        Err(format!("{field} must be at least {min} characters"))
    } else {
        Ok(())
    }
}

/// `value` must be strictly greater than zero.
pub(crate) fn positive(field: &str, value: Decimal) -> Result<(), String> {
    if value > Decimal::ZERO {
        Ok(())
    } else {
        Err(format!("{field} must be greater than 0"))
    }
}

/// Minimal shape check: one `@` with text on both sides and a dot in the
/// domain.
pub(crate) fn valid_email(value: &str) -> Result<(), String> {
    let ok = value
        .split_once('@')
        .map(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        })
        .unwrap_or(false);
    if ok && !value.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err("a valid email is required".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(valid_email("ops@acme.test").is_ok());
        assert!(valid_email("ops@acme").is_err());
        assert!(valid_email("@acme.test").is_err());
        assert!(valid_email("o ps@acme.test").is_err());
    }

    #[test]
    fn page_query_defaults_and_caps() {
        let page: PageRequest = PageQuery::default().into();
        assert_eq!((page.page, page.limit), (1, 10));
        let page: PageRequest = PageQuery {
            page: Some(0),
            limit: Some(500),
        }
        .into();
        assert_eq!((page.page, page.limit), (1, 100));
    }

    #[test]
    fn positive_rejects_zero() {
        assert!(positive("amount", Decimal::ZERO).is_err());
        assert!(positive("amount", Decimal::new(1, 2)).is_ok());
    }

    #[test]
    fn min_len_trims() {
        assert!(min_len("name", " a ", 2).is_err());
        assert!(min_len("name", "ab", 2).is_ok());
    }
}
