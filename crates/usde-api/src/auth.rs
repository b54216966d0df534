//! # Authentication & Authorization Middleware
//!
//! HS256 session tokens with role-based access control (RBAC).
//!
//! ## Token Format
//!
//! ```text
//! Authorization: Bearer <jwt>
//! claims: { sub: company id, email, role, iat, exp }
//! ```
//!
//! Tokens are issued by `/api/auth/register` and `/api/auth/login` and live
//! for `JWT_TTL_SECS`. The middleware verifies the signature and expiry,
//! then reloads the company so a suspended account is locked out
//! immediately, whatever its token says.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] built from the
//! company row injected into the request extensions. Handlers extract it via
//! the `FromRequestParts` impl.

use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use usde_core::{CompanyKind, KycStatus, Permission, Role};
use uuid::Uuid;

use crate::config::JwtSecret;
use crate::error::{AppError, ErrorBody, ErrorDetail};
use crate::state::{AppState, Company};

// ── Errors ──────────────────────────────────────────────────────────────────

/// Authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("authorization header must use Bearer scheme")]
    InvalidScheme,
    #[error("invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("account not found")]
    UnknownAccount,
    #[error("account is {0}")]
    Inactive(usde_core::CompanyStatus),
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(_) | AuthError::Hashing(_) => Self::Internal(err.to_string()),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

// ── Tokens ──────────────────────────────────────────────────────────────────

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Company id.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secret.
///
/// Custom `Debug` never prints key material.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("keys", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenKeys {
    pub fn new(secret: &JwtSecret, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issue a session token for `company`.
    pub fn issue(&self, company: &Company) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: company.id,
            email: company.email.clone(),
            role: company.role,
            iat,
            exp: iat.saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}

// ── Passwords ───────────────────────────────────────────────────────────────

/// Hash a password with Argon2id and a random salt (PHC string).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Check `password` against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, loaded from its company row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub company_id: Uuid,
    pub email: String,
    pub role: Role,
    pub kind: CompanyKind,
    pub kyc_status: KycStatus,
    pub enterprise_id: Option<Uuid>,
}

impl CallerIdentity {
    pub fn from_company(company: &Company) -> Self {
        Self {
            company_id: company.id,
            email: company.email.clone(),
            role: company.role,
            kind: company.kind,
            kyc_status: company.kyc_status,
            enterprise_id: company.enterprise_id,
        }
    }

    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

/// Axum `FromRequestParts` implementation for `CallerIdentity`.
///
/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present (middleware didn't run or failed).
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Check that the caller's role grants `permission`.
pub fn require_permission(caller: &CallerIdentity, permission: Permission) -> Result<(), AppError> {
    if caller.role.grants(permission) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "permission '{}' required, caller has role '{}'",
            permission.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Verify the Bearer token, load the company and inject its
/// [`CallerIdentity`]. Missing, suspended or deleted accounts get 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&request) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(reason = %err, "authentication failed");
            return unauthorized_response(&err.to_string());
        }
    };

    let claims = match state.tokens.verify(token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(reason = %err, "authentication failed: token rejected");
            return unauthorized_response(&err.to_string());
        }
    };

    let company = match state.store.company(claims.sub).await {
        Ok(Some(company)) => company,
        Ok(None) => {
            tracing::warn!(company_id = %claims.sub, "authentication failed: unknown company");
            return unauthorized_response(&AuthError::UnknownAccount.to_string());
        }
        Err(err) => return AppError::from(err).into_response(),
    };

    if !company.status.can_authenticate() {
        tracing::warn!(company_id = %company.id, status = %company.status, "authentication failed: inactive company");
        return unauthorized_response(&AuthError::Inactive(company.status).to_string());
    }

    request
        .extensions_mut()
        .insert(CallerIdentity::from_company(&company));
    next.run(request).await
}

fn bearer_token(request: &Request) -> Result<&str, AuthError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;
    value.strip_prefix("Bearer ").ok_or(AuthError::InvalidScheme)
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
