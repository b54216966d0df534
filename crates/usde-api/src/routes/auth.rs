//! # Registration and Sessions
//!
//! Routes:
//! - POST   /api/auth/register — create an enterprise admin account (public)
//! - POST   /api/auth/login — exchange credentials for a token (public)
//! - GET    /api/auth/profile — the caller's company and permissions

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use usde_core::{CompanyKind, KycStatus, Role};
use utoipa::ToSchema;

use crate::auth::{hash_password, verify_password, AuthError, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, min_len, valid_email, Validate};
use crate::state::{AppState, Company};
use crate::store::NewCompany;

/// Lowercased, trimmed e-mail used as the unique login key.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Enterprise name; defaults to `name`.
    pub company_name: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), String> {
        min_len("name", &self.name, 2)?;
        valid_email(self.email.trim())?;
        if self.password.chars().count() < 6 {
            return Err("password must be at least 6 characters".into());
        }
        if let Some(company_name) = &self.company_name {
            min_len("companyName", company_name, 2)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        valid_email(self.email.trim())?;
        if self.password.is_empty() {
            return Err("password is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub company: Company,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub company: Company,
    /// Permission names granted by the caller's role.
    pub permissions: Vec<String>,
}

/// Routes reachable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

/// Routes behind the auth middleware.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/auth/profile", get(profile))
}

/// POST /api/auth/register — Create an enterprise admin and its enterprise.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 409, description = "E-mail already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "auth"
)]
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let name = req.name.trim().to_string();
    let enterprise_name = req
        .company_name
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| name.clone());

    let new = NewCompany {
        name,
        email: normalize_email(&req.email),
        password_hash: hash_password(&req.password)?,
        kind: CompanyKind::Enterprise,
        role: Role::EnterpriseAdmin,
        kyc_status: KycStatus::Pending,
        parent_company_id: None,
        enterprise_id: None,
        company_code: None,
        company_address: None,
    };
    let (company, enterprise) = state.store.register_enterprise(new, enterprise_name).await?;
    let token = state.tokens.issue(&company)?;
    tracing::info!(company_id = %company.id, enterprise_id = %enterprise.id, "company registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "Company registered successfully".into(),
            token,
            company,
        }),
    ))
}

/// POST /api/auth/login — Verify credentials and issue a token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
    ),
    security(()),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let company = state
        .store
        .company_by_email(&normalize_email(&req.email))
        .await?
        .filter(|c| verify_password(&req.password, &c.password_hash))
        .ok_or_else(|| AppError::Unauthorized("invalid credentials".into()))?;

    if !company.status.can_authenticate() {
        return Err(AuthError::Inactive(company.status).into());
    }

    let token = state.tokens.issue(&company)?;
    tracing::info!(company_id = %company.id, "login succeeded");
    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        token,
        company,
    }))
}

/// GET /api/auth/profile — The caller's company.
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Caller profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ProfileResponse>, AppError> {
    let company = state
        .store
        .company(caller.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("company {} not found", caller.company_id)))?;
    let permissions = company
        .role
        .permissions()
        .into_iter()
        .map(|p| p.as_str().to_string())
        .collect();
    Ok(Json(ProfileResponse {
        company,
        permissions,
    }))
}
