//! # Startup Bootstrap
//!
//! 1. **Select the store**: PostgreSQL when `DATABASE_URL` is set (the pool
//!    is connected and migrated), the in-memory store otherwise.
//! 2. **Wire services** into [`AppState`].
//! 3. **Seed the system administrator** named by `BOOTSTRAP_ADMIN_EMAIL`
//!    when no company holds that e-mail yet.

use std::sync::Arc;

use sqlx::PgPool;
use usde_core::{CompanyKind, KycStatus, Role};

use crate::auth::{hash_password, AuthError};
use crate::config::{AppConfig, BootstrapAdmin};
use crate::routes::auth::normalize_email;
use crate::state::{AppState, Company};
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::{LedgerStore, NewCompany, StoreError};

/// Errors during startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The database could not be reached or migrated.
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Seeding the administrator failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The administrator password could not be hashed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Application state plus the pool to close on shutdown.
#[derive(Debug)]
pub struct Bootstrapped {
    pub state: AppState,
    pub pool: Option<PgPool>,
}

/// Run the startup sequence for `config`.
pub async fn bootstrap(config: AppConfig) -> Result<Bootstrapped, BootstrapError> {
    let (store, pool): (Arc<dyn LedgerStore>, Option<PgPool>) = match &config.database_url {
        Some(url) => {
            let pool = crate::db::init_pool(url).await?;
            (Arc::new(PgStore::new(pool.clone())), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let admin = config.bootstrap_admin.clone();
    let state = AppState::new(config, store);
    if let Some(admin) = admin {
        ensure_system_admin(state.store.as_ref(), &admin).await?;
    }
    Ok(Bootstrapped { state, pool })
}

/// Create the system administrator unless its e-mail is already registered.
/// Returns the created company.
pub async fn ensure_system_admin(
    store: &dyn LedgerStore,
    admin: &BootstrapAdmin,
) -> Result<Option<Company>, BootstrapError> {
    let email = normalize_email(&admin.email);
    if let Some(existing) = store.company_by_email(&email).await? {
        if existing.role != Role::SystemAdmin {
            tracing::warn!(company_id = %existing.id, "bootstrap admin e-mail belongs to a non-admin company");
        }
        return Ok(None);
    }

    let company = store
        .insert_company(NewCompany {
            name: "System Administrator".into(),
            email,
            password_hash: hash_password(&admin.password)?,
            kind: CompanyKind::Company,
            role: Role::SystemAdmin,
            kyc_status: KycStatus::Approved,
            parent_company_id: None,
            enterprise_id: None,
            company_code: None,
            company_address: None,
        })
        .await?;
    tracing::info!(company_id = %company.id, "system administrator created");
    Ok(Some(company))
}
