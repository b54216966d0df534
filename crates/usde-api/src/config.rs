//! # Service Configuration
//!
//! Loaded once at startup from environment variables and injected into
//! [`AppState`](crate::state::AppState). Nothing reads the environment
//! after startup.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `8080` |
//! | `APP_ENV` | `development` |
//! | `DATABASE_URL` | unset (in-memory store) |
//! | `JWT_SECRET` | random per process in development, required in production |
//! | `JWT_TTL_SECS` | `86400` |
//! | `WITHDRAWAL_DAILY_LIMIT` | `10000` |
//! | `WITHDRAWAL_SINGLE_LIMIT` | `5000` |
//! | `PAYOUT_DELAY_MS` | `1000` |
//! | `PAYOUT_SUCCESS_RATE` | `0.9` |
//! | `SWEEP_INTERVAL_SECS` | `3600` |
//! | `LOG_FORMAT` | `text` |
//! | `BOOTSTRAP_ADMIN_EMAIL` / `BOOTSTRAP_ADMIN_PASSWORD` | unset |

use std::str::FromStr;
use std::time::Duration;

use rand_core::{OsRng, RngCore};
use rust_decimal::Decimal;
use usde_core::limits::{DEFAULT_DAILY_LIMIT, DEFAULT_SINGLE_LIMIT};
use usde_core::WithdrawalLimits;

/// Minimum length of a production JWT secret.
const MIN_SECRET_LEN: usize = 32;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    /// Local development and tests. Permits the in-memory store and an
    /// ephemeral JWT secret.
    Development,
    /// Requires `DATABASE_URL` and `JWT_SECRET`.
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable.
    Text,
    /// One JSON object per line.
    Json,
}

/// HMAC secret for session tokens. `Debug` never prints the value.
#[derive(Clone)]
pub struct JwtSecret {
    value: String,
    ephemeral: bool,
}

impl JwtSecret {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            value: secret.into(),
            ephemeral: false,
        }
    }

    /// Random 256-bit secret, hex encoded.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self {
            value: bytes.iter().map(|b| format!("{b:02x}")).collect(),
            ephemeral: true,
        }
    }

    /// Whether the secret was generated for this process only.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JwtSecret([REDACTED])")
    }
}

/// Simulated bank payout behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoutConfig {
    /// Time the simulated bank takes to answer.
    pub delay: Duration,
    /// Probability in `0..=1` that a payout or account verification succeeds.
    pub success_rate: f64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            success_rate: 0.9,
        }
    }
}

/// System administrator created at startup when no company holds its
/// e-mail. `Debug` never prints the password.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub environment: RuntimeEnv,
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: JwtSecret,
    pub jwt_ttl: Duration,
    pub limits: WithdrawalLimits,
    pub payout: PayoutConfig,
    pub sweep_interval: Duration,
    pub log_format: LogFormat,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_ttl", &self.jwt_ttl)
            .field("limits", &self.limits)
            .field("payout", &self.payout)
            .field("sweep_interval", &self.sweep_interval)
            .field("log_format", &self.log_format)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish()
    }
}

impl Default for AppConfig {
    /// Development defaults with an ephemeral secret and no database.
    fn default() -> Self {
        Self {
            port: 8080,
            environment: RuntimeEnv::Development,
            database_url: None,
            jwt_secret: JwtSecret::ephemeral(),
            jwt_ttl: Duration::from_secs(86_400),
            limits: WithdrawalLimits::default(),
            payout: PayoutConfig::default(),
            sweep_interval: Duration::from_secs(3600),
            log_format: LogFormat::Text,
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("APP_ENV").as_deref() {
            None | Some("development") | Some("dev") => RuntimeEnv::Development,
            Some("production") | Some("prod") => RuntimeEnv::Production,
            Some(other) => return Err(ConfigError::Invalid("APP_ENV", other.to_string())),
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if environment == RuntimeEnv::Production && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = match lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            Some(secret) if secret.len() < MIN_SECRET_LEN && environment == RuntimeEnv::Production => {
                return Err(ConfigError::WeakSecret(MIN_SECRET_LEN));
            }
            Some(secret) => JwtSecret::new(secret),
            None if environment == RuntimeEnv::Production => {
                return Err(ConfigError::Missing("JWT_SECRET"));
            }
            None => JwtSecret::ephemeral(),
        };

        let limits = WithdrawalLimits::new(
            parse_or(&lookup, "WITHDRAWAL_DAILY_LIMIT", Decimal::from(DEFAULT_DAILY_LIMIT))?,
            parse_or(&lookup, "WITHDRAWAL_SINGLE_LIMIT", Decimal::from(DEFAULT_SINGLE_LIMIT))?,
        )
        .map_err(|e| ConfigError::Invalid("WITHDRAWAL_*_LIMIT", e.to_string()))?;

        let success_rate: f64 = parse_or(&lookup, "PAYOUT_SUCCESS_RATE", 0.9)?;
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(ConfigError::Invalid(
                "PAYOUT_SUCCESS_RATE",
                success_rate.to_string(),
            ));
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::Invalid("LOG_FORMAT", other.to_string())),
        };

        let bootstrap_admin = match (
            lookup("BOOTSTRAP_ADMIN_EMAIL").filter(|v| !v.trim().is_empty()),
            lookup("BOOTSTRAP_ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_EMAIL")),
        };

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            environment,
            database_url,
            jwt_secret,
            jwt_ttl: Duration::from_secs(parse_or(&lookup, "JWT_TTL_SECS", 86_400)?),
            limits,
            payout: PayoutConfig {
                delay: Duration::from_millis(parse_or(&lookup, "PAYOUT_DELAY_MS", 1000)?),
                success_rate,
            },
            sweep_interval: Duration::from_secs(
                parse_or::<u64>(&lookup, "SWEEP_INTERVAL_SECS", 3600)?.max(1),
            ),
            log_format,
            bootstrap_admin,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
    #[error("JWT_SECRET must be at least {0} characters in production")]
    WeakSecret(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.environment, RuntimeEnv::Development);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.limits, WithdrawalLimits::default());
        assert_eq!(cfg.payout.delay, Duration::from_millis(1000));
        assert_eq!(cfg.jwt_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn production_requires_database_and_secret() {
        let err = AppConfig::from_lookup(lookup(&[("APP_ENV", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let err = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/usde"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));

        let err = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/usde"),
            ("JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::WeakSecret(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("WITHDRAWAL_DAILY_LIMIT", "20000"),
            ("WITHDRAWAL_SINGLE_LIMIT", "7500.50"),
            ("PAYOUT_SUCCESS_RATE", "1"),
            ("PAYOUT_DELAY_MS", "0"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.limits.daily, Decimal::from(20_000));
        assert_eq!(cfg.limits.single, Decimal::new(750_050, 2));
        assert_eq!(cfg.payout.success_rate, 1.0);
        assert_eq!(cfg.payout.delay, Duration::ZERO);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("PAYOUT_SUCCESS_RATE", "1.5")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("WITHDRAWAL_SINGLE_LIMIT", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("APP_ENV", "staging")])).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = AppConfig {
            database_url: Some("postgres://user:hunter2@db/usde".into()),
            jwt_secret: JwtSecret::new("super-secret-value"),
            ..AppConfig::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("super-secret-value"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn bootstrap_admin_needs_both_vars() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("BOOTSTRAP_ADMIN_EMAIL", "root@usde.test"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "changeme"),
        ]))
        .unwrap();
        let admin = cfg.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "root@usde.test");
        assert!(!format!("{admin:?}").contains("changeme"));

        let err = AppConfig::from_lookup(lookup(&[("BOOTSTRAP_ADMIN_EMAIL", "root@usde.test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")));
    }

    #[test]
    fn ephemeral_secrets_differ() {
        let a = JwtSecret::ephemeral();
        let b = JwtSecret::ephemeral();
        assert!(a.is_ephemeral());
        assert!(!JwtSecret::new("x").is_ephemeral());
        assert_eq!(a.as_bytes().len(), 64);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
