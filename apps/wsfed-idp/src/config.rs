//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and valid, or the
//! process exits with a clear error before binding a socket.

use std::env;
use std::time::Duration;
use thiserror::Error;
use xavyo_api_wsfed::WsFedConfig;

/// Development-only default for `WSFED_KEY_ENCRYPTION_KEY`: 64 hex '0' characters.
pub const INSECURE_KEY_ENCRYPTION_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Upper bound for `WSFED_CLOCK_SKEW_SECONDS`.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 600;

/// Application environment mode.
///
/// - `Development`: insecure defaults are allowed with WARN-level logging.
/// - `Production`: insecure defaults cause the application to refuse startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Parse an `APP_ENV` value. Unrecognized values fall back to `Development`.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => {
                tracing::warn!(
                    value = other,
                    "Unrecognized APP_ENV value, defaulting to Development"
                );
                Self::Development
            }
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

#[derive(Clone)]
pub struct Config {
    pub app_env: AppEnvironment,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Identifier of this identity provider (token issuer, metadata entityID)
    pub issuer: String,

    /// Public base URL the passive endpoint is reachable under
    pub base_url: String,

    pub host: String,
    pub port: u16,

    /// Log filter used when `RUST_LOG` is not set
    pub rust_log: String,

    /// AES-256-GCM key protecting stored signing key material
    pub key_encryption_key: [u8; 32],

    pub clock_skew_seconds: i64,
    pub default_reply_url: Option<String>,
    pub login_url: Option<String>,

    /// Header set by an authenticating reverse proxy carrying the principal
    /// subject. Without it every sign-in is unauthenticated.
    pub trusted_principal_header: Option<String>,

    /// Bearer token guarding the admin routes. Admin routes are not mounted
    /// when unset.
    pub admin_token: Option<String>,

    pub metadata_cache_seconds: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_env", &self.app_env)
            .field("database_url", &"[redacted]")
            .field("issuer", &self.issuer)
            .field("base_url", &self.base_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .field("login_url", &self.login_url)
            .field("trusted_principal_header", &self.trusted_principal_header)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values are
    /// invalid.
    ///
    /// # Required Variables
    ///
    /// - `DATABASE_URL` - PostgreSQL connection string
    /// - `WSFED_ISSUER` - identity provider identifier
    ///
    /// # Optional Variables
    ///
    /// - `APP_ENV` - `development` (default) or `production`
    /// - `WSFED_BASE_URL` - public base URL (default: `http://localhost:8080`)
    /// - `HOST` / `PORT` - bind address (default: `0.0.0.0:8080`)
    /// - `RUST_LOG` - log filter (default: "info")
    /// - `WSFED_KEY_ENCRYPTION_KEY` - 64 hex characters
    /// - `WSFED_CLOCK_SKEW_SECONDS` - default 120, max 600
    /// - `WSFED_DEFAULT_REPLY_URL`, `WSFED_LOGIN_URL`
    /// - `WSFED_TRUSTED_PRINCIPAL_HEADER`, `WSFED_ADMIN_TOKEN`
    /// - `WSFED_METADATA_CACHE_SECONDS` - default 60
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required =
            |var: &str| optional(var).ok_or_else(|| ConfigError::MissingVar(var.to_string()));

        let app_env = AppEnvironment::from_env_str(
            &optional("APP_ENV").unwrap_or_else(|| "development".to_string()),
        );

        let database_url = required("DATABASE_URL")?;
        let issuer = required("WSFED_ISSUER")?;

        let base_url = optional("WSFED_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                var: "WSFED_BASE_URL".to_string(),
                message: "Must be an absolute http(s) URL".to_string(),
            });
        }

        let host = optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = optional("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        let rust_log = optional("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let key_encryption_key = parse_hex_encryption_key(
            "WSFED_KEY_ENCRYPTION_KEY",
            &optional("WSFED_KEY_ENCRYPTION_KEY")
                .unwrap_or_else(|| INSECURE_KEY_ENCRYPTION_KEY.to_string()),
        )?;

        let clock_skew_seconds = parse_number("WSFED_CLOCK_SKEW_SECONDS", optional, 120)?;
        if !(0..=MAX_CLOCK_SKEW_SECONDS).contains(&clock_skew_seconds) {
            return Err(ConfigError::InvalidValue {
                var: "WSFED_CLOCK_SKEW_SECONDS".to_string(),
                message: format!("Must be between 0 and {MAX_CLOCK_SKEW_SECONDS}"),
            });
        }

        let metadata_cache_seconds = parse_number("WSFED_METADATA_CACHE_SECONDS", optional, 60)?;

        Ok(Self {
            app_env,
            database_url,
            issuer,
            base_url,
            host,
            port,
            rust_log,
            key_encryption_key,
            clock_skew_seconds,
            default_reply_url: optional("WSFED_DEFAULT_REPLY_URL"),
            login_url: optional("WSFED_LOGIN_URL"),
            trusted_principal_header: optional("WSFED_TRUSTED_PRINCIPAL_HEADER")
                .map(|h| h.to_ascii_lowercase()),
            admin_token: optional("WSFED_ADMIN_TOKEN"),
            metadata_cache_seconds,
        })
    }

    /// Get the server bind address as a socket address string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pipeline settings for the WS-Federation crate.
    pub fn wsfed_config(&self) -> WsFedConfig {
        let mut config = WsFedConfig::new(self.issuer.clone(), self.base_url.clone());
        config.clock_skew = chrono::Duration::seconds(self.clock_skew_seconds);
        config.default_reply_url = self.default_reply_url.clone();
        config.login_url = self.login_url.clone();
        config.metadata_cache_ttl = Duration::from_secs(self.metadata_cache_seconds);
        config
    }

    /// Check for insecure defaults.
    ///
    /// In production returns `Err(errors)`; in development returns
    /// `Ok(warnings)`.
    pub fn validate_security_config(&self) -> Result<Vec<String>, Vec<String>> {
        let mut findings = Vec::new();

        if self.key_encryption_key == [0u8; 32] {
            findings.push(
                "WSFED_KEY_ENCRYPTION_KEY is the insecure all-zero default".to_string(),
            );
        }
        if self.base_url.starts_with("http://") {
            findings.push(format!(
                "WSFED_BASE_URL uses plain http ({}); tokens would be posted over an insecure channel",
                self.base_url
            ));
        }
        if self.admin_token.as_ref().is_some_and(|t| t.len() < 32) {
            findings.push("WSFED_ADMIN_TOKEN is shorter than 32 characters".to_string());
        }

        if self.app_env.is_production() && !findings.is_empty() {
            Err(findings)
        } else {
            Ok(findings)
        }
    }
}

fn parse_number<T, F>(var: &str, optional: F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match optional(var) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("{e}"),
        }),
        None => Ok(default),
    }
}

/// Parse hex-encoded 32-byte encryption key
fn parse_hex_encryption_key(var_name: &str, hex_str: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(hex_str.trim()).map_err(|_| ConfigError::InvalidValue {
        var: var_name.to_string(),
        message: "Must be 64 hex characters (32 bytes)".to_string(),
    })?;

    if bytes.len() != 32 {
        return Err(ConfigError::InvalidValue {
            var: var_name.to_string(),
            message: format!("Expected 32 bytes, got {}", bytes.len()),
        });
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
