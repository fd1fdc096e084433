//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Which catalogue store backs the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "Unknown STORE_BACKEND '{}', expected 'postgres' or 'memory'",
                other
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`, defaulting to plain text.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL (required for the postgres store)
    pub database_url: Option<String>,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Catalogue store: "postgres" or "memory"
    pub store_backend: StoreBackend,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token expiry in minutes
    pub jwt_access_token_expiry_minutes: i64,

    /// JWT refresh token expiry in days
    pub jwt_refresh_token_expiry_days: i64,

    /// Log output format
    pub log_format: LogFormat,

    /// Comma-separated list of allowed CORS origins (any origin when unset)
    pub cors_origins: Option<String>,
}

redacted_debug!(Config {
    redact_option database_url,
    show bind_address,
    show store_backend,
    redact jwt_secret,
    show jwt_access_token_expiry_minutes,
    show jwt_refresh_token_expiry_days,
    show log_format,
    show cors_origins,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .parse()?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL not set".into()));
        }

        Ok(Self {
            database_url,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            store_backend,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| AppError::Config("JWT_SECRET not set".into()))?,
            jwt_access_token_expiry_minutes: env::var("JWT_ACCESS_TOKEN_EXPIRY_MINUTES")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            jwt_refresh_token_expiry_days: env::var("JWT_REFRESH_TOKEN_EXPIRY_DAYS")
                .unwrap_or_else(|_| "7".into())
                .parse()
                .unwrap_or(7),
            log_format: LogFormat::from_env(),
            cors_origins: env::var("CORS_ORIGINS").ok().filter(|s| !s.trim().is_empty()),
        })
    }

    /// Configuration for tests and the in-memory demo store.
    pub fn for_memory_store(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            bind_address: "127.0.0.1:0".into(),
            store_backend: StoreBackend::Memory,
            jwt_secret: jwt_secret.to_string(),
            jwt_access_token_expiry_minutes: 30,
            jwt_refresh_token_expiry_days: 7,
            log_format: LogFormat::Text,
            cors_origins: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("PostgreSQL".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::for_memory_store("very-secret-signing-key");
        config.database_url = Some("postgres://user:hunter2@db/isa".into());
        let output = format!("{:?}", config);
        assert!(!output.contains("very-secret-signing-key"));
        assert!(!output.contains("hunter2"));
        assert!(output.contains("bind_address"));
    }
}
