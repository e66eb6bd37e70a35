//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::fmt;
use std::net::SocketAddr;

use chrono::FixedOffset;
use recall_core::HashingCost;
use secrecy::{ExposeSecret, SecretString};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: SecretString,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub client_origin: String,
    pub password_pepper: SecretString,
    pub session_hmac_key: SecretString,
    /// Offset whose midnight starts a new practice day.
    pub review_offset: FixedOffset,
    pub hashing_cost: HashingCost,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("log_level", &self.log_level)
            .field("client_origin", &self.client_origin)
            .field("password_pepper", &"[REDACTED]")
            .field("session_hmac_key", &"[REDACTED]")
            .field("review_offset", &self.review_offset)
            .field("hashing_cost", &self.hashing_cost)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required(&lookup, "DATABASE_URL")?;
        let db_max_connections = parsed_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let client_origin =
            lookup("CLIENT_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Secrets ---
        let password_pepper = required(&lookup, "PASSWORD_PEPPER")?;
        let session_hmac_key = required(&lookup, "SESSION_HMAC_KEY")?;
        if password_pepper.expose_secret() == session_hmac_key.expose_secret() {
            return Err(ConfigError::InvalidValue(
                "SESSION_HMAC_KEY".to_string(),
                "must differ from PASSWORD_PEPPER".to_string(),
            ));
        }

        // --- Scheduling and Hashing ---
        let offset_minutes = parsed_or(&lookup, "REVIEW_UTC_OFFSET_MINUTES", 0i32)?;
        let review_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REVIEW_UTC_OFFSET_MINUTES".to_string(),
                    format!("{} is not a valid UTC offset", offset_minutes),
                )
            })?;

        let defaults = HashingCost::default();
        let hashing_cost = HashingCost {
            memory_kib: parsed_or(&lookup, "ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parsed_or(&lookup, "ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parsed_or(&lookup, "ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            client_origin,
            password_pepper,
            session_hmac_key,
            review_offset,
            hashing_cost,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(SecretString::from(value)),
        _ => Err(ConfigError::MissingVar(name.to_string())),
    }
}

fn parsed_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
