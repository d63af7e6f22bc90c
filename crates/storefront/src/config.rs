//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TIENDA_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `TIENDA_HOST` - Bind address (default: 127.0.0.1)
//! - `TIENDA_PORT` - Listen port (default: 3000)
//! - `TIENDA_BASE_URL` - Public URL (default: `http://localhost:<port>`)
//! - `TIENDA_CART_DIR` - Directory for anonymous cart files (default: data/carts)
//! - `TIENDA_CART_SYNCING_POLICY` - `queue` or `reject` (default: queue)
//! - `TIENDA_CART_SESSION_CAPACITY` - Carts kept in memory (default: 10000)
//! - `TIENDA_CART_SESSION_IDLE_SECS` - Idle time before a cart is evicted (default: 1800)
//! - `TIENDA_CATALOG_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::cart::SyncingPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Cart synchronization settings
    pub cart: CartConfig,
    /// How long the catalog stays cached
    pub catalog_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Cart synchronization settings.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Directory holding one JSON file per anonymous cart
    pub dir: PathBuf,
    /// What to do with commands issued while a sign-in is syncing
    pub syncing_policy: SyncingPolicy,
    /// Maximum number of carts kept in memory
    pub session_capacity: u64,
    /// Idle time after which an in-memory cart is dropped
    pub session_idle: Duration,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("TIENDA_DATABASE_URL")?;
        let host: IpAddr = parse_env_or_default("TIENDA_HOST", "127.0.0.1")?;
        let port: u16 = parse_env_or_default("TIENDA_PORT", "3000")?;
        let base_url = get_optional_env("TIENDA_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let cart = CartConfig::from_env()?;
        let catalog_ttl = Duration::from_secs(parse_env_or_default("TIENDA_CATALOG_TTL_SECS", "300")?);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            cart,
            catalog_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CartConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dir: PathBuf::from(get_env_or_default("TIENDA_CART_DIR", "data/carts")),
            syncing_policy: parse_env_or_default("TIENDA_CART_SYNCING_POLICY", "queue")?,
            session_capacity: parse_env_or_default("TIENDA_CART_SESSION_CAPACITY", "10000")?,
            session_idle: Duration::from_secs(parse_env_or_default(
                "TIENDA_CART_SESSION_IDLE_SECS",
                "1800",
            )?),
        })
    }
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/carts"),
            syncing_policy: SyncingPolicy::Queue,
            session_capacity: 10_000,
            session_idle: Duration::from_secs(1800),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn config(base_url: &str) -> StorefrontConfig {
        StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/tienda"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: base_url.to_string(),
            cart: CartConfig::default(),
            catalog_ttl: Duration::from_secs(300),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = config("http://localhost:3000").socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_is_https() {
        assert!(config("https://tienda.example").is_https());
        assert!(!config("http://localhost:3000").is_https());
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<u16>("TIENDA_PORT", "70000").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "TIENDA_PORT"));
    }

    #[test]
    fn test_parse_value_syncing_policy() {
        let policy: SyncingPolicy = parse_value("TIENDA_CART_SYNCING_POLICY", " Reject ").unwrap();
        assert_eq!(policy, SyncingPolicy::Reject);
        assert!(parse_value::<SyncingPolicy>("TIENDA_CART_SYNCING_POLICY", "wait").is_err());
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let output = format!("{:?}", config("http://localhost:3000"));
        assert!(!output.contains("postgres://localhost/tienda"));
        assert_eq!(
            config("http://localhost:3000").database_url.expose_secret(),
            "postgres://localhost/tienda"
        );
    }
}
