//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `VERDURA_API_BASE_URL` - Base URL of the Verdura API
//!
//! ## Optional
//! - `VERDURA_API_TOKEN` - Bearer token for authenticated API calls
//! - `VERDURA_DATA_DIR` - Local storage directory (default: ./data)
//! - `VERDURA_REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 10)
//! - `VERDURA_CATALOG_CACHE_TTL_SECS` - Branch/availability cache TTL (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront store-layer configuration.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Base URL of the Verdura API (no trailing slash).
    pub api_base_url: String,
    /// Bearer token for authenticated calls, if the embedder has one.
    pub api_token: Option<SecretString>,
    /// Directory for the local key-value store.
    pub data_dir: PathBuf,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// TTL for cached branch listings and availability rows.
    pub catalog_cache_ttl: Duration,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("data_dir", &self.data_dir)
            .field("request_timeout", &self.request_timeout)
            .field("catalog_cache_ttl", &self.catalog_cache_ttl)
            .finish()
    }
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

        let api_base_url = get_required_env("VERDURA_API_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let api_token = get_optional_env("VERDURA_API_TOKEN").map(SecretString::from);
        let data_dir = PathBuf::from(get_env_or_default("VERDURA_DATA_DIR", "./data"));
        let request_timeout =
            Duration::from_secs(get_parsed_or_default("VERDURA_REQUEST_TIMEOUT_SECS", 10)?);
        let catalog_cache_ttl =
            Duration::from_secs(get_parsed_or_default("VERDURA_CATALOG_CACHE_TTL_SECS", 30)?);

        Ok(Self {
            api_base_url,
            api_token,
            data_dir,
            request_timeout,
            catalog_cache_ttl,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a u64 environment variable, falling back to a default when unset.
fn get_parsed_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
