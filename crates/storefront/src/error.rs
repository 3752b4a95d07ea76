//! Top-level error type for storefront bootstrap.
//!
//! Store operations themselves never surface collaborator failures to
//! callers — each has a defined degrade path (see the store modules).
//! `StorefrontError` covers the construction path only: loading config,
//! opening local storage, building the API client.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors that can occur while wiring up the store layer.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Configuration loading failed.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Local storage could not be opened.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// API client could not be built.
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;
