//! Error types for manifest-dl
//!
//! Errors fall into three classes:
//! - **Setup** errors abort a run before any item is processed (missing descriptor
//!   directory, nothing to select, invalid configuration)
//! - **Per-item / per-depot** errors are recorded in the run summary and the
//!   pipeline moves on ([`Error::Resolution`], [`Error::RetrievalExhausted`],
//!   [`Error::Persistence`])
//! - [`Error::Cancelled`] stops the run at the next step boundary
//!
//! Rate limiting is deliberately absent here: a 429 from the manifest service is
//! a backoff signal handled inside [`crate::retry`], never surfaced as an error.

use crate::types::{DepotId, ItemId, ManifestId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for manifest-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for manifest-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// A required path or item does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Nothing to process (no descriptors discovered, or empty selection)
    #[error("no items: {0}")]
    NoItems(String),

    /// The info service could not provide depot information for an item
    #[error("failed to resolve manifests for item {item}: {reason}")]
    Resolution {
        /// Item whose lookup failed
        item: ItemId,
        /// Status or transport failure description
        reason: String,
    },

    /// The retry budget ran out while fetching a manifest
    #[error(
        "manifest {manifest} for depot {depot} failed after {attempts} attempts: {last_error}"
    )]
    RetrievalExhausted {
        /// Depot being fetched
        depot: DepotId,
        /// Manifest being fetched
        manifest: ManifestId,
        /// Number of budget-consuming attempts made
        attempts: u32,
        /// The last observed status or transport error
        last_error: String,
    },

    /// The artifact was fetched but could not be written locally
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        /// Path that could not be created or written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was stopped by the caller
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a configuration key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Returns true for errors that abort a run before any item is processed
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::NotFound(_) | Error::NoItems(_)
        )
    }
}
