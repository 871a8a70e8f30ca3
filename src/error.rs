//! Error types for feedrelay
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Vendor, Delivery, Storage, etc.)
//! - A first-class cancellation variant so shutdown paths are matchable
//! - A nested [`StorageError`] for persistence failures

use thiserror::Error;

/// Result type alias for feedrelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feedrelay
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation was interrupted by cooperative cancellation
    ///
    /// Always propagated upward and never logged as a failure. Check with
    /// [`Error::is_cancellation`] rather than matching directly so callers stay
    /// robust against wrapped cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Vendor refresh failed
    #[error("vendor error: {0}")]
    Vendor(String),

    /// No vendor registered under the requested name
    #[error("unknown vendor: {0}")]
    UnknownVendor(String),

    /// Delivery transport rejected a page or media item
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Fair lock was closed while the caller was still queued
    #[error("lock closed")]
    LockClosed,

    /// Render callback failed while composing output
    #[error("render error: {0}")]
    Render(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true when this error is cancellation-related
    ///
    /// Cancellation-class errors abort the surrounding task instead of being
    /// recorded on a subscription. Storage backends that observe a cancelled
    /// handle surface [`StorageError::Cancelled`], which classifies here too.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::Storage(StorageError::Cancelled)
        )
    }
}

/// Persistence-layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to connect to the backing store
    #[error("failed to connect to storage: {0}")]
    ConnectionFailed(String),

    /// Failed to run schema migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Subscription already exists under the same header
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Storage call observed a cancelled handle
    #[error("storage operation cancelled")]
    Cancelled,
}
