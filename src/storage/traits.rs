//! Storage traits and error types
//!
//! This module defines the trait interface for result stores and
//! associated error types.

use crate::devtools::PageScanResult;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for result store implementations
///
/// One store handle is opened per worker; handles are never shared across
/// tasks, so the trait only requires `Send`.
pub trait ResultStore: Send {
    /// Checks whether any scan of this URL has already been stored
    fn page_exists(&self, url: &str) -> StorageResult<bool>;

    /// Gets the timestamp of the most recent stored scan of this URL
    /// under the given browser variant, if any
    fn last_accessed(&self, url: &str, browser_type: &str)
        -> StorageResult<Option<DateTime<Utc>>>;

    /// Stores one complete page scan
    ///
    /// The page row, its resource rows, cookies, and links are written in a
    /// single transaction, so a crash never leaves a partial scan behind.
    fn store_result(&mut self, result: &PageScanResult) -> StorageResult<()>;

    /// Records a scan failure for later inspection
    fn log_error(&mut self, url: &str, message: &str) -> StorageResult<()>;
}

/// Trait for opening result store handles
///
/// The factory is shared across the worker pool; each worker opens its own
/// private handle from it.
pub trait StoreFactory: Send + Sync {
    fn open(&self) -> StorageResult<Box<dyn ResultStore>>;
}
