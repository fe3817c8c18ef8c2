//! Webtrace: a page-level network activity collector
//!
//! This crate loads pages in a real Chrome instance, records the browser's
//! devtools network events, correlates them into one record per contacted
//! resource, and persists the results for later analysis.

pub mod browser;
pub mod collector;
pub mod config;
pub mod devtools;
pub mod storage;

use thiserror::Error;

/// Main error type for Webtrace operations
#[derive(Debug, Error)]
pub enum WebtraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser session error: {0}")]
    Session(#[from] browser::SessionError),

    #[error("Correlation error: {0}")]
    Correlation(#[from] devtools::CorrelationError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Webtrace operations
pub type Result<T> = std::result::Result<T, WebtraceError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use browser::BrowserVariant;
pub use config::Config;
pub use devtools::{correlate, Correlation, PageScanResult, ResourceRecord};
