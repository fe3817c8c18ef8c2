//! Storage module for persisting scan results
//!
//! This module handles all database operations for the collector, including:
//! - SQLite database initialization and schema management
//! - Page scan persistence (page row, resource rows, cookies, links)
//! - Per-variant access timestamps for timeseries scheduling
//! - Scan failure logging

mod schema;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use sqlite::{SqliteStore, SqliteStoreFactory};
pub use traits::{ResultStore, StorageError, StorageResult, StoreFactory};
