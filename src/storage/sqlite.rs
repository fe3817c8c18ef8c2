//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ResultStore
//! trait. Header maps are stored as JSON text; timestamps as RFC 3339.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ResultStore, StorageError, StorageResult, StoreFactory};
use crate::devtools::PageScanResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite result store backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance. Several worker
        // connections write to the same file, so WAL is required.
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 10000;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl ResultStore for SqliteStore {
    fn page_exists(&self, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM pages WHERE start_url = ?1 LIMIT 1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn last_accessed(
        &self,
        url: &str,
        browser_type: &str,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let accessed: Option<String> = self
            .conn
            .query_row(
                "SELECT accessed FROM pages
                 WHERE start_url = ?1 AND browser_type = ?2
                 ORDER BY accessed DESC LIMIT 1",
                params![url, browser_type],
                |row| row.get(0),
            )
            .optional()?;

        match accessed {
            Some(text) => {
                let parsed = DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }

    fn store_result(&mut self, result: &PageScanResult) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO pages
             (accessed, start_url, final_url, title, meta_desc, lang, load_time,
              browser_type, browser_version, browser_wait, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                now,
                result.start_url,
                result.final_url,
                result.title,
                result.meta_description,
                result.language,
                result.page_load_time_ms,
                result.browser_type,
                result.browser_version,
                result.settle_wait_seconds as i64,
                result.page_source,
            ],
        )?;
        let page_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO requests
                 (page_id, url, request_id, received, start_time, end_time, status,
                  status_text, content_type, body_size, load_time, user_agent, referer,
                  request_headers, response_headers)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for (url, record) in &result.resources {
                let request_headers = match &record.request_headers {
                    Some(headers) => Some(
                        serde_json::to_string(headers)
                            .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    ),
                    None => None,
                };
                stmt.execute(params![
                    page_id,
                    url,
                    record.request_id,
                    record.received,
                    record.start_time,
                    record.end_time,
                    record.status,
                    record.status_text,
                    record.content_type,
                    record.body_size,
                    record.load_time,
                    record.user_agent,
                    record.referer,
                    request_headers,
                    record.response_headers,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO cookies
                 (page_id, name, value, domain, path, expiry, secure, http_only)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for cookie in &result.cookies {
                stmt.execute(params![
                    page_id,
                    cookie.name,
                    cookie.value,
                    cookie.domain,
                    cookie.path,
                    cookie.expiry,
                    cookie.secure,
                    cookie.http_only,
                ])?;
            }
        }

        {
            let mut stmt =
                tx.prepare("INSERT INTO links (page_id, text, href) VALUES (?1, ?2, ?3)")?;
            for link in &result.links {
                stmt.execute(params![page_id, link.text, link.href])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn log_error(&mut self, url: &str, message: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO errors (occurred_at, url, message) VALUES (?1, ?2, ?3)",
            params![now, url, message],
        )?;
        Ok(())
    }
}

/// Opens file-backed SqliteStore handles, one per worker
pub struct SqliteStoreFactory {
    path: PathBuf,
}

impl SqliteStoreFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreFactory for SqliteStoreFactory {
    fn open(&self) -> StorageResult<Box<dyn ResultStore>> {
        Ok(Box::new(SqliteStore::new(&self.path)?))
    }
}
