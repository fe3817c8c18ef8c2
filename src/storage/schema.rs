//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Webtrace database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per page scan
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    accessed TEXT NOT NULL,
    start_url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    title TEXT,
    meta_desc TEXT,
    lang TEXT,
    load_time INTEGER,
    browser_type TEXT NOT NULL,
    browser_version TEXT,
    browser_wait INTEGER NOT NULL,
    source TEXT
);

CREATE INDEX IF NOT EXISTS idx_pages_start_url ON pages(start_url);
CREATE INDEX IF NOT EXISTS idx_pages_browser_type ON pages(browser_type);

-- One row per distinct resource URL contacted during a scan
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    url TEXT NOT NULL,
    request_id TEXT NOT NULL,
    received INTEGER NOT NULL,
    start_time REAL,
    end_time REAL,
    status INTEGER,
    status_text TEXT,
    content_type TEXT,
    body_size INTEGER,
    load_time INTEGER,
    user_agent TEXT,
    referer TEXT,
    request_headers TEXT,
    response_headers TEXT
);

CREATE INDEX IF NOT EXISTS idx_requests_page ON requests(page_id);
CREATE INDEX IF NOT EXISTS idx_requests_url ON requests(url);

-- Profile cookies captured after the page settled
CREATE TABLE IF NOT EXISTS cookies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    name TEXT NOT NULL,
    value TEXT,
    domain TEXT NOT NULL,
    path TEXT NOT NULL,
    expiry REAL,
    secure INTEGER NOT NULL,
    http_only INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cookies_page ON cookies(page_id);
CREATE INDEX IF NOT EXISTS idx_cookies_domain ON cookies(domain);

-- Anchors found on the rendered page
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    text TEXT,
    href TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_page ON links(page_id);

-- Scan failures, kept for later inspection
CREATE TABLE IF NOT EXISTS errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    occurred_at TEXT NOT NULL,
    url TEXT NOT NULL,
    message TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
