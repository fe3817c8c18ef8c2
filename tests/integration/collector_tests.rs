//! Integration tests for the collector
//!
//! These tests drive the full orchestration loop (page list, worker pool,
//! correlation, SQLite persistence) with scripted browser sessions instead
//! of real Chrome.

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use webtrace::browser::{
    BrowserSession, BrowserVariant, PageCapture, SessionError, SessionFactory,
};
use webtrace::collector::Collector;
use webtrace::config::{BrowserSettings, CollectorConfig, Config, OutputConfig};
use webtrace::devtools::LogEntry;
use webtrace::storage::SqliteStoreFactory;

/// Shared script controlling how the fake browser behaves per URL
#[derive(Default)]
struct Script {
    /// URLs whose page load fails with a navigation error
    fail_urls: HashSet<String>,
    /// Number of launch attempts that fail before any session exists
    launch_failures: AtomicUsize,
    launches: AtomicUsize,
    closes: AtomicUsize,
}

struct ScriptedFactory {
    script: Arc<Script>,
}

impl ScriptedFactory {
    fn new(script: Arc<Script>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn launch(
        &self,
        _variant: BrowserVariant,
    ) -> Result<Box<dyn BrowserSession>, SessionError> {
        let failed = self
            .script
            .launch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SessionError::Launch("browser exited during startup".to_string()));
        }
        self.script.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Script>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn load_and_capture(
        &mut self,
        url: &str,
        _settle_wait: Duration,
    ) -> Result<PageCapture, SessionError> {
        if self.script.fail_urls.contains(url) {
            return Err(SessionError::Navigation("connection refused".to_string()));
        }
        Ok(sample_capture(url))
    }

    async fn close(self: Box<Self>) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds a minimal but complete capture: the page document plus one
/// subresource, all four timing events present
fn sample_capture(url: &str) -> PageCapture {
    let asset = format!("{}asset.js", url);
    let log = vec![
        LogEntry::new(
            "Network.requestWillBeSent",
            json!({
                "requestId": "1000.1",
                "timestamp": 10.0,
                "request": { "url": url, "headers": { "User-Agent": "scripted" } }
            }),
        ),
        LogEntry::new(
            "Network.responseReceived",
            json!({
                "response": {
                    "url": url,
                    "status": 200,
                    "statusText": "OK",
                    "headers": { "Content-Type": "text/html" }
                }
            }),
        ),
        LogEntry::new(
            "Network.requestWillBeSent",
            json!({
                "requestId": "1000.2",
                "timestamp": 10.2,
                "request": { "url": asset, "headers": {} }
            }),
        ),
        LogEntry::new(
            "Network.loadingFinished",
            json!({ "requestId": "1000.1", "timestamp": 10.5, "encodedDataLength": 5120 }),
        ),
        LogEntry::new(
            "Network.loadingFinished",
            json!({ "requestId": "1000.2", "timestamp": 10.9, "encodedDataLength": 640 }),
        ),
    ];

    PageCapture {
        log,
        final_url: url.to_string(),
        title: Some("Scripted Page".to_string()),
        meta_description: None,
        language: Some("en".to_string()),
        page_source: "<html></html>".to_string(),
        cookies: vec![],
        links: vec![],
        browser_version: Some("Chrome/120.0 [headless]".to_string()),
    }
}

/// Writes a page list file and returns a config pointing at it
fn create_test_config(dir: &TempDir, urls: &[&str], variants: Vec<BrowserVariant>) -> Config {
    let list_path = dir.path().join("pages.txt");
    let mut file = std::fs::File::create(&list_path).unwrap();
    for url in urls {
        writeln!(file, "{}", url).unwrap();
    }

    Config {
        collector: CollectorConfig {
            pool_size: 2,
            page_list: list_path.to_string_lossy().into_owned(),
            timeseries: false,
            interval_minutes: 1440,
        },
        browser: BrowserSettings {
            variants,
            settle_wait_seconds: 0,
            page_timeout_seconds: 5,
            dnt: false,
            chrome_binary: None,
            allow_insecure: false,
        },
        output: OutputConfig {
            database_path: dir
                .path()
                .join("webtrace.db")
                .to_string_lossy()
                .into_owned(),
        },
    }
}

fn query_i64(db_path: &str, sql: &str) -> i64 {
    let conn = Connection::open(Path::new(db_path)).unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[tokio::test]
async fn test_full_run_stores_every_page() {
    let dir = TempDir::new().unwrap();
    let urls = [
        "https://one.example/",
        "https://two.example/",
        "https://three.example/",
    ];
    let config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    let db_path = config.output.database_path.clone();

    let script = Arc::new(Script::default());
    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::clone(&script))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );

    let summary = collector.run().await.unwrap();
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);

    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 3);
    // Document + one subresource per page
    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM requests"), 6);

    // Every launched session must have been released
    assert_eq!(
        script.launches.load(Ordering::SeqCst),
        script.closes.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_one_failure_does_not_block_other_pages() {
    let dir = TempDir::new().unwrap();
    let urls = [
        "https://good.example/",
        "https://broken.example/",
        "https://fine.example/",
    ];
    let config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    let db_path = config.output.database_path.clone();

    let mut script = Script::default();
    script
        .fail_urls
        .insert("https://broken.example/".to_string());
    let script = Arc::new(script);

    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::clone(&script))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );

    let summary = collector.run().await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 2);
    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM errors"), 1);

    // The failed scan still released its session
    assert_eq!(
        script.launches.load(Ordering::SeqCst),
        script.closes.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_launch_failure_does_not_block_other_pages() {
    let dir = TempDir::new().unwrap();
    let urls = [
        "https://one.example/",
        "https://two.example/",
        "https://three.example/",
    ];
    let config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    let db_path = config.output.database_path.clone();

    // The first launch attempt dies before any session exists
    let script = Script::default();
    script.launch_failures.store(1, Ordering::SeqCst);
    let script = Arc::new(script);

    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::clone(&script))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );

    let summary = collector.run().await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 2);
    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM errors"), 1);

    // No session existed for the failed launch, so there is nothing to
    // release; every session that did launch was closed
    assert_eq!(
        script.launches.load(Ordering::SeqCst),
        script.closes.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_second_run_retries_only_unscanned_pages() {
    let dir = TempDir::new().unwrap();
    let urls = ["https://good.example/", "https://broken.example/"];
    let config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    let db_path = config.output.database_path.clone();

    // First run: one page fails
    let mut script = Script::default();
    script
        .fail_urls
        .insert("https://broken.example/".to_string());
    let collector = Collector::new(
        config.clone(),
        Arc::new(ScriptedFactory::new(Arc::new(script))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    let first = collector.run().await.unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.failed, 1);

    // Second run: nothing fails; only the previously failed page is retried
    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    let second = collector.run().await.unwrap();
    assert_eq!(second.attempted, 1);
    assert_eq!(second.succeeded, 1);

    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 2);
}

#[tokio::test]
async fn test_timeseries_skips_fresh_snapshots() {
    let dir = TempDir::new().unwrap();
    let urls = ["https://one.example/", "https://two.example/"];
    let mut config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    config.collector.timeseries = true;
    config.collector.interval_minutes = 60;
    let db_path = config.output.database_path.clone();

    let collector = Collector::new(
        config.clone(),
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    let first = collector.run().await.unwrap();
    assert_eq!(first.succeeded, 2);

    // Immediately after, every snapshot is still fresh
    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    let second = collector.run().await.unwrap();
    assert_eq!(second.attempted, 2);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.succeeded, 0);

    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 2);
}

#[tokio::test]
async fn test_timeseries_revisits_after_interval_and_keeps_history() {
    let dir = TempDir::new().unwrap();
    let urls = ["https://one.example/"];
    let mut config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    config.collector.timeseries = true;
    config.collector.interval_minutes = 60;
    let db_path = config.output.database_path.clone();

    let collector = Collector::new(
        config.clone(),
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    collector.run().await.unwrap();

    // Backdate the stored snapshot past the revisit interval
    {
        let conn = Connection::open(Path::new(&db_path)).unwrap();
        let old = (chrono::Utc::now() - chrono::Duration::minutes(120)).to_rfc3339();
        conn.execute("UPDATE pages SET accessed = ?1", [&old]).unwrap();
    }

    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    let second = collector.run().await.unwrap();
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.skipped, 0);

    // The old snapshot stays; timeseries mode accumulates history
    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 2);
}

#[tokio::test]
async fn test_each_variant_gets_its_own_scan() {
    let dir = TempDir::new().unwrap();
    let urls = ["https://one.example/"];
    let config = create_test_config(
        &dir,
        &urls,
        vec![BrowserVariant::Chrome, BrowserVariant::ChromeHeadful],
    );
    let db_path = config.output.database_path.clone();

    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    let summary = collector.run().await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, 2);

    assert_eq!(query_i64(&db_path, "SELECT COUNT(*) FROM pages"), 2);
    assert_eq!(
        query_i64(
            &db_path,
            "SELECT COUNT(DISTINCT browser_type) FROM pages"
        ),
        2
    );
}

#[tokio::test]
async fn test_correlated_timing_lands_in_the_database() {
    let dir = TempDir::new().unwrap();
    let urls = ["https://one.example/"];
    let config = create_test_config(&dir, &urls, vec![BrowserVariant::Chrome]);
    let db_path = config.output.database_path.clone();

    let collector = Collector::new(
        config,
        Arc::new(ScriptedFactory::new(Arc::new(Script::default()))),
        Arc::new(SqliteStoreFactory::new(db_path.clone())),
    );
    collector.run().await.unwrap();

    // First request at 10.0, last finish at 10.9
    let load_time: i64 = query_i64(&db_path, "SELECT load_time FROM pages");
    assert_eq!(load_time, 900);

    let body_size: i64 = query_i64(
        &db_path,
        "SELECT body_size FROM requests WHERE url = 'https://one.example/'",
    );
    assert_eq!(body_size, 5120);
}
