//! Browser session capability
//!
//! The collector never talks to a browser directly; it goes through the
//! [`BrowserSession`] trait, acquiring a fresh session per task from a
//! [`SessionFactory`]. The production implementation drives headless
//! Chrome over the DevTools protocol; tests substitute scripted sessions
//! at the same seam.

mod chrome;
mod page;

pub use chrome::ChromeSessionFactory;
pub use page::{extract_language, extract_links, extract_meta_description};

use crate::devtools::{CookieRecord, LogEntry, PageLink};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Browser variants a page can be scanned with.
///
/// One variant = one launch profile; the scan loop treats variants as
/// opaque and every variant's outcome is independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserVariant {
    /// Headless Chrome (the default).
    Chrome,

    /// Chrome with a visible window. Slower, but closest to a real
    /// session; useful for spot checks.
    ChromeHeadful,
}

impl BrowserVariant {
    /// String form used in the database and in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::ChromeHeadful => "chrome-headful",
        }
    }

    pub fn is_headless(&self) -> bool {
        matches!(self, Self::Chrome)
    }
}

impl fmt::Display for BrowserVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures at the browser boundary. All task-scoped; none of these is
/// allowed to escape a worker.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to launch browser: {0}")]
    Launch(String),

    #[error("unable to load page: {0}")]
    Navigation(String),

    #[error("page load timed out after {0:?}")]
    Timeout(Duration),

    #[error("unable to read page state: {0}")]
    Capture(String),
}

/// Everything one page load produced: the raw protocol log plus the
/// page-level metadata read after the settle wait.
#[derive(Debug, Clone)]
pub struct PageCapture {
    /// Raw protocol messages observed during the load, in arrival order.
    pub log: Vec<LogEntry>,

    /// URL the browser ended up on after redirects.
    pub final_url: String,

    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub language: Option<String>,
    pub page_source: String,

    /// All cookies in the profile, third-party included.
    pub cookies: Vec<CookieRecord>,

    /// Anchors found on the rendered page.
    pub links: Vec<PageLink>,

    pub browser_version: Option<String>,
}

/// One isolated browser session: a fresh profile with an empty cookie
/// jar. Must be released with [`BrowserSession::close`] on every exit
/// path; a session is never reused across tasks.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates to `url`, waits out the settle period so in-flight
    /// asynchronous requests can finish, and returns the capture.
    async fn load_and_capture(
        &mut self,
        url: &str,
        settle_wait: Duration,
    ) -> Result<PageCapture, SessionError>;

    /// Tears the session down, killing the browser process. Close
    /// failures are logged, not surfaced; the caller has nothing left
    /// to do with one.
    async fn close(self: Box<Self>);
}

/// Acquires fresh sessions for workers. Shared across the pool.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self, variant: BrowserVariant)
        -> Result<Box<dyn BrowserSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_deserializes_from_kebab_case() {
        let variants: Vec<BrowserVariant> =
            serde_json::from_str(r#"["chrome", "chrome-headful"]"#).unwrap();
        assert_eq!(
            variants,
            vec![BrowserVariant::Chrome, BrowserVariant::ChromeHeadful]
        );
    }
}
