use crate::browser::BrowserVariant;
use serde::Deserialize;

/// Main configuration structure for webtrace
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub collector: CollectorConfig,
    pub browser: BrowserSettings,
    pub output: OutputConfig,
}

/// Collector behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Number of concurrent scan workers
    #[serde(rename = "pool-size")]
    pub pool_size: u32,

    /// Path to the page list file (one URL per line, `#` comments)
    #[serde(rename = "page-list")]
    pub page_list: String,

    /// Revisit pages on a schedule instead of deduplicating permanently
    #[serde(default)]
    pub timeseries: bool,

    /// Minimum minutes between timeseries snapshots of the same page
    #[serde(rename = "interval-minutes", default = "default_interval_minutes")]
    pub interval_minutes: i64,
}

fn default_interval_minutes() -> i64 {
    // One day.
    1440
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// Browser variants each page is scanned with, in order
    #[serde(default = "default_variants")]
    pub variants: Vec<BrowserVariant>,

    /// Grace period after load during which async requests may finish
    #[serde(rename = "settle-wait-seconds", default = "default_settle_wait")]
    pub settle_wait_seconds: u64,

    /// Hard bound on the navigation itself, separate from the settle wait
    #[serde(rename = "page-timeout-seconds", default = "default_page_timeout")]
    pub page_timeout_seconds: u64,

    /// Send a `DNT: 1` header with every request
    #[serde(default)]
    pub dnt: bool,

    /// Custom Chrome binary path (auto-detected when absent)
    #[serde(rename = "chrome-binary")]
    pub chrome_binary: Option<String>,

    /// Allow insecure content to load. Off unless you know why you want it.
    #[serde(rename = "allow-insecure", default)]
    pub allow_insecure: bool,
}

fn default_variants() -> Vec<BrowserVariant> {
    vec![BrowserVariant::Chrome]
}

fn default_settle_wait() -> u64 {
    15
}

fn default_page_timeout() -> u64 {
    60
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
