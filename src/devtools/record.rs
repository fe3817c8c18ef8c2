//! Output records built by the correlation engine
//!
//! A page scan produces one `ResourceRecord` per distinct resolved URL the
//! browser contacted, wrapped in a `PageScanResult` envelope together with
//! the page-level metadata supplied by the browser session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry per distinct resolved URL contacted during a page load.
///
/// Records are created on the first request-initiation event for a URL and
/// mutated in place as response/finish/handshake events arrive. Websocket
/// exchanges end up here too, marked with `content_type = "websocket"` and
/// no timing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Protocol-assigned correlation token. May be shared by several URLs
    /// when a request redirects.
    pub request_id: String,

    /// Whether a response (or websocket handshake response) was observed.
    pub received: bool,

    /// Monotonic timestamp of the request-initiation event, seconds.
    pub start_time: Option<f64>,

    /// Monotonic timestamp of the loading-finished event, seconds.
    pub end_time: Option<f64>,

    /// HTTP status code, if a response arrived.
    pub status: Option<i64>,

    /// HTTP status line text, if a response arrived.
    pub status_text: Option<String>,

    /// Request headers as sent, header case preserved.
    pub request_headers: Option<BTreeMap<String, String>>,

    /// Raw response header block, when the protocol exposed it.
    pub response_headers: Option<String>,

    /// Response Content-Type, or the literal marker `"websocket"`.
    pub content_type: Option<String>,

    /// Final encoded body size in bytes, absent if loading never finished.
    pub body_size: Option<i64>,

    /// Derived download time in milliseconds; absent unless positive.
    pub load_time: Option<i64>,

    /// User-Agent header extracted from the request, if present.
    pub user_agent: Option<String>,

    /// Referer header extracted from the request, if present.
    pub referer: Option<String>,
}

impl ResourceRecord {
    /// Creates a record from a request-initiation event. Response fields
    /// start out absent and are filled in as later events arrive.
    pub fn from_request(
        request_id: String,
        start_time: f64,
        headers: BTreeMap<String, String>,
    ) -> Self {
        let user_agent = header_value(&headers, "User-Agent");
        let referer = header_value(&headers, "Referer");
        Self {
            request_id,
            received: false,
            start_time: Some(start_time),
            end_time: None,
            status: None,
            status_text: None,
            request_headers: Some(headers),
            response_headers: None,
            content_type: None,
            body_size: None,
            load_time: None,
            user_agent,
            referer,
        }
    }
}

/// Case-insensitive single-header lookup. Header names arrive with whatever
/// case the browser used, so an exact match is not reliable.
fn header_value(headers: &BTreeMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

/// Transient finish data keyed by request id, not URL.
///
/// The loading-finished event carries no URL, and one request id may map to
/// several URLs in a redirect chain, so finish data is parked here and
/// merged into every matching record once the log is fully consumed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingFinish {
    pub body_size: i64,
    pub end_time: f64,
}

/// Transient websocket state keyed by request id during the log scan.
///
/// The contacted URL is only exposed by the creation event; the two
/// handshake events are tied back via the request id. Once the scan is
/// done the record is re-keyed by URL and merged into the resource table.
#[derive(Debug, Clone)]
pub(crate) struct WebSocketRecord {
    pub url: String,
    pub received: bool,
    pub status: Option<i64>,
    pub status_text: Option<String>,
    pub request_headers: Option<BTreeMap<String, String>>,
    pub response_headers: Option<String>,
    pub user_agent: Option<String>,
}

impl WebSocketRecord {
    pub fn new(url: String) -> Self {
        Self {
            url,
            received: false,
            status: None,
            status_text: None,
            request_headers: None,
            response_headers: None,
            user_agent: None,
        }
    }

    pub fn set_request_headers(&mut self, headers: BTreeMap<String, String>) {
        self.user_agent = header_value(&headers, "User-Agent");
        self.request_headers = Some(headers);
    }

    /// Converts into a `ResourceRecord` for the final merge. Handshake
    /// timing is not tracked, so all timing fields stay absent.
    pub fn into_resource_record(self, request_id: String) -> ResourceRecord {
        ResourceRecord {
            request_id,
            received: self.received,
            start_time: None,
            end_time: None,
            status: self.status,
            status_text: self.status_text,
            request_headers: self.request_headers,
            response_headers: self.response_headers,
            content_type: Some("websocket".to_string()),
            body_size: None,
            load_time: None,
            user_agent: self.user_agent,
            referer: None,
        }
    }
}

/// One cookie from the browser profile after the page settled, including
/// third-party cookies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Expiry as seconds since the epoch; absent for session cookies.
    pub expiry: Option<f64>,
    pub secure: bool,
    pub http_only: bool,
}

/// One anchor found on the rendered page, href already made absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

/// The complete result of one page scan, ready for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageScanResult {
    /// The URL as dispatched.
    pub start_url: String,

    /// The URL the browser ended up on after redirects.
    pub final_url: String,

    /// Browser variant string, e.g. "chrome".
    pub browser_type: String,

    /// Browser version string as reported over the protocol.
    pub browser_version: Option<String>,

    /// The settle wait that was applied, in seconds.
    pub settle_wait_seconds: u64,

    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub language: Option<String>,

    /// `(last_end_time - first_start_time) * 1000`, truncated toward zero.
    /// Absent when the log yielded only one side of the baseline.
    pub page_load_time_ms: Option<i64>,

    /// The completed resource table, keyed by resolved URL.
    pub resources: BTreeMap<String, ResourceRecord>,

    pub cookies: Vec<CookieRecord>,
    pub links: Vec<PageLink>,
    pub page_source: String,
}
