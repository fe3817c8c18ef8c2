//! Event correlation engine
//!
//! Turns one browser session's flat, asynchronously-ordered protocol log
//! into a table of fully-resolved resource records. The pass is a pure
//! fold over the log: no I/O, no state retained across invocations, no
//! assumption of global ordering beyond per-key protocol order.
//!
//! Three transient structures are maintained during the scan:
//! - the resource table, keyed by resolved URL
//! - pending finish data, keyed by request id (a finish event carries no
//!   URL, and redirect chains share one id across several URLs)
//! - websocket records, keyed by request id until the final re-key by URL

use crate::devtools::event::{LogEntry, NetworkEvent};
use crate::devtools::record::{PendingFinish, ResourceRecord, WebSocketRecord};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Hard failures of a correlation pass.
///
/// Per-entry problems (malformed payloads, events referencing untracked
/// ids) are diagnostics, not errors; a pass fails only when the log as a
/// whole is unusable.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("event log is empty")]
    EmptyLog,

    #[error("no timing baseline: log contains no request or finish events")]
    NoTimingBaseline,
}

/// The correlator's output: the completed resource table plus page-level
/// timing and diagnostic counts.
#[derive(Debug, Clone)]
pub struct Correlation {
    /// Resource records keyed by resolved URL.
    pub resources: BTreeMap<String, ResourceRecord>,

    /// `(last_end - first_start) * 1000`, truncated toward zero. Absent
    /// when only one side of the baseline was observed.
    pub page_load_time_ms: Option<i64>,

    /// URLs that appeared in more than one request-initiation event.
    /// First-seen wins; these are diagnostic only.
    pub duplicate_urls: Vec<String>,

    /// Entries for tracked methods that failed to parse.
    pub malformed_entries: u32,

    /// Events referencing a URL or request id that was never initiated.
    pub orphan_events: u32,

    /// Websocket records that replaced an existing http record at the
    /// same URL during the final merge.
    pub socket_overwrites: u32,
}

/// Correlates one page load's raw protocol log into resource records.
///
/// Fails only when the log is empty or establishes no timing baseline at
/// all; every per-entry irregularity is skipped and surfaced through the
/// diagnostic counts on [`Correlation`].
pub fn correlate(log: &[LogEntry]) -> Result<Correlation, CorrelationError> {
    if log.is_empty() {
        return Err(CorrelationError::EmptyLog);
    }

    let mut pass = Pass::default();
    for entry in log {
        match NetworkEvent::from_entry(entry) {
            Ok(Some(event)) => pass.observe(event),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!("skipping malformed log entry {}: {}", entry.method, err);
                pass.malformed_entries += 1;
            }
        }
    }
    pass.finish()
}

/// Local accumulators for one correlation pass. Never escapes
/// [`correlate`]; partial state is not observable.
#[derive(Default)]
struct Pass {
    resources: BTreeMap<String, ResourceRecord>,
    pending_finish: HashMap<String, PendingFinish>,
    websockets: HashMap<String, WebSocketRecord>,
    first_start_time: Option<f64>,
    last_end_time: Option<f64>,
    duplicate_urls: Vec<String>,
    malformed_entries: u32,
    orphan_events: u32,
}

impl Pass {
    fn observe(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::RequestWillBeSent {
                request_id,
                url,
                headers,
                timestamp,
            } => {
                // Non-network schemes (data:, blob:, chrome:) show up in
                // the same log; they are not resources we track.
                if !is_http_url(&url) {
                    return;
                }
                if self.resources.contains_key(&url) {
                    // First-seen wins; never overwrite the original.
                    self.duplicate_urls.push(url);
                    return;
                }
                if self.first_start_time.map_or(true, |t| timestamp < t) {
                    self.first_start_time = Some(timestamp);
                }
                self.resources
                    .insert(url, ResourceRecord::from_request(request_id, timestamp, headers));
            }

            NetworkEvent::ResponseReceived {
                url,
                status,
                status_text,
                headers_text,
                content_type,
            } => {
                if !is_http_url(&url) {
                    return;
                }
                let Some(record) = self.resources.get_mut(&url) else {
                    // Response for a request we never saw initiated.
                    self.orphan_events += 1;
                    return;
                };
                record.received = true;
                record.status = Some(status);
                record.status_text = Some(status_text);
                // Either field may legitimately be missing; keep whatever
                // was already there rather than clobbering with None.
                if headers_text.is_some() {
                    record.response_headers = headers_text;
                }
                if content_type.is_some() {
                    record.content_type = content_type;
                }
            }

            NetworkEvent::LoadingFinished {
                request_id,
                encoded_data_length,
                timestamp,
            } => {
                if self.last_end_time.map_or(true, |t| timestamp > t) {
                    self.last_end_time = Some(timestamp);
                }
                // The byte count grows as loading progresses; the latest
                // event for an id carries the final value, so last write
                // wins here.
                self.pending_finish.insert(
                    request_id,
                    PendingFinish {
                        body_size: encoded_data_length,
                        end_time: timestamp,
                    },
                );
            }

            NetworkEvent::WebSocketCreated { request_id, url } => {
                self.websockets
                    .entry(request_id)
                    .or_insert_with(|| WebSocketRecord::new(url));
            }

            NetworkEvent::WebSocketHandshakeRequest {
                request_id,
                headers,
            } => match self.websockets.get_mut(&request_id) {
                Some(socket) => socket.set_request_headers(headers),
                None => self.orphan_events += 1,
            },

            NetworkEvent::WebSocketHandshakeResponse {
                request_id,
                status,
                status_text,
                headers_text,
            } => match self.websockets.get_mut(&request_id) {
                Some(socket) => {
                    socket.received = true;
                    socket.status = Some(status);
                    socket.status_text = Some(status_text);
                    socket.response_headers = headers_text;
                }
                None => self.orphan_events += 1,
            },
        }
    }

    /// Post-scan reconciliation: attach finish data to every record
    /// sharing its request id, then re-key websocket records by URL and
    /// merge them into the table.
    fn finish(self) -> Result<Correlation, CorrelationError> {
        let Pass {
            mut resources,
            pending_finish,
            websockets,
            first_start_time,
            last_end_time,
            duplicate_urls,
            malformed_entries,
            orphan_events,
        } = self;

        if first_start_time.is_none() && last_end_time.is_none() {
            return Err(CorrelationError::NoTimingBaseline);
        }

        for record in resources.values_mut() {
            let Some(finish) = pending_finish.get(&record.request_id) else {
                continue;
            };
            record.body_size = Some(finish.body_size);
            record.end_time = Some(finish.end_time);
            if let Some(start) = record.start_time {
                let load_time = ((finish.end_time - start) * 1000.0) as i64;
                // A zero or negative duration means the clocks disagree;
                // drop it rather than store nonsense.
                record.load_time = (load_time > 0).then_some(load_time);
            }
        }

        let mut socket_overwrites = 0u32;
        for (request_id, socket) in websockets {
            let url = socket.url.clone();
            let record = socket.into_resource_record(request_id);
            if resources.insert(url.clone(), record).is_some() {
                // The upgrade exchange is authoritative for this URL.
                tracing::debug!("websocket record replaced http record at {}", url);
                socket_overwrites += 1;
            }
        }

        let page_load_time_ms = match (first_start_time, last_end_time) {
            (Some(start), Some(end)) => Some(((end - start) * 1000.0) as i64),
            _ => None,
        };

        Ok(Correlation {
            resources,
            page_load_time_ms,
            duplicate_urls,
            malformed_entries,
            orphan_events,
            socket_overwrites,
        })
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
