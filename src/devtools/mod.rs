//! DevTools event model and correlation engine
//!
//! This module contains the core of webtrace:
//! - Parsing raw protocol log entries into typed network events
//! - Correlating the flat event stream into per-resource records
//! - The output records handed to the result store

mod correlate;
mod event;
mod record;

pub use correlate::{correlate, Correlation, CorrelationError};
pub use event::{LogEntry, NetworkEvent};
pub use record::{CookieRecord, PageLink, PageScanResult, ResourceRecord};
