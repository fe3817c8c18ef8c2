//! Raw protocol log entries and their typed event forms
//!
//! The browser session hands the correlator a flat sequence of `LogEntry`
//! values: the method name and untyped params of each DevTools message it
//! observed. This module turns each entry into a tagged `NetworkEvent`,
//! ignoring methods we do not track and rejecting structurally malformed
//! payloads without failing the whole log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One raw protocol message as captured by the browser session.
///
/// The bit-exact payload shape is owned by the session; the correlator only
/// requires that entries for the six tracked methods carry the fields the
/// protocol defines for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Protocol method, e.g. `Network.requestWillBeSent`.
    pub method: String,

    /// Method-specific payload.
    #[serde(default)]
    pub params: Value,
}

impl LogEntry {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// The six network events the correlator tracks, with kind-specific
/// payloads already extracted.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// A request is about to go on the wire.
    RequestWillBeSent {
        request_id: String,
        url: String,
        headers: BTreeMap<String, String>,
        timestamp: f64,
    },

    /// Response metadata arrived for a URL.
    ResponseReceived {
        url: String,
        status: i64,
        status_text: String,
        headers_text: Option<String>,
        content_type: Option<String>,
    },

    /// A request finished loading. Carries no URL; keyed by request id.
    LoadingFinished {
        request_id: String,
        encoded_data_length: i64,
        timestamp: f64,
    },

    /// A websocket was opened toward a URL.
    WebSocketCreated { request_id: String, url: String },

    /// Websocket handshake request headers.
    WebSocketHandshakeRequest {
        request_id: String,
        headers: BTreeMap<String, String>,
    },

    /// Websocket handshake response.
    WebSocketHandshakeResponse {
        request_id: String,
        status: i64,
        status_text: String,
        headers_text: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSentParams {
    request_id: String,
    request: RequestPayload,
    timestamp: f64,
}

#[derive(Deserialize)]
struct RequestPayload {
    url: String,
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
struct ResponseReceivedParams {
    response: ResponsePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePayload {
    url: String,
    status: i64,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
    #[serde(default)]
    headers_text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFinishedParams {
    request_id: String,
    timestamp: f64,
    #[serde(default)]
    encoded_data_length: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebSocketCreatedParams {
    request_id: String,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebSocketHandshakeRequestParams {
    request_id: String,
    request: WsRequestPayload,
}

#[derive(Deserialize)]
struct WsRequestPayload {
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebSocketHandshakeResponseParams {
    request_id: String,
    response: WsResponsePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsResponsePayload {
    status: i64,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    headers_text: Option<String>,
}

impl NetworkEvent {
    /// Parses a raw log entry.
    ///
    /// Returns `Ok(None)` for methods the correlator does not track and
    /// `Err` for a tracked method whose payload is malformed. Neither case
    /// aborts a correlation pass.
    pub fn from_entry(entry: &LogEntry) -> Result<Option<Self>, serde_json::Error> {
        let params = entry.params.clone();
        let event = match entry.method.as_str() {
            "Network.requestWillBeSent" => {
                let p: RequestWillBeSentParams = serde_json::from_value(params)?;
                NetworkEvent::RequestWillBeSent {
                    request_id: p.request_id,
                    url: p.request.url,
                    headers: header_map(&p.request.headers),
                    timestamp: p.timestamp,
                }
            }
            "Network.responseReceived" => {
                let p: ResponseReceivedParams = serde_json::from_value(params)?;
                let content_type = content_type_of(&p.response.headers);
                NetworkEvent::ResponseReceived {
                    url: p.response.url,
                    status: p.response.status,
                    status_text: p.response.status_text,
                    headers_text: p.response.headers_text,
                    content_type,
                }
            }
            "Network.loadingFinished" => {
                let p: LoadingFinishedParams = serde_json::from_value(params)?;
                NetworkEvent::LoadingFinished {
                    request_id: p.request_id,
                    encoded_data_length: p.encoded_data_length as i64,
                    timestamp: p.timestamp,
                }
            }
            "Network.webSocketCreated" => {
                let p: WebSocketCreatedParams = serde_json::from_value(params)?;
                NetworkEvent::WebSocketCreated {
                    request_id: p.request_id,
                    url: p.url,
                }
            }
            "Network.webSocketWillSendHandshakeRequest" => {
                let p: WebSocketHandshakeRequestParams = serde_json::from_value(params)?;
                NetworkEvent::WebSocketHandshakeRequest {
                    request_id: p.request_id,
                    headers: header_map(&p.request.headers),
                }
            }
            "Network.webSocketHandshakeResponseReceived" => {
                let p: WebSocketHandshakeResponseParams = serde_json::from_value(params)?;
                NetworkEvent::WebSocketHandshakeResponse {
                    request_id: p.request_id,
                    status: p.response.status,
                    status_text: p.response.status_text,
                    headers_text: p.response.headers_text,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Flattens a protocol header object into name -> value strings. The
/// protocol occasionally carries non-string values; those are rendered
/// rather than dropped.
fn header_map(raw: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    raw.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn content_type_of(headers: &serde_json::Map<String, Value>) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, v)| v.as_str())
        .map(|s| s.to_string())
}
