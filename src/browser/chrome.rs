//! Headless Chrome session over the DevTools protocol
//!
//! Each session launches its own Chrome process against a throwaway
//! profile directory, so every task starts with an empty cookie jar.
//! Network events are forwarded off the protocol event streams into the
//! raw log as untyped entries; the correlator owns their interpretation.

use crate::browser::page::{extract_language, extract_links, extract_meta_description};
use crate::browser::{BrowserSession, BrowserVariant, PageCapture, SessionError, SessionFactory};
use crate::config::BrowserSettings;
use crate::devtools::{CookieRecord, LogEntry};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived, EventWebSocketCreated,
    EventWebSocketHandshakeResponseReceived, EventWebSocketWillSendHandshakeRequest, Headers,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::storage::GetCookiesParams;
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Launches one fresh [`ChromeSession`] per request.
///
/// The headless user agent is resolved once per factory and reused: a
/// throwaway browser is started to read its UA string, and the
/// `Headless` token is stripped so scanned sites see a normal Chrome.
pub struct ChromeSessionFactory {
    settings: BrowserSettings,
    headless_ua: OnceCell<Option<String>>,
}

impl ChromeSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            headless_ua: OnceCell::new(),
        }
    }

    /// Reads the user agent a headless launch would advertise, with the
    /// `Headless` token removed. Failure is tolerated: sessions then run
    /// with the stock UA.
    async fn headless_ua(&self) -> Option<String> {
        self.headless_ua
            .get_or_init(|| async {
                match resolve_headless_ua(&self.settings).await {
                    Ok(ua) => Some(ua),
                    Err(err) => {
                        tracing::warn!("could not resolve headless user agent: {}", err);
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn launch(
        &self,
        variant: BrowserVariant,
    ) -> Result<Box<dyn BrowserSession>, SessionError> {
        let ua = if variant.is_headless() {
            self.headless_ua().await
        } else {
            None
        };
        let session = ChromeSession::launch(&self.settings, variant, ua).await?;
        Ok(Box::new(session))
    }
}

async fn resolve_headless_ua(settings: &BrowserSettings) -> Result<String, SessionError> {
    let config = launch_config(settings, BrowserVariant::Chrome, None)?;
    let (mut browser, mut handler) = Browser::launch(config.0)
        .await
        .map_err(|e| SessionError::Launch(e.to_string()))?;
    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let version = browser
        .version()
        .await
        .map_err(|e| SessionError::Launch(e.to_string()));
    let _ = browser.close().await;
    let _ = browser.wait().await;
    handler_task.abort();

    Ok(version?.user_agent.replace("Headless", ""))
}

/// Builds the launch configuration plus the owned profile directory.
fn launch_config(
    settings: &BrowserSettings,
    variant: BrowserVariant,
    user_agent: Option<String>,
) -> Result<(BrowserConfig, TempDir), SessionError> {
    // A unique profile per session keeps cookie jars isolated between
    // tasks; the directory is deleted when the session drops.
    let profile_dir = tempfile::Builder::new()
        .prefix("webtrace-profile-")
        .tempdir()
        .map_err(|e| SessionError::Launch(format!("profile dir: {}", e)))?;

    let mut builder = BrowserConfig::builder()
        .arg("--mute-audio")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--window-size=1440,900")
        .arg(format!("--user-data-dir={}", profile_dir.path().display()));

    if !variant.is_headless() {
        builder = builder.with_head();
    }
    if settings.allow_insecure {
        builder = builder.arg("--allow-running-insecure-content");
    }
    if let Some(ua) = user_agent {
        builder = builder.arg(format!("--user-agent={}", ua));
    }
    if let Some(path) = &settings.chrome_binary {
        builder = builder.chrome_executable(path);
    }

    let config = builder
        .build()
        .map_err(|e| SessionError::Launch(format!("invalid browser configuration: {}", e)))?;
    Ok((config, profile_dir))
}

/// One live Chrome process plus the task driving its protocol handler.
pub struct ChromeSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    variant: BrowserVariant,
    page_timeout: Duration,
    dnt: bool,
    // Held for its Drop: removes the profile directory.
    _profile_dir: TempDir,
}

impl ChromeSession {
    async fn launch(
        settings: &BrowserSettings,
        variant: BrowserVariant,
        user_agent: Option<String>,
    ) -> Result<Self, SessionError> {
        let (config, profile_dir) = launch_config(settings, variant, user_agent)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        // The handler must be polled for the protocol connection to make
        // progress at all.
        let handler_task = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if let Err(err) = result {
                    tracing::debug!("browser handler: {}", err);
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            variant,
            page_timeout: Duration::from_secs(settings.page_timeout_seconds),
            dnt: settings.dnt,
            _profile_dir: profile_dir,
        })
    }

    /// Registers forwarders for the six tracked network events before
    /// navigation starts, so nothing early in the load is missed.
    async fn attach_network_log(
        &self,
        page: &Page,
        sink: &Arc<Mutex<Vec<LogEntry>>>,
    ) -> Result<Vec<JoinHandle<()>>, CdpError> {
        let mut tasks = Vec::with_capacity(6);
        forward::<EventRequestWillBeSent>(page, "Network.requestWillBeSent", sink, &mut tasks)
            .await?;
        forward::<EventResponseReceived>(page, "Network.responseReceived", sink, &mut tasks)
            .await?;
        forward::<EventLoadingFinished>(page, "Network.loadingFinished", sink, &mut tasks).await?;
        forward::<EventWebSocketCreated>(page, "Network.webSocketCreated", sink, &mut tasks)
            .await?;
        forward::<EventWebSocketWillSendHandshakeRequest>(
            page,
            "Network.webSocketWillSendHandshakeRequest",
            sink,
            &mut tasks,
        )
        .await?;
        forward::<EventWebSocketHandshakeResponseReceived>(
            page,
            "Network.webSocketHandshakeResponseReceived",
            sink,
            &mut tasks,
        )
        .await?;
        Ok(tasks)
    }

    async fn all_cookies(&self, page: &Page) -> Vec<CookieRecord> {
        // Storage.getCookies covers the whole profile, so third-party
        // cookies set by subresources are included.
        let response = match page.execute(GetCookiesParams::default()).await {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!("cookie read failed: {}", err);
                return Vec::new();
            }
        };
        response
            .result
            .cookies
            .iter()
            .filter_map(|cookie| {
                let value = serde_json::to_value(cookie).ok()?;
                parse_cookie(&value)
            })
            .collect()
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn load_and_capture(
        &mut self,
        url: &str,
        settle_wait: Duration,
    ) -> Result<PageCapture, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let sink = Arc::new(Mutex::new(Vec::new()));
        let forwarders = self
            .attach_network_log(&page, &sink)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        if self.dnt {
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::json!({"DNT": "1"}),
            )))
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        }

        // The hard page timeout is separate from the settle wait: it
        // bounds the navigation itself.
        let navigation = async {
            page.goto(url)
                .await
                .map_err(|e| SessionError::Navigation(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| SessionError::Navigation(e.to_string()))?;
            Ok::<(), SessionError>(())
        };
        match tokio::time::timeout(self.page_timeout, navigation).await {
            Ok(result) => result?,
            Err(_) => {
                for task in &forwarders {
                    task.abort();
                }
                return Err(SessionError::Timeout(self.page_timeout));
            }
        }

        // Scripts keep firing requests after the load event; give them
        // time to finish before the log is read.
        tokio::time::sleep(settle_wait).await;

        // A page-level javascript alert can make these reads fail; that
        // is a capture failure for the whole task.
        let final_url = page
            .url()
            .await
            .map_err(|e| SessionError::Capture(e.to_string()))?
            .unwrap_or_else(|| url.to_string());
        let title = page
            .get_title()
            .await
            .map_err(|e| SessionError::Capture(e.to_string()))?;
        let page_source = page
            .content()
            .await
            .map_err(|e| SessionError::Capture(e.to_string()))?;

        let cookies = self.all_cookies(&page).await;
        let browser_version = match self.browser.version().await {
            Ok(version) => Some(if self.variant.is_headless() {
                format!("{} [headless]", version.product)
            } else {
                version.product
            }),
            Err(_) => None,
        };

        for task in &forwarders {
            task.abort();
        }
        let log = sink.lock().map(|mut l| std::mem::take(&mut *l)).unwrap_or_default();
        let _ = page.close().await;

        let links = extract_links(&page_source, &final_url);
        let meta_description = extract_meta_description(&page_source);
        let language = extract_language(&page_source);

        Ok(PageCapture {
            log,
            final_url,
            title,
            meta_description,
            language,
            page_source,
            cookies,
            links,
            browser_version,
        })
    }

    async fn close(self: Box<Self>) {
        let mut this = *self;
        if let Err(err) = this.browser.close().await {
            tracing::debug!("browser close: {}", err);
        }
        let _ = this.browser.wait().await;
        this.handler_task.abort();
    }
}

/// Forwards one typed protocol event stream into the shared raw log.
async fn forward<T>(
    page: &Page,
    method: &'static str,
    sink: &Arc<Mutex<Vec<LogEntry>>>,
    tasks: &mut Vec<JoinHandle<()>>,
) -> Result<(), CdpError>
where
    T: IntoEventKind + Serialize + Unpin + Send + Sync + 'static,
{
    let mut stream = page.event_listener::<T>().await?;
    let sink = sink.clone();
    tasks.push(tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let params = serde_json::to_value(event.as_ref()).unwrap_or(Value::Null);
            if let Ok(mut log) = sink.lock() {
                log.push(LogEntry::new(method, params));
            }
        }
    }));
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    expires: Option<f64>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
}

fn parse_cookie(value: &Value) -> Option<CookieRecord> {
    let cookie: WireCookie = serde_json::from_value(value.clone()).ok()?;
    Some(CookieRecord {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        // Session cookies report a negative expiry on the wire.
        expiry: cookie.expires.filter(|e| *e > 0.0),
        secure: cookie.secure,
        http_only: cookie.http_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_cookie_maps_to_record() {
        let value = json!({
            "name": "sid",
            "value": "abc",
            "domain": ".tracker.example",
            "path": "/",
            "expires": 1900000000.0,
            "size": 7,
            "httpOnly": true,
            "secure": true,
            "session": false
        });
        let cookie = parse_cookie(&value).unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.domain, ".tracker.example");
        assert!(cookie.http_only);
        assert_eq!(cookie.expiry, Some(1900000000.0));
    }

    #[test]
    fn session_cookie_expiry_is_absent() {
        let value = json!({
            "name": "tmp",
            "value": "x",
            "domain": "site.example",
            "path": "/",
            "expires": -1.0
        });
        let cookie = parse_cookie(&value).unwrap();
        assert!(cookie.expiry.is_none());
    }
}
