//! Chromium implementation of the browser seam, over the DevTools protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;

use super::{BrowserPage, CapturedResponse, PageFactory, PageResponse, ResponseSubscription};
use crate::error::ScraperError;

fn browser_err(context: &str, e: impl std::fmt::Display) -> ScraperError {
    ScraperError::Browser(format!("{context}: {e}"))
}

/// A launched Chromium process plus the task driving its CDP connection.
pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launches a local Chromium.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Browser`] if no Chromium executable is found or
    /// the process fails to start.
    pub async fn launch(headless: bool, request_timeout: Duration) -> Result<Self, ScraperError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(request_timeout)
            .window_size(1366, 900);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| browser_err("invalid browser config", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| browser_err("failed to launch chromium", e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "chromium handler stopped");
                    break;
                }
            }
        });

        tracing::info!(headless, "chromium launched");
        Ok(Self { browser, handler })
    }

    /// Closes the browser process.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Browser`] if the close command fails.
    pub async fn shutdown(mut self) -> Result<(), ScraperError> {
        let result = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        result
            .map(|_| ())
            .map_err(|e| browser_err("failed to close chromium", e))
    }
}

#[async_trait]
impl PageFactory for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScraperError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_err("failed to open page", e))?;
        if let Err(e) = page.execute(EnableParams::default()).await {
            tracing::warn!(error = %e, "failed to enable network domain");
        }
        Ok(Box::new(ChromiumPage { page }))
    }
}

pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T, ScraperError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| browser_err("script evaluation failed", e))?
            .into_value::<T>()
            .map_err(|e| browser_err("unexpected script result", e))
    }
}

/// JSON-quotes `s` for interpolation into a script.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<PageResponse, ScraperError> {
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| browser_err("failed to subscribe to responses", e))?;

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => {
                return Err(ScraperError::NavigationTimeout {
                    url: url.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
            Ok(Err(e)) => return Err(browser_err(&format!("navigation to {url} failed"), e)),
            Ok(Ok(_)) => {}
        }

        // The last document response is the post-redirect main frame.
        let mut status = None;
        while let Some(Some(event)) = events.next().now_or_never() {
            if event.r#type == ResourceType::Document {
                status = u16::try_from(event.response.status).ok();
            }
        }

        let final_url = self.current_url().await.unwrap_or_else(|_| url.to_string());
        Ok(PageResponse { status, final_url })
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.page
            .content()
            .await
            .map_err(|e| browser_err("failed to read page content", e))
    }

    async fn current_url(&self) -> Result<String, ScraperError> {
        self.page
            .url()
            .await
            .map_err(|e| browser_err("failed to read page url", e))?
            .ok_or_else(|| ScraperError::Browser("page has no url".to_string()))
    }

    async fn click(&self, selector: &str) -> Result<bool, ScraperError> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        Ok(element.click().await.is_ok())
    }

    async fn click_text(&self, selector: &str, text: &str) -> Result<bool, ScraperError> {
        let script = format!(
            "(() => {{ const el = Array.from(document.querySelectorAll({sel})) \
             .find(e => e.textContent.trim() === {text}); \
             if (!el) return false; el.click(); return true; }})()",
            sel = js_string(selector),
            text = js_string(text),
        );
        self.eval(&script).await
    }

    async fn selector_exists(&self, selector: &str) -> Result<bool, ScraperError> {
        let script = format!(
            "(() => {{ try {{ return document.querySelector({}) !== null; }} \
             catch (e) {{ return false; }} }})()",
            js_string(selector)
        );
        self.eval(&script).await
    }

    async fn scroll_height(&self) -> Result<u64, ScraperError> {
        self.eval("document.body ? document.body.scrollHeight : 0").await
    }

    async fn scroll_by(&self, pixels: u32) -> Result<(), ScraperError> {
        self.page
            .evaluate(format!("window.scrollBy(0, {pixels})"))
            .await
            .map(|_| ())
            .map_err(|e| browser_err("scroll failed", e))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, ScraperError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| browser_err("screenshot failed", e))
    }

    async fn listen_responses(
        &self,
        url_patterns: &[String],
    ) -> Result<ResponseSubscription, ScraperError> {
        let mut received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| browser_err("failed to subscribe to responses", e))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| browser_err("failed to subscribe to loading events", e))?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| browser_err("failed to subscribe to loading failures", e))?;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let page = self.page.clone();
        let mut pending = PendingResponses::new(url_patterns.to_vec());

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = received.next() => {
                        pending.on_response(
                            event.request_id.inner(),
                            &event.response.url,
                            u16::try_from(event.response.status).unwrap_or(0),
                            &event.response.mime_type,
                        );
                    }
                    Some(event) = failed.next() => {
                        if let Some(head) = pending.on_failed(event.request_id.inner()) {
                            tracing::debug!(url = %head.url, error = %event.error_text, "captured request failed");
                        }
                    }
                    Some(event) = finished.next() => {
                        let Some(head) = pending.on_finished(event.request_id.inner()) else {
                            continue;
                        };
                        match page.execute(GetResponseBodyParams::new(event.request_id.clone())).await {
                            Ok(resp) => {
                                let body = if resp.result.base64_encoded {
                                    base64::engine::general_purpose::STANDARD
                                        .decode(&resp.result.body)
                                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                                        .unwrap_or_default()
                                } else {
                                    resp.result.body.clone()
                                };
                                sink.lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(CapturedResponse {
                                        url: head.url,
                                        status: head.status,
                                        mime_type: head.mime_type,
                                        body,
                                    });
                            }
                            Err(e) => {
                                tracing::debug!(url = %head.url, error = %e, "response body unavailable");
                            }
                        }
                    }
                    else => break,
                }
            }
        });

        Ok(ResponseSubscription::new(buffer, task))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        self.page
            .close()
            .await
            .map_err(|e| browser_err("failed to close page", e))
    }
}

/// Status line of a matching response whose body has not finished loading.
#[derive(Debug, PartialEq, Eq)]
struct ResponseHead {
    url: String,
    status: u16,
    mime_type: String,
}

/// Matching responses keyed by request id, held until their body finishes
/// loading or the request fails.
struct PendingResponses {
    patterns: Vec<String>,
    by_request: HashMap<String, ResponseHead>,
}

impl PendingResponses {
    fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns,
            by_request: HashMap::new(),
        }
    }

    fn on_response(&mut self, request_id: &str, url: &str, status: u16, mime_type: &str) {
        if self.patterns.iter().any(|p| url.contains(p.as_str())) {
            self.by_request.insert(
                request_id.to_string(),
                ResponseHead {
                    url: url.to_string(),
                    status,
                    mime_type: mime_type.to_string(),
                },
            );
        }
    }

    fn on_finished(&mut self, request_id: &str) -> Option<ResponseHead> {
        self.by_request.remove(request_id)
    }

    fn on_failed(&mut self, request_id: &str) -> Option<ResponseHead> {
        self.by_request.remove(request_id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_request.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingResponses {
        PendingResponses::new(vec!["/api/products".to_string()])
    }

    #[test]
    fn only_matching_responses_are_held() {
        let mut p = pending();
        p.on_response("1", "https://shop.example/api/products?page=2", 200, "application/json");
        p.on_response("2", "https://shop.example/static/app.js", 200, "text/javascript");
        assert_eq!(p.len(), 1);

        let head = p.on_finished("1").unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.mime_type, "application/json");
        assert_eq!(p.len(), 0);
    }

    #[test]
    fn failed_requests_are_dropped() {
        let mut p = pending();
        p.on_response("7", "https://shop.example/api/products", 200, "application/json");
        assert!(p.on_failed("7").is_some());
        assert_eq!(p.len(), 0);
        assert!(p.on_finished("7").is_none());
    }

    #[test]
    fn unknown_request_ids_are_ignored() {
        let mut p = pending();
        assert!(p.on_finished("missing").is_none());
        assert!(p.on_failed("missing").is_none());
    }
}
