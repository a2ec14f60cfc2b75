//! Browser-automation seam.
//!
//! The navigator and everything above it talk to [`BrowserPage`] only, so a
//! crawl runs the same against Chromium and against in-memory stub pages.

pub mod chromium;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::ScraperError;

/// What a navigation settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// Status of the main document response; `None` when nothing answered.
    pub status: Option<u16>,
    pub final_url: String,
}

/// A completed response captured by a [`ResponseSubscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    pub body: String,
}

impl CapturedResponse {
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mime_type.contains("json")
            || matches!(self.body.trim_start().chars().next(), Some('{' | '['))
    }
}

/// Creates pages on a shared browser. One page per crawl session.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScraperError>;
}

/// One browser tab.
///
/// Methods other than `goto` and `close` report missing elements as `false`
/// or empty values rather than errors.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigates and waits for the load to settle, bounded by `timeout`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<PageResponse, ScraperError>;

    /// Serialized DOM of the current page.
    async fn content(&self) -> Result<String, ScraperError>;

    async fn current_url(&self) -> Result<String, ScraperError>;

    /// Clicks the first element matching `selector`. `Ok(false)` when none does.
    async fn click(&self, selector: &str) -> Result<bool, ScraperError>;

    /// Clicks the first element matching `selector` whose trimmed text equals `text`.
    async fn click_text(&self, selector: &str, text: &str) -> Result<bool, ScraperError>;

    async fn selector_exists(&self, selector: &str) -> Result<bool, ScraperError>;

    async fn scroll_height(&self) -> Result<u64, ScraperError>;

    async fn scroll_by(&self, pixels: u32) -> Result<(), ScraperError>;

    /// PNG of the current viewport.
    async fn screenshot_png(&self) -> Result<Vec<u8>, ScraperError>;

    /// Starts recording completed responses whose URL contains any of `url_patterns`.
    async fn listen_responses(
        &self,
        url_patterns: &[String],
    ) -> Result<ResponseSubscription, ScraperError>;

    async fn close(self: Box<Self>) -> Result<(), ScraperError>;
}

/// Passive capture of matching responses for one page session.
///
/// The listener task lives until [`ResponseSubscription::release`] is called
/// or the subscription is dropped.
#[derive(Debug)]
pub struct ResponseSubscription {
    buffer: Arc<Mutex<Vec<CapturedResponse>>>,
    task: Option<JoinHandle<()>>,
}

impl ResponseSubscription {
    #[must_use]
    pub fn new(buffer: Arc<Mutex<Vec<CapturedResponse>>>, task: JoinHandle<()>) -> Self {
        Self {
            buffer,
            task: Some(task),
        }
    }

    /// A subscription fed directly through `buffer`, with no listener task.
    #[must_use]
    pub fn detached(buffer: Arc<Mutex<Vec<CapturedResponse>>>) -> Self {
        Self { buffer, task: None }
    }

    /// Takes everything captured since the previous drain.
    #[must_use]
    pub fn drain(&self) -> Vec<CapturedResponse> {
        let mut guard = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }

    /// Stops listening and discards anything not yet drained.
    pub fn release(mut self) {
        self.stop();
        drop(self.drain());
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ResponseSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
