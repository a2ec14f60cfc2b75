//! One browser session's navigation primitives.
//!
//! Only navigation timeouts and hard URL failures propagate. Popup and
//! selector misses are logged at debug and swallowed.

use std::sync::Arc;

use pricecrawl_core::RetailerAdapter;
use tokio::time::{sleep, Instant};
use url::Url;

use crate::browser::{BrowserPage, PageResponse};
use crate::crawl_config::CrawlConfig;
use crate::error::ScraperError;

/// Tried after every adapter listing selector has missed.
const GENERIC_LISTING_SELECTORS: &[&str] = &[
    "[data-product-id]",
    "[itemtype*='Product']",
    "[class*='product-card']",
    "[class*='product']",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub final_url: String,
    pub error: Option<String>,
}

impl ValidationResult {
    fn from_response(response: PageResponse) -> Self {
        match response.status {
            None => Self {
                ok: false,
                status: None,
                final_url: response.final_url,
                error: Some("no response".to_string()),
            },
            Some(status) if status >= 400 => Self {
                ok: false,
                status: Some(status),
                final_url: response.final_url,
                error: Some(format!("HTTP {status}")),
            },
            Some(status) => Self {
                ok: true,
                status: Some(status),
                final_url: response.final_url,
                error: None,
            },
        }
    }

    /// Converts a failed validation into [`ScraperError::UrlValidation`].
    ///
    /// # Errors
    ///
    /// Returns the validation failure for `url` when `ok` is `false`.
    pub fn into_result(self, url: &str) -> Result<Self, ScraperError> {
        if self.ok {
            Ok(self)
        } else {
            Err(ScraperError::UrlValidation {
                url: url.to_string(),
                status: self.status,
                reason: self.error.unwrap_or_else(|| "unknown".to_string()),
            })
        }
    }
}

pub struct Navigator {
    page: Box<dyn BrowserPage>,
    adapter: Arc<RetailerAdapter>,
    config: Arc<CrawlConfig>,
}

impl Navigator {
    #[must_use]
    pub fn new(
        page: Box<dyn BrowserPage>,
        adapter: Arc<RetailerAdapter>,
        config: Arc<CrawlConfig>,
    ) -> Self {
        Self {
            page,
            adapter,
            config,
        }
    }

    #[must_use]
    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Navigates to `url` and reports whether it answered below 400.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::NavigationTimeout`] if the page does not settle
    /// in time. Other browser failures are folded into a failed result.
    pub async fn probe(&mut self, url: &str) -> Result<ValidationResult, ScraperError> {
        match self.page.goto(url, self.config.nav_timeout).await {
            Ok(response) => Ok(ValidationResult::from_response(response)),
            Err(e @ ScraperError::NavigationTimeout { .. }) => Err(e),
            Err(e) => Ok(ValidationResult {
                ok: false,
                status: None,
                final_url: url.to_string(),
                error: Some(e.to_string()),
            }),
        }
    }

    /// Navigates to `url`, failing on an error status or no response.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::NavigationTimeout`] if the page does not settle.
    /// - [`ScraperError::UrlValidation`] on a status of 400 or above, or no response.
    pub async fn open(&mut self, url: &str) -> Result<ValidationResult, ScraperError> {
        let result = self.probe(url).await?.into_result(url)?;
        tracing::debug!(url, status = ?result.status, final_url = %result.final_url, "page opened");
        Ok(result)
    }

    /// Clicks every configured dismiss control that is present. Best effort.
    pub async fn dismiss_popups(&self) -> usize {
        let mut dismissed = 0;
        for selector in &self.adapter.popup_dismiss_selectors {
            match self.page.click(selector).await {
                Ok(true) => {
                    dismissed += 1;
                    tracing::debug!(selector = %selector, "dismissed popup");
                    sleep(self.config.scroll_settle).await;
                }
                Ok(false) => {}
                Err(e) => tracing::debug!(selector = %selector, error = %e, "popup dismiss failed"),
            }
        }
        dismissed
    }

    /// Scrolls in fixed steps until the page stops growing or the iteration
    /// cap is hit. Returns the number of steps taken.
    pub async fn scroll_to_load(&self) -> u32 {
        let mut last_height = match self.page.scroll_height().await {
            Ok(h) => h,
            Err(e) => {
                tracing::debug!(error = %e, "scroll height unavailable");
                return 0;
            }
        };

        let mut steps = 0;
        while steps < self.config.scroll_max_iterations {
            if let Err(e) = self.page.scroll_by(self.config.scroll_step_px).await {
                tracing::debug!(error = %e, "scroll failed");
                break;
            }
            steps += 1;
            sleep(self.config.scroll_settle).await;

            let height = self.page.scroll_height().await.unwrap_or(last_height);
            if height <= last_height {
                break;
            }
            last_height = height;
        }
        steps
    }

    /// Waits for the first listing candidate to appear, then tries generic
    /// product-like selectors. Never fails.
    pub async fn wait_for_listing(&self, candidates: &[String]) -> bool {
        for selector in candidates {
            if self.wait_for_selector(selector).await {
                return true;
            }
        }
        for selector in GENERIC_LISTING_SELECTORS {
            if self.page.selector_exists(selector).await.unwrap_or(false) {
                tracing::debug!(selector, "listing matched generic fallback");
                return true;
            }
        }
        false
    }

    async fn wait_for_selector(&self, selector: &str) -> bool {
        let deadline = Instant::now() + self.config.selector_timeout;
        loop {
            match self.page.selector_exists(selector).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(selector, error = %e, "selector check failed");
                    return false;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.selector_poll).await;
        }
    }

    /// Moves to 1-based page `page_number`: clicks a pagination control
    /// labelled with the number, else rewrites the page query parameter
    /// and re-navigates. `Ok(false)` means there is no further page.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::NavigationTimeout`] if the next page does not
    /// settle in time.
    pub async fn go_to_page(&mut self, page_number: u32) -> Result<bool, ScraperError> {
        let label = page_number.to_string();
        for selector in &self.adapter.selectors.pagination {
            if matches!(self.page.click_text(selector, &label).await, Ok(true)) {
                tracing::debug!(page = page_number, selector = %selector, "paginated by click");
                sleep(self.config.pagination_settle).await;
                return Ok(true);
            }
        }

        let current = match self.page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, "current url unavailable for pagination");
                return Ok(false);
            }
        };
        let value = self.adapter.page_param_value(page_number);
        let Some(next) = with_page_param(&current, &self.adapter.page_param, value) else {
            return Ok(false);
        };

        match self.open(&next).await {
            Ok(_) => Ok(true),
            Err(e @ ScraperError::NavigationTimeout { .. }) => Err(e),
            Err(e) => {
                tracing::debug!(url = %next, error = %e, "pagination by url failed");
                Ok(false)
            }
        }
    }

    /// Full serialized DOM of the current page.
    ///
    /// # Errors
    ///
    /// Propagates browser failures.
    pub async fn content(&self) -> Result<String, ScraperError> {
        self.page.content().await
    }

    /// # Errors
    ///
    /// Propagates browser failures.
    pub async fn current_url(&self) -> Result<String, ScraperError> {
        self.page.current_url().await
    }

    /// # Errors
    ///
    /// Propagates the browser's close failure.
    pub async fn close(self) -> Result<(), ScraperError> {
        self.page.close().await
    }
}

/// `url` with `param` set to `value`, replacing any existing occurrence.
#[must_use]
pub fn with_page_param(url: &str, param: &str, value: u32) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, &value.to_string());
    Some(parsed.into())
}
