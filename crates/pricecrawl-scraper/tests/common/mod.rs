//! In-memory browser pages serving fixture HTML by exact URL.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pricecrawl_core::{parse_retailers, RetailerAdapter};
use pricecrawl_scraper::{
    BrowserPage, CapturedResponse, CrawlConfig, PageFactory, PageResponse, ResponseSubscription,
    ScraperError,
};
use scraper::{Html, Selector};

pub const BASE: &str = "https://testmart.example";

#[derive(Debug, Clone)]
struct Route {
    status: u16,
    html: String,
    /// Loads that succeed before every further load times out.
    ok_visits: Option<usize>,
    captures: Vec<CapturedResponse>,
}

/// Fixture pages keyed by absolute URL. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StubSite {
    routes: HashMap<String, Route>,
    /// What `screenshot_png` returns; pages have no pixels when unset.
    pixels: Option<Vec<u8>>,
}

impl StubSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                status: 200,
                html: html.to_string(),
                ok_visits: None,
                captures: Vec::new(),
            },
        );
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                status,
                html: String::new(),
                ok_visits: None,
                captures: Vec::new(),
            },
        );
        self
    }

    /// Serves `html` for the first `ok_visits` loads, then times out.
    pub fn flaky(mut self, url: &str, html: &str, ok_visits: usize) -> Self {
        self = self.page(url, html);
        if let Some(route) = self.routes.get_mut(url) {
            route.ok_visits = Some(ok_visits);
        }
        self
    }

    /// Every screenshot returns `png`.
    pub fn pixels(mut self, png: Vec<u8>) -> Self {
        self.pixels = Some(png);
        self
    }

    /// Responses the page "fetches" every time `url` is loaded.
    pub fn captures(mut self, url: &str, captures: Vec<CapturedResponse>) -> Self {
        if let Some(route) = self.routes.get_mut(url) {
            route.captures = captures;
        }
        self
    }
}

#[derive(Clone)]
pub struct StubFactory {
    site: Arc<StubSite>,
    requests: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl StubFactory {
    pub fn new(site: StubSite) -> Self {
        Self {
            site: Arc::new(site),
            requests: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn visits(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| *r == url).count()
    }

    pub fn page_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFactory for StubFactory {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScraperError> {
        Ok(Box::new(StubPage {
            site: Arc::clone(&self.site),
            requests: Arc::clone(&self.requests),
            closed: Arc::clone(&self.closed),
            current_url: "about:blank".to_string(),
            current_html: String::new(),
            listening: Mutex::new(None),
            captured: Arc::default(),
        }))
    }
}

struct StubPage {
    site: Arc<StubSite>,
    requests: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    current_url: String,
    current_html: String,
    listening: Mutex<Option<Vec<String>>>,
    captured: Arc<Mutex<Vec<CapturedResponse>>>,
}

#[async_trait]
impl BrowserPage for StubPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<PageResponse, ScraperError> {
        let visit = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(url.to_string());
            requests.iter().filter(|r| *r == url).count()
        };

        let Some(route) = self.site.routes.get(url) else {
            self.current_url = url.to_string();
            self.current_html = "<html><body><h1>404</h1></body></html>".to_string();
            return Ok(PageResponse {
                status: Some(404),
                final_url: url.to_string(),
            });
        };
        if route.ok_visits.is_some_and(|ok| visit > ok) {
            return Err(ScraperError::NavigationTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }

        self.current_url = url.to_string();
        self.current_html.clone_from(&route.html);
        if let Some(patterns) = self.listening.lock().unwrap().as_ref() {
            let mut buffer = self.captured.lock().unwrap();
            buffer.extend(
                route
                    .captures
                    .iter()
                    .filter(|c| patterns.iter().any(|p| c.url.contains(p)))
                    .cloned(),
            );
        }
        Ok(PageResponse {
            status: Some(route.status),
            final_url: url.to_string(),
        })
    }

    async fn content(&self) -> Result<String, ScraperError> {
        Ok(self.current_html.clone())
    }

    async fn current_url(&self) -> Result<String, ScraperError> {
        Ok(self.current_url.clone())
    }

    async fn click(&self, _selector: &str) -> Result<bool, ScraperError> {
        Ok(false)
    }

    async fn click_text(&self, _selector: &str, _text: &str) -> Result<bool, ScraperError> {
        Ok(false)
    }

    async fn selector_exists(&self, selector: &str) -> Result<bool, ScraperError> {
        let selector =
            Selector::parse(selector).map_err(|e| ScraperError::Browser(e.to_string()))?;
        let found = Html::parse_document(&self.current_html)
            .select(&selector)
            .next()
            .is_some();
        Ok(found)
    }

    async fn scroll_height(&self) -> Result<u64, ScraperError> {
        Ok(1000)
    }

    async fn scroll_by(&self, _pixels: u32) -> Result<(), ScraperError> {
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, ScraperError> {
        self.site
            .pixels
            .clone()
            .ok_or_else(|| ScraperError::Browser("stub pages have no pixels".to_string()))
    }

    async fn listen_responses(
        &self,
        url_patterns: &[String],
    ) -> Result<ResponseSubscription, ScraperError> {
        *self.listening.lock().unwrap() = Some(url_patterns.to_vec());
        Ok(ResponseSubscription::detached(Arc::clone(&self.captured)))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The Test Mart adapter with category paths `/c/{name}`.
pub fn test_mart() -> RetailerAdapter {
    test_mart_with(&[], &[])
}

/// Test Mart with extra seed categories and product API patterns.
pub fn test_mart_with(seeds: &[(&str, &str)], api_patterns: &[&str]) -> RetailerAdapter {
    let mut adapter = parse_retailers(&format!(
        r#"
retailers:
  - name: Test Mart
    base_url: {BASE}
    listing_url: {BASE}/shop
    category_path_pattern: "^/c/[a-z]+$"
    nav_link_selectors: ["nav a"]
    selectors:
      card: [".product-card"]
      name: [".name"]
      price: [".price"]
      link: ["a"]
      code_attribute: data-sku
"#
    ))
    .unwrap()
    .retailers
    .remove(0);
    adapter.seed_categories = seeds
        .iter()
        .map(|(name, url)| pricecrawl_core::SeedCategory {
            name: (*name).to_string(),
            url: (*url).to_string(),
        })
        .collect();
    adapter.api_path_patterns = api_patterns.iter().map(|p| (*p).to_string()).collect();
    adapter
}

pub fn config(output_dir: &Path) -> CrawlConfig {
    CrawlConfig::zero_delay(output_dir.to_path_buf())
}

/// A 4x4 PNG, enough for the vision client to decode and downsize.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([240, 240, 240]));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

pub fn card(sku: &str, name: &str, price: &str) -> String {
    format!(
        r#"<div class="product-card" data-sku="{sku}">
  <a href="/p/{sku}"><span class="name">{name}</span></a>
  <span class="price">{price}</span>
</div>"#
    )
}

pub fn listing(cards: &[String]) -> String {
    format!(
        "<html><body><main class=\"grid\">{}</main></body></html>",
        cards.concat()
    )
}

pub fn shop_page(nav_links: &[&str]) -> String {
    let links: String = nav_links
        .iter()
        .map(|href| format!("<a href=\"{href}\">{}</a>", href.trim_start_matches("/c/")))
        .collect();
    format!("<html><body><nav>{links}</nav><p>Welcome to Test Mart</p></body></html>")
}
