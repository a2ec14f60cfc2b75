use std::path::PathBuf;
use std::time::Duration;

use pricecrawl_core::{AppConfig, ExtractionPolicy};

/// Timing, retry and politeness constants for one crawl. Built once and
/// shared read-only by every component of a session.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub nav_timeout: Duration,
    /// Delay between page requests. Doubled between categories.
    pub page_delay: Duration,
    pub max_pages_per_category: u32,
    pub scroll_step_px: u32,
    pub scroll_max_iterations: u32,
    pub scroll_settle: Duration,
    /// Per-candidate wait in `wait_for_listing`.
    pub selector_timeout: Duration,
    pub selector_poll: Duration,
    /// Settle time after a pagination click before reading the page.
    pub pagination_settle: Duration,
    /// How many fallback links discovery validates at most.
    pub discovery_fallback_limit: usize,
    pub extraction_policy: ExtractionPolicy,
    pub vision_max_attempts: u32,
    pub vision_backoff: Duration,
    pub output_dir: PathBuf,
}

impl CrawlConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            nav_timeout: Duration::from_secs(config.nav_timeout_secs),
            page_delay: Duration::from_millis(config.page_delay_ms),
            max_pages_per_category: config.max_pages_per_category,
            scroll_step_px: 800,
            scroll_max_iterations: 15,
            scroll_settle: Duration::from_millis(400),
            selector_timeout: Duration::from_secs(5),
            selector_poll: Duration::from_millis(250),
            pagination_settle: Duration::from_millis(1500),
            discovery_fallback_limit: 25,
            extraction_policy: config.extraction_policy,
            vision_max_attempts: config.vision_max_attempts,
            vision_backoff: Duration::from_millis(config.vision_backoff_ms),
            output_dir: config.output_dir.clone(),
        }
    }

    /// No sleeps anywhere; for tests against stub pages.
    #[must_use]
    pub fn zero_delay(output_dir: PathBuf) -> Self {
        Self {
            nav_timeout: Duration::from_secs(5),
            page_delay: Duration::ZERO,
            max_pages_per_category: 20,
            scroll_step_px: 800,
            scroll_max_iterations: 3,
            scroll_settle: Duration::ZERO,
            selector_timeout: Duration::ZERO,
            selector_poll: Duration::ZERO,
            pagination_settle: Duration::ZERO,
            discovery_fallback_limit: 25,
            extraction_policy: ExtractionPolicy::default(),
            vision_max_attempts: 3,
            vision_backoff: Duration::ZERO,
            output_dir,
        }
    }

    #[must_use]
    pub fn category_delay(&self) -> Duration {
        self.page_delay * 2
    }
}
