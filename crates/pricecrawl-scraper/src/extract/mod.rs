//! The three extraction strategies behind one `extract` call.

pub mod dom;
pub mod network;
pub mod vision;

use std::sync::LazyLock;

use pricecrawl_core::{ExtractionPolicy, RetailerAdapter};
use regex::Regex;

use crate::browser::CapturedResponse;
use crate::error::ScraperError;
use crate::navigator::Navigator;
use crate::record::RawRecord;

pub use vision::VisionExtractor;

/// Text a listing page shows when a category or search has nothing in it.
static NO_RESULTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bno (?:results|products|items)\b|\b0 (?:results|products|items)\b|nothing matched|page not found|could not be found",
    )
    .expect("static no-results regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// JSON bodies captured from the retailer's own product APIs.
    Network,
    /// Selector heuristics over the rendered DOM.
    Dom,
    /// Screenshot read by a vision model.
    Vision,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Network => write!(f, "network"),
            Strategy::Dom => write!(f, "dom"),
            Strategy::Vision => write!(f, "vision"),
        }
    }
}

/// Everything a strategy may read for one listing page.
pub struct ExtractionContext<'a> {
    pub navigator: &'a Navigator,
    pub adapter: &'a RetailerAdapter,
    /// Responses captured since the previous page was extracted.
    pub captures: &'a [CapturedResponse],
    pub vision: Option<&'a VisionExtractor>,
    pub page_url: &'a str,
}

impl Strategy {
    /// Runs this strategy against the current page. Empty output is zero
    /// yield, not an error.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Browser`] if the page cannot be read.
    /// - [`ScraperError::Extraction`] if the vision model answered with neither
    ///   products nor a recognizable empty-page description.
    pub async fn extract(self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ScraperError> {
        match self {
            Strategy::Network => Ok(network::extract(ctx.captures)),
            Strategy::Dom => {
                let html = ctx.navigator.content().await?;
                Ok(dom::extract(&html, ctx.adapter))
            }
            Strategy::Vision => match ctx.vision {
                Some(vision) => vision.extract(ctx.navigator.page(), ctx.page_url).await,
                None => Ok(Vec::new()),
            },
        }
    }
}

/// Order strategies are consulted in. The first one with output wins.
/// Captured responses are always consulted first; the policy only decides
/// whether vision goes before or after the DOM heuristic.
#[must_use]
pub fn strategy_order(policy: ExtractionPolicy, vision_enabled: bool) -> Vec<Strategy> {
    let order: &[Strategy] = match policy {
        ExtractionPolicy::VisionLastResort => &[Strategy::Network, Strategy::Dom, Strategy::Vision],
        ExtractionPolicy::VisionPrimary => &[Strategy::Network, Strategy::Vision, Strategy::Dom],
    };
    order
        .iter()
        .copied()
        .filter(|s| vision_enabled || *s != Strategy::Vision)
        .collect()
}

/// `true` when the page text says there is nothing to list.
#[must_use]
pub fn page_looks_empty(html: &str) -> bool {
    NO_RESULTS_RE.is_match(html)
}
