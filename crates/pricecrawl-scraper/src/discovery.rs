//! Builds and validates the category frontier for one store.
//!
//! Candidates come from the adapter's seed categories first, then from
//! navigation links on the store's listing page. Each candidate is opened and
//! kept only if it looks like a product listing. When nothing survives, any
//! link on the listing page that matches the store's category-path regex is
//! tried, up to a fixed limit.

use std::collections::HashSet;
use std::sync::LazyLock;

use pricecrawl_core::{CategoryUrl, RetailerAdapter};
use regex::Regex;
use scraper::{Html, Selector};
use tokio::time::sleep;
use url::Url;

use crate::error::ScraperError;
use crate::extract::{dom, page_looks_empty};
use crate::navigator::Navigator;

static SHOWING_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)showing\s+(?:\d[\d,]*\s*(?:-|–|to)\s*)?\d[\d,]*\s+of\s+(\d[\d,]*)")
        .expect("static showing regex")
});

static RESULT_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*)\s+(?:results|products|items)\b").expect("static count regex")
});

/// Parses "showing X of Y" or "N results" text into a product count.
#[must_use]
pub fn estimate_product_count(text: &str) -> Option<u32> {
    let caps = SHOWING_OF_RE
        .captures(text)
        .or_else(|| RESULT_COUNT_RE.captures(text))?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Resolves `href` and keeps it only if it is on the store's site and its
/// path matches `pattern`. Fragments are dropped.
fn category_link(base: &Url, pattern: &Regex, href: &str) -> Option<Url> {
    let mut url = base.join(href.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if strip_www(url.host_str()?) != strip_www(base.host_str()?) {
        return None;
    }
    if !pattern.is_match(url.path()) {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Readable name for a link without text: its last path segment.
fn name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|s| s.replace(['-', '_'], " "))
        .unwrap_or_else(|| url.path().to_string())
}

/// Category links found by `selectors` in `html`, de-duplicated by URL, in
/// document order.
#[must_use]
pub fn scrape_category_links(
    html: &str,
    selectors: &[String],
    base: &Url,
    pattern: &Regex,
) -> Vec<CategoryUrl> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            tracing::debug!(selector = %raw, "skipping unparsable nav selector");
            continue;
        };
        for el in document.select(&selector) {
            let Some(url) = el
                .value()
                .attr("href")
                .and_then(|href| category_link(base, pattern, href))
            else {
                continue;
            };
            if !seen.insert(url.to_string()) {
                continue;
            }
            let text = el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            let name = if text.is_empty() { name_from_url(&url) } else { text };
            links.push(CategoryUrl {
                name,
                url: url.into(),
                estimated_product_count: None,
            });
        }
    }
    links
}

pub struct Discovery<'a> {
    adapter: &'a RetailerAdapter,
    base: Url,
    pattern: Regex,
    fallback_limit: usize,
}

impl<'a> Discovery<'a> {
    /// # Errors
    ///
    /// Returns [`ScraperError::UrlValidation`] if the adapter's base URL or
    /// category pattern does not parse.
    pub fn new(adapter: &'a RetailerAdapter, fallback_limit: usize) -> Result<Self, ScraperError> {
        let invalid = |reason: String| ScraperError::UrlValidation {
            url: adapter.base_url.clone(),
            status: None,
            reason,
        };
        let base = Url::parse(&adapter.base_url).map_err(|e| invalid(e.to_string()))?;
        let pattern =
            Regex::new(&adapter.category_path_pattern).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            adapter,
            base,
            pattern,
            fallback_limit,
        })
    }

    /// Returns validated categories, seeds first. Empty when nothing validated.
    /// Every candidate request waits the configured page delay first.
    pub async fn discover(&self, nav: &mut Navigator) -> Vec<CategoryUrl> {
        let store = self.adapter.slug();
        let listing_html = self.load_listing(nav).await;

        let mut candidates: Vec<CategoryUrl> = self
            .adapter
            .seed_categories
            .iter()
            .filter_map(|seed| {
                let url = self.base.join(&seed.url).ok()?;
                Some(CategoryUrl {
                    name: seed.name.clone(),
                    url: url.into(),
                    estimated_product_count: None,
                })
            })
            .collect();
        if let Some(html) = listing_html.as_deref() {
            candidates.extend(scrape_category_links(
                html,
                &self.adapter.nav_link_selectors,
                &self.base,
                &self.pattern,
            ));
        }
        let candidates = dedup_by_url(candidates);
        tracing::info!(store = %store, candidates = candidates.len(), "validating category candidates");

        let mut validated = self.validate_all(nav, candidates).await;
        if validated.is_empty() {
            if let Some(html) = listing_html.as_deref() {
                let mut fallback =
                    scrape_category_links(html, &["a[href]".to_string()], &self.base, &self.pattern);
                fallback.truncate(self.fallback_limit);
                tracing::warn!(
                    store = %store,
                    candidates = fallback.len(),
                    "no category validated, falling back to link scan"
                );
                validated = self.validate_all(nav, fallback).await;
            }
        }

        tracing::info!(store = %store, categories = validated.len(), "discovery complete");
        validated
    }

    async fn load_listing(&self, nav: &mut Navigator) -> Option<String> {
        let listing_url = self.adapter.listing_url();
        if let Err(e) = nav.open(listing_url).await {
            tracing::warn!(url = listing_url, error = %e, "listing page unavailable for discovery");
            return None;
        }
        nav.dismiss_popups().await;
        match nav.content().await {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::warn!(url = listing_url, error = %e, "could not read listing page");
                None
            }
        }
    }

    async fn validate_all(
        &self,
        nav: &mut Navigator,
        candidates: Vec<CategoryUrl>,
    ) -> Vec<CategoryUrl> {
        let delay = nav.config().page_delay;
        let mut validated = Vec::new();
        for candidate in candidates {
            sleep(delay).await;
            match self.validate(nav, &candidate).await {
                Ok(Some(estimate)) => validated.push(CategoryUrl {
                    estimated_product_count: estimate,
                    ..candidate
                }),
                Ok(None) => {
                    tracing::debug!(url = %candidate.url, "candidate is not a listing");
                }
                Err(e) => {
                    tracing::debug!(url = %candidate.url, error = %e, "candidate rejected");
                }
            }
        }
        validated
    }

    /// `Some(estimate)` when the page is a listing.
    async fn validate(
        &self,
        nav: &mut Navigator,
        candidate: &CategoryUrl,
    ) -> Result<Option<Option<u32>>, ScraperError> {
        nav.open(&candidate.url).await?;
        let html = nav.content().await?;
        let is_listing = dom::has_cards(&html, self.adapter) || !page_looks_empty(&html);
        Ok(is_listing.then(|| estimate_product_count(&html)))
    }
}

fn dedup_by_url(candidates: Vec<CategoryUrl>) -> Vec<CategoryUrl> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.testmart.example").unwrap()
    }

    fn pattern() -> Regex {
        Regex::new("^/c/[a-z-]+$").unwrap()
    }

    #[test]
    fn count_from_showing_of() {
        assert_eq!(estimate_product_count("Showing 1-20 of 1,243"), Some(1243));
        assert_eq!(estimate_product_count("showing 20 of 87 products"), Some(87));
    }

    #[test]
    fn count_from_results_text() {
        assert_eq!(estimate_product_count("<span>312 results</span>"), Some(312));
        assert_eq!(estimate_product_count("no count here"), None);
    }

    #[test]
    fn scrapes_matching_links_once() {
        let html = r##"
<nav>
  <a href="/c/dairy">Dairy</a>
  <a href="https://testmart.example/c/bakery#top"> Bakery </a>
  <a href="/c/dairy">Dairy again</a>
  <a href="/p/milk">A product</a>
  <a href="https://elsewhere.example/c/dairy">Other site</a>
  <a href="/c/frozen-food"></a>
</nav>"##;
        let links = scrape_category_links(html, &["nav a".to_string()], &base(), &pattern());
        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.testmart.example/c/dairy",
                "https://testmart.example/c/bakery",
                "https://www.testmart.example/c/frozen-food",
            ]
        );
        assert_eq!(links[1].name, "Bakery");
        assert_eq!(links[2].name, "frozen food");
    }

    #[test]
    fn bad_selector_is_skipped() {
        let html = r#"<a href="/c/dairy">Dairy</a>"#;
        let links = scrape_category_links(
            html,
            &["a[[".to_string(), "a".to_string()],
            &base(),
            &pattern(),
        );
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn dedup_keeps_first_name() {
        let c = |name: &str| CategoryUrl {
            name: name.to_string(),
            url: "https://testmart.example/c/a".to_string(),
            estimated_product_count: None,
        };
        let kept = dedup_by_url(vec![c("Seed"), c("Nav")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "Seed");
    }
}
