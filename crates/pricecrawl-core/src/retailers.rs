//! Static per-retailer descriptors loaded from `config/retailers.yaml`.
//!
//! Every store is described by the same data shape and crawled by the same
//! generic algorithm; nothing here knows how to crawl.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Ordered candidate CSS selectors per listing field. Within each list the
/// first selector that matches wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Product card containers.
    pub card: Vec<String>,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub price: Vec<String>,
    #[serde(default)]
    pub original_price: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    #[serde(default)]
    pub link: Vec<String>,
    #[serde(default)]
    pub brand: Vec<String>,
    #[serde(default)]
    pub promotion: Vec<String>,
    /// Markers of an out-of-stock card.
    #[serde(default)]
    pub out_of_stock: Vec<String>,
    /// Attribute on the card carrying the vendor product code, e.g. `data-product-id`.
    #[serde(default)]
    pub code_attribute: Option<String>,
    /// Selectors that prove the listing grid has rendered.
    #[serde(default)]
    pub listing: Vec<String>,
    /// Pagination control links or buttons.
    #[serde(default)]
    pub pagination: Vec<String>,
}

/// A category the retailer is known to have, crawled even if the nav menu
/// does not expose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerAdapter {
    pub name: String,
    /// Scheme + host used to resolve relative URLs, e.g. `"https://www.checkers.co.za"`.
    pub base_url: String,
    /// Top-level listing page used for nav discovery. Defaults to `base_url`.
    #[serde(default)]
    pub listing_url: Option<String>,
    /// Regex matched against link paths that look like category pages.
    pub category_path_pattern: String,
    /// Query parameter carrying the page number.
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// Value the page parameter takes on the first page (0 or 1).
    #[serde(default = "default_first_page_index")]
    pub first_page_index: u32,
    #[serde(default)]
    pub seed_categories: Vec<SeedCategory>,
    /// Candidate selectors for navigation/sidebar category links.
    #[serde(default)]
    pub nav_link_selectors: Vec<String>,
    pub selectors: SelectorSet,
    /// Ordered dismiss interactions for cookie banners and location modals.
    #[serde(default)]
    pub popup_dismiss_selectors: Vec<String>,
    /// URL substrings identifying the retailer's internal product APIs.
    #[serde(default)]
    pub api_path_patterns: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_first_page_index() -> u32 {
    1
}

// serde's `default = "..."` needs a function path.
fn default_enabled() -> bool {
    true
}

impl RetailerAdapter {
    /// Generate a URL-safe slug from the retailer name.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else if c == ' ' {
                    '-'
                } else {
                    '\0'
                }
            })
            .filter(|&c| c != '\0')
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// The page discovery starts from.
    #[must_use]
    pub fn listing_url(&self) -> &str {
        self.listing_url.as_deref().unwrap_or(&self.base_url)
    }

    /// Query-parameter value for 1-based page number `page`.
    #[must_use]
    pub fn page_param_value(&self, page: u32) -> u32 {
        page.saturating_sub(1) + self.first_page_index
    }
}

#[derive(Debug, Deserialize)]
pub struct RetailersFile {
    pub retailers: Vec<RetailerAdapter>,
}

impl RetailersFile {
    /// Finds an enabled retailer by slug.
    #[must_use]
    pub fn find(&self, slug: &str) -> Option<&RetailerAdapter> {
        self.retailers
            .iter()
            .find(|r| r.enabled && r.slug() == slug)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &RetailerAdapter> {
        self.retailers.iter().filter(|r| r.enabled)
    }
}

/// Load and validate the retailer descriptors from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_retailers(path: &Path) -> Result<RetailersFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RetailersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_retailers(&content)
}

/// Parse and validate retailer descriptors from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_retailers(content: &str) -> Result<RetailersFile, ConfigError> {
    let file: RetailersFile = serde_yaml::from_str(content)?;
    validate_retailers(&file)?;
    Ok(file)
}

fn validate_retailers(file: &RetailersFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for retailer in &file.retailers {
        if retailer.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "retailer name must be non-empty".to_string(),
            ));
        }

        let slug = retailer.slug();
        if slug.is_empty() {
            return Err(ConfigError::Validation(format!(
                "retailer '{}' produces an empty slug",
                retailer.name
            )));
        }
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate retailer slug: '{slug}' (from retailer '{}')",
                retailer.name
            )));
        }

        for (field, raw) in [
            ("base_url", Some(retailer.base_url.as_str())),
            ("listing_url", retailer.listing_url.as_deref()),
        ] {
            let Some(raw) = raw else { continue };
            let parsed = url::Url::parse(raw).map_err(|e| {
                ConfigError::Validation(format!(
                    "retailer '{}' has invalid {field} '{raw}': {e}",
                    retailer.name
                ))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Validation(format!(
                    "retailer '{}' {field} must be http(s), got '{raw}'",
                    retailer.name
                )));
            }
        }

        regex::Regex::new(&retailer.category_path_pattern).map_err(|e| {
            ConfigError::Validation(format!(
                "retailer '{}' has invalid category_path_pattern: {e}",
                retailer.name
            ))
        })?;

        if retailer.selectors.card.is_empty() {
            return Err(ConfigError::Validation(format!(
                "retailer '{}' must declare at least one card selector",
                retailer.name
            )));
        }

        if retailer.first_page_index > 1 {
            return Err(ConfigError::Validation(format!(
                "retailer '{}' has first_page_index {}; must be 0 or 1",
                retailer.name, retailer.first_page_index
            )));
        }

        for seed in &retailer.seed_categories {
            if seed.name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "retailer '{}' has a seed category with an empty name",
                    retailer.name
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "retailers_test.rs"]
mod tests;
