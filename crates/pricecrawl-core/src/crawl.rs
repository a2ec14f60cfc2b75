//! Crawl-run bookkeeping types: the category frontier, per-run progress
//! checkpoints, and the summary every run ends with.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated category listing page queued for extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUrl {
    pub name: String,
    pub url: String,
    /// Parsed from "X results" / "showing X of Y" text when the page has it.
    pub estimated_product_count: Option<u32>,
}

/// A category that could not be crawled, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCategory {
    pub name: String,
    pub url: String,
    pub error: String,
}

/// Durable progress for one store's run, rewritten after every category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub store: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Names of categories whose extraction finished successfully.
    pub completed_categories: Vec<String>,
    pub failed_categories: Vec<FailedCategory>,
    pub total_products: usize,
}

impl CrawlProgress {
    #[must_use]
    pub fn new(store: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            store: store.to_string(),
            started_at,
            updated_at: started_at,
            completed_categories: Vec::new(),
            failed_categories: Vec::new(),
            total_products: 0,
        }
    }

    /// Marks `name` completed. A category that previously failed and now
    /// succeeds is removed from the failure list.
    pub fn record_completed(&mut self, name: &str, total_products: usize) {
        self.failed_categories.retain(|f| f.name != name);
        if !self.is_completed(name) {
            self.completed_categories.push(name.to_string());
        }
        self.total_products = total_products;
        self.updated_at = Utc::now();
    }

    pub fn record_failed(&mut self, name: &str, url: &str, error: &str, total_products: usize) {
        self.failed_categories.retain(|f| f.name != name);
        self.failed_categories.push(FailedCategory {
            name: name.to_string(),
            url: url.to_string(),
            error: error.to_string(),
        });
        self.total_products = total_products;
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn is_completed(&self, name: &str) -> bool {
        self.completed_categories.iter().any(|c| c == name)
    }
}

/// Outcome of one category within a run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOutcome {
    pub name: String,
    pub url: String,
    /// Unique (post-dedup) offers this category contributed.
    pub product_count: usize,
    pub success: bool,
    /// Always non-empty when `success` is `false`.
    pub error: Option<String>,
}

impl CategoryOutcome {
    #[must_use]
    pub fn succeeded(category: &CategoryUrl, product_count: usize) -> Self {
        Self {
            name: category.name.clone(),
            url: category.url.clone(),
            product_count,
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(category: &CategoryUrl, product_count: usize, error: &str) -> Self {
        let error = if error.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error.to_string()
        };
        Self {
            name: category.name.clone(),
            url: category.url.clone(),
            product_count,
            success: false,
            error: Some(error),
        }
    }
}

/// The record every run ends with, including partially failed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub store: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub categories: Vec<CategoryOutcome>,
    pub total_products: usize,
    pub duplicates_dropped: usize,
    /// Sink batch failures; the local snapshot was still written for each.
    pub persistence_errors: Vec<String>,
}

impl RunSummary {
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    #[must_use]
    pub fn failed_categories(&self) -> Vec<&CategoryOutcome> {
        self.categories.iter().filter(|c| !c.success).collect()
    }

    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.categories.iter().filter(|c| c.success).count()
    }
}
