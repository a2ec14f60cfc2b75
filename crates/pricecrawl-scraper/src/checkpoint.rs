//! On-disk progress snapshots and run summaries.
//!
//! Layout under the output directory:
//!
//! ```text
//! {output}/{store}/progress.json        CrawlProgress
//! {output}/{store}/offers.json          every unique offer so far
//! {output}/{store}/summary-{ts}-{id}.json    one per finished run
//! ```
//!
//! Snapshots are written to a temp file and renamed into place, so a crash
//! mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use pricecrawl_core::{CrawlProgress, ProductOffer, RunSummary};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ScraperError;

const PROGRESS_FILE: &str = "progress.json";
const OFFERS_FILE: &str = "offers.json";

fn io_err(path: &Path, source: std::io::Error) -> ScraperError {
    ScraperError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn store_dir(&self, store: &str) -> PathBuf {
        self.root.join(store)
    }

    /// Persists offers then progress for `progress.store`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] or [`ScraperError::Json`] if either file
    /// cannot be written.
    pub async fn save(
        &self,
        progress: &CrawlProgress,
        offers: &[ProductOffer],
    ) -> Result<(), ScraperError> {
        let dir = self.store_dir(&progress.store);
        write_json_atomic(&dir.join(OFFERS_FILE), &offers).await?;
        write_json_atomic(&dir.join(PROGRESS_FILE), progress).await
    }

    /// Loads the last snapshot for `store`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] or [`ScraperError::Json`] if a snapshot
    /// exists but cannot be read.
    pub async fn load(
        &self,
        store: &str,
    ) -> Result<Option<(CrawlProgress, Vec<ProductOffer>)>, ScraperError> {
        let dir = self.store_dir(store);
        let Some(progress) = read_json::<CrawlProgress>(&dir.join(PROGRESS_FILE)).await? else {
            return Ok(None);
        };
        let offers = read_json::<Vec<ProductOffer>>(&dir.join(OFFERS_FILE))
            .await?
            .unwrap_or_default();
        Ok(Some((progress, offers)))
    }

    /// Writes `summary` as `summary-{finished_at}-{id}.json` and returns its
    /// path. The millisecond timestamp sorts runs; the short random id keeps
    /// runs finishing in the same millisecond apart.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Io`] or [`ScraperError::Json`] on write failure.
    pub async fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf, ScraperError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = self.store_dir(&summary.store).join(format!(
            "summary-{}-{}.json",
            summary.finished_at.format("%Y%m%dT%H%M%S%3f"),
            &id[..8]
        ));
        write_json_atomic(&path, summary).await?;
        Ok(path)
    }
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ScraperError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|e| ScraperError::Json {
        context: path.display().to_string(),
        source: e,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err(path, e))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ScraperError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ScraperError::Json {
            context: path.display().to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn offer(name: &str) -> ProductOffer {
        ProductOffer {
            store: "test-mart".to_string(),
            store_product_code: name.to_lowercase(),
            name: name.to_string(),
            brand: None,
            price_cents: 1999,
            original_price_cents: None,
            category: "Dairy".to_string(),
            subcategory: None,
            on_sale: false,
            promotion_text: None,
            image_url: None,
            product_url: "https://testmart.example/p".to_string(),
            in_stock: true,
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut progress = CrawlProgress::new("test-mart", Utc::now());
        progress.record_completed("Dairy", 2);

        store
            .save(&progress, &[offer("Milk"), offer("Eggs")])
            .await
            .unwrap();

        let (loaded, offers) = store.load("test-mart").await.unwrap().unwrap();
        assert_eq!(loaded, progress);
        assert_eq!(offers.len(), 2);
        assert!(!dir.path().join("test-mart/progress.json.tmp").exists());
    }

    #[tokio::test]
    async fn load_without_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load("test-mart").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_save_replaces_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut progress = CrawlProgress::new("test-mart", Utc::now());
        store.save(&progress, &[offer("Milk")]).await.unwrap();
        progress.record_completed("Dairy", 2);
        store
            .save(&progress, &[offer("Milk"), offer("Eggs")])
            .await
            .unwrap();

        let (loaded, offers) = store.load("test-mart").await.unwrap().unwrap();
        assert_eq!(loaded.completed_categories, vec!["Dairy".to_string()]);
        assert_eq!(offers.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_progress_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("test-mart")).unwrap();
        std::fs::write(dir.path().join("test-mart/progress.json"), "{not json").unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(matches!(
            store.load("test-mart").await,
            Err(ScraperError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn summary_file_is_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let now = Utc::now();
        let summary = RunSummary {
            store: "test-mart".to_string(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            categories: vec![],
            total_products: 0,
            duplicates_dropped: 0,
            persistence_errors: vec![],
        };
        let path = store.write_summary(&summary).await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("summary-"));
        assert!(name.ends_with(".json"));
        let written: RunSummary =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, summary);
    }

    #[tokio::test]
    async fn summaries_finishing_together_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let now = Utc::now();
        let summary = |total| RunSummary {
            store: "test-mart".to_string(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            categories: vec![],
            total_products: total,
            duplicates_dropped: 0,
            persistence_errors: vec![],
        };

        let first = store.write_summary(&summary(1)).await.unwrap();
        let second = store.write_summary(&summary(2)).await.unwrap();

        assert_ne!(first, second);
        let kept: RunSummary = serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
        assert_eq!(kept.total_products, 1);
    }
}
