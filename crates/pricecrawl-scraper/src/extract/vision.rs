use crate::artifacts::ArtifactStore;
use crate::browser::BrowserPage;
use crate::crawl_config::CrawlConfig;
use crate::error::ScraperError;
use crate::record::{RawRecord, RecordSource};
use crate::vision::{looks_empty, parse_first_json_array, VisionClient, PRODUCT_INSTRUCTION};

/// Screenshot-and-ask extraction. Model failures degrade to an empty result
/// for the page; only an unintelligible answer is an error.
pub struct VisionExtractor {
    client: VisionClient,
    artifacts: ArtifactStore,
}

impl VisionExtractor {
    /// Retry attempts and backoff for model calls come from `config`.
    #[must_use]
    pub fn new(client: VisionClient, artifacts: ArtifactStore, config: &CrawlConfig) -> Self {
        Self {
            client: client.with_retry(config.vision_max_attempts, config.vision_backoff),
            artifacts,
        }
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// # Errors
    ///
    /// - [`ScraperError::Browser`] if the screenshot cannot be taken.
    /// - [`ScraperError::Io`] if the screenshot cannot be stored.
    /// - [`ScraperError::Extraction`] if the model's answer has no JSON array
    ///   and does not describe an empty page.
    pub async fn extract(
        &self,
        page: &dyn BrowserPage,
        page_url: &str,
    ) -> Result<Vec<RawRecord>, ScraperError> {
        let png = page.screenshot_png().await?;
        let shot = self.artifacts.save(&png, "png").await?;

        let answer = self.client.describe(&png, PRODUCT_INSTRUCTION).await;

        if let Err(e) = self.artifacts.delete(&shot).await {
            tracing::warn!(path = %shot.display(), error = %e, "failed to delete screenshot");
        }

        match answer {
            Ok(text) => interpret_answer(&text, page_url),
            Err(e) => {
                tracing::warn!(
                    url = page_url,
                    retryable = e.is_retryable(),
                    error = %e,
                    "vision call failed, treating page as empty"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Turns the model's free text into records.
///
/// # Errors
///
/// Returns [`ScraperError::Extraction`] when the text has no JSON array and
/// no recognizable empty-page phrasing.
pub fn interpret_answer(text: &str, page_url: &str) -> Result<Vec<RawRecord>, ScraperError> {
    if let Some(items) = parse_first_json_array(text) {
        return Ok(items
            .into_iter()
            .filter_map(|item| RawRecord::from_value(RecordSource::Vision, item))
            .collect());
    }
    if looks_empty(text) {
        tracing::debug!(url = page_url, "vision reports an empty page");
        return Ok(Vec::new());
    }
    Err(ScraperError::Extraction {
        url: page_url.to_string(),
        reason: "vision response contained no JSON array".to_string(),
    })
}
