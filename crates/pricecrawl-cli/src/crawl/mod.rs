//! `crawl` command: one browser, a pool of store sessions, an optional
//! Postgres sink.
//!
//! A store that fails outright is reported and skipped; the command only
//! errors when every selected store failed.

mod pg_sink;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pricecrawl_core::{AppConfig, RetailerAdapter, RetailersFile, RunSummary};
use pricecrawl_scraper::{
    ArtifactStore, ChromiumBrowser, CrawlConfig, CrawlOrchestrator, OfferSink, PageFactory,
    ScraperError, VisionClient, VisionExtractor,
};

use pg_sink::PgSink;

/// Everything a store session shares with the others.
pub(crate) struct Session {
    pub crawl_config: Arc<CrawlConfig>,
    pub sink: Option<Arc<dyn OfferSink>>,
    pub vision: Option<VisionClient>,
    pub artifact_root: PathBuf,
    pub resume: bool,
}

impl Session {
    /// Each store screenshots into its own subdirectory of the artifact root;
    /// the orchestrator sweeps only that one on teardown.
    fn vision_for(&self, adapter: &RetailerAdapter) -> Option<Arc<VisionExtractor>> {
        let client = self.vision.clone()?;
        let artifacts = ArtifactStore::new(self.artifact_root.join(adapter.slug()));
        Some(Arc::new(VisionExtractor::new(
            client,
            artifacts,
            &self.crawl_config,
        )))
    }

    pub(crate) fn orchestrator(&self, adapter: &RetailerAdapter) -> CrawlOrchestrator {
        let mut orchestrator =
            CrawlOrchestrator::new(Arc::new(adapter.clone()), Arc::clone(&self.crawl_config))
                .resume(self.resume);
        if let Some(sink) = &self.sink {
            orchestrator = orchestrator.with_sink(Arc::clone(sink));
        }
        if let Some(vision) = self.vision_for(adapter) {
            orchestrator = orchestrator.with_vision(vision);
        }
        orchestrator
    }

    async fn run_store(
        &self,
        factory: &dyn PageFactory,
        adapter: &RetailerAdapter,
    ) -> Result<RunSummary, ScraperError> {
        tracing::info!(store = %adapter.slug(), resume = self.resume, "crawl starting");
        self.orchestrator(adapter).run(factory).await
    }
}

/// The adapters a crawl covers: the one named by `store`, or every enabled one.
pub(crate) fn select_targets(
    retailers: &RetailersFile,
    store: Option<&str>,
) -> anyhow::Result<Vec<RetailerAdapter>> {
    let targets: Vec<RetailerAdapter> = match store {
        Some(slug) => {
            let adapter = retailers.find(slug).ok_or_else(|| {
                let known: Vec<String> = retailers.enabled().map(RetailerAdapter::slug).collect();
                anyhow::anyhow!(
                    "retailer '{slug}' is unknown or disabled (enabled: {})",
                    known.join(", ")
                )
            })?;
            vec![adapter.clone()]
        }
        None => retailers.enabled().cloned().collect(),
    };
    if targets.is_empty() {
        anyhow::bail!("no enabled retailers in the retailers file");
    }
    Ok(targets)
}

async fn build_sink(config: &AppConfig, persist: bool) -> anyhow::Result<Option<Arc<dyn OfferSink>>> {
    if !persist {
        tracing::info!("persistence disabled, offers kept in local checkpoints only");
        return Ok(None);
    }
    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set, offers kept in local checkpoints only");
        return Ok(None);
    };
    let pool = pricecrawl_db::connect_pool(url, pricecrawl_db::PoolConfig::from_env()).await?;
    Ok(Some(Arc::new(PgSink::new(pool))))
}

/// Crawls the selected stores and prints a summary per store.
///
/// # Errors
///
/// Returns an error if configuration, the database connection or the
/// browser launch fails, or if every selected store failed.
pub(crate) async fn run_crawl(
    config: &AppConfig,
    store: Option<&str>,
    resume: bool,
    persist: bool,
) -> anyhow::Result<()> {
    let retailers = pricecrawl_core::load_retailers(&config.retailers_path)?;
    let targets = select_targets(&retailers, store)?;

    let vision = VisionClient::from_app_config(config)?;
    if vision.is_none() {
        tracing::info!("no vision API key configured, vision extraction disabled");
    }
    let session = Session {
        crawl_config: Arc::new(CrawlConfig::from_app_config(config)),
        sink: build_sink(config, persist).await?,
        vision,
        artifact_root: config.artifact_dir.clone(),
        resume,
    };

    let browser = ChromiumBrowser::launch(
        config.headless,
        Duration::from_secs(config.nav_timeout_secs),
    )
    .await?;

    let results = runner::run_pool(&targets, config.max_concurrent_sessions, |adapter| {
        session.run_store(&browser, adapter)
    })
    .await;

    if let Err(e) = browser.shutdown().await {
        tracing::warn!(error = %e, "browser shutdown failed");
    }

    let failed = runner::report(&results);
    if failed == results.len() {
        anyhow::bail!("all {failed} store(s) failed");
    }
    Ok(())
}

#[cfg(test)]
#[path = "crawl_test.rs"]
mod tests;
