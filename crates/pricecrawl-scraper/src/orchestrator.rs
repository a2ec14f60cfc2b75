//! Drives one store's crawl: discovery, per-category extraction, checkpoint
//! after every category, and a summary at the end.
//!
//! A category that fails is recorded with its error and the loop moves on.
//! Only a store with no discoverable categories aborts the run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use pricecrawl_core::{
    CategoryOutcome, CategoryUrl, CrawlProgress, ProductOffer, RetailerAdapter, RunSummary,
};
use tokio::time::sleep;

use crate::browser::{CapturedResponse, PageFactory, ResponseSubscription};
use crate::checkpoint::CheckpointStore;
use crate::crawl_config::CrawlConfig;
use crate::dedup::Deduplicator;
use crate::discovery::Discovery;
use crate::error::ScraperError;
use crate::extract::{page_looks_empty, strategy_order, ExtractionContext, VisionExtractor};
use crate::navigator::Navigator;
use crate::normalize::Normalizer;
use crate::record::RawRecord;
use crate::sink::OfferSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Discovering,
    Extracting { index: usize },
    Checkpointing,
    Done,
    Summarized,
}

/// What one category produced. Offers are kept even when `error` is set.
struct CategoryRun {
    offers: Vec<ProductOffer>,
    error: Option<ScraperError>,
}

pub struct CrawlOrchestrator {
    adapter: Arc<RetailerAdapter>,
    config: Arc<CrawlConfig>,
    checkpoints: CheckpointStore,
    vision: Option<Arc<VisionExtractor>>,
    sink: Option<Arc<dyn OfferSink>>,
    resume: bool,
    phase: Phase,
}

impl CrawlOrchestrator {
    #[must_use]
    pub fn new(adapter: Arc<RetailerAdapter>, config: Arc<CrawlConfig>) -> Self {
        let checkpoints = CheckpointStore::new(config.output_dir.clone());
        Self {
            adapter,
            config,
            checkpoints,
            vision: None,
            sink: None,
            resume: false,
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub fn with_vision(mut self, vision: Arc<VisionExtractor>) -> Self {
        self.vision = Some(vision);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn OfferSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Continue from the store's last checkpoint instead of starting fresh.
    #[must_use]
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(store = %self.adapter.slug(), from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    /// Crawls the store on a fresh page from `factory`. The page is closed and
    /// screenshots are swept whether or not the run succeeds.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Browser`] if no page can be opened.
    /// - [`ScraperError::NoCategories`] if discovery validates nothing.
    pub async fn run(&mut self, factory: &dyn PageFactory) -> Result<RunSummary, ScraperError> {
        let page = factory.new_page().await?;
        let mut nav = Navigator::new(page, Arc::clone(&self.adapter), Arc::clone(&self.config));

        let result = self.run_session(&mut nav).await;

        if let Err(e) = nav.close().await {
            tracing::warn!(store = %self.adapter.slug(), error = %e, "failed to close page");
        }
        if let Some(vision) = &self.vision {
            match vision.artifacts().sweep().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(removed = n, "swept leftover screenshots"),
                Err(e) => tracing::warn!(error = %e, "screenshot sweep failed"),
            }
        }
        result
    }

    /// Runs discovery alone and returns the validated frontier.
    ///
    /// # Errors
    ///
    /// Same as [`CrawlOrchestrator::run`].
    pub async fn discover(
        &mut self,
        factory: &dyn PageFactory,
    ) -> Result<Vec<CategoryUrl>, ScraperError> {
        let page = factory.new_page().await?;
        let mut nav = Navigator::new(page, Arc::clone(&self.adapter), Arc::clone(&self.config));

        self.enter(Phase::Discovering);
        let result = match Discovery::new(&self.adapter, self.config.discovery_fallback_limit) {
            Ok(discovery) => Ok(discovery.discover(&mut nav).await),
            Err(e) => Err(e),
        };

        if let Err(e) = nav.close().await {
            tracing::warn!(store = %self.adapter.slug(), error = %e, "failed to close page");
        }
        self.enter(Phase::Done);

        let categories = result?;
        if categories.is_empty() {
            return Err(ScraperError::NoCategories {
                store: self.adapter.slug(),
            });
        }
        Ok(categories)
    }

    async fn run_session(&mut self, nav: &mut Navigator) -> Result<RunSummary, ScraperError> {
        let store = self.adapter.slug();
        let started_at = Utc::now();
        let clock = Instant::now();

        let (mut progress, mut offers) = self.initial_state(&store).await;
        let mut dedup = Deduplicator::seeded(&offers);

        self.enter(Phase::Discovering);
        let categories = Discovery::new(&self.adapter, self.config.discovery_fallback_limit)?
            .discover(nav)
            .await;
        if categories.is_empty() {
            tracing::error!(store = %store, "no categories discovered, aborting run");
            return Err(ScraperError::NoCategories { store });
        }

        let subscription = self.subscribe(nav).await;
        let mut outcomes = Vec::new();
        let mut persistence_errors = Vec::new();
        let mut crawled_any = false;

        for (index, category) in categories.iter().enumerate() {
            if progress.is_completed(&category.name) {
                tracing::info!(store = %store, category = %category.name, "already completed, skipping");
                continue;
            }
            if crawled_any {
                sleep(self.config.category_delay()).await;
            }
            crawled_any = true;

            self.enter(Phase::Extracting { index });
            let run = self
                .crawl_category(nav, category, subscription.as_ref(), &mut dedup)
                .await;
            let count = run.offers.len();

            self.enter(Phase::Checkpointing);
            if let (Some(sink), false) = (&self.sink, run.offers.is_empty()) {
                if let Err(e) = sink.upsert(&run.offers).await {
                    tracing::warn!(store = %store, category = %category.name, error = %e, "sink upsert failed");
                    persistence_errors.push(format!("{}: {e}", category.name));
                }
            }
            offers.extend(run.offers);

            match run.error {
                None => {
                    tracing::info!(store = %store, category = %category.name, products = count, "category complete");
                    progress.record_completed(&category.name, offers.len());
                    outcomes.push(CategoryOutcome::succeeded(category, count));
                }
                Some(e) => {
                    tracing::warn!(
                        store = %store,
                        category = %category.name,
                        products = count,
                        error = %e,
                        "category failed"
                    );
                    let message = e.to_string();
                    progress.record_failed(&category.name, &category.url, &message, offers.len());
                    outcomes.push(CategoryOutcome::failed(category, count, &message));
                }
            }

            if let Err(e) = self.checkpoints.save(&progress, &offers).await {
                tracing::error!(store = %store, error = %e, "checkpoint write failed");
                persistence_errors.push(format!("checkpoint: {e}"));
            }
        }

        if let Some(subscription) = subscription {
            subscription.release();
        }
        self.enter(Phase::Done);

        let finished_at = Utc::now();
        let summary = RunSummary {
            store: store.clone(),
            started_at,
            finished_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            categories: outcomes,
            total_products: offers.len(),
            duplicates_dropped: dedup.dropped(),
            persistence_errors,
        };
        match self.checkpoints.write_summary(&summary).await {
            Ok(path) => tracing::info!(store = %store, path = %path.display(), "summary written"),
            Err(e) => tracing::warn!(store = %store, error = %e, "failed to write summary"),
        }
        self.enter(Phase::Summarized);

        tracing::info!(
            store = %store,
            categories = summary.categories.len(),
            failed = summary.failed_categories().len(),
            total_products = summary.total_products,
            duplicates_dropped = summary.duplicates_dropped,
            duration_ms = summary.duration_ms,
            "crawl finished"
        );
        Ok(summary)
    }

    async fn initial_state(&self, store: &str) -> (CrawlProgress, Vec<ProductOffer>) {
        if self.resume {
            match self.checkpoints.load(store).await {
                Ok(Some((progress, offers))) => {
                    tracing::info!(
                        store,
                        completed = progress.completed_categories.len(),
                        offers = offers.len(),
                        "resuming from checkpoint"
                    );
                    return (progress, offers);
                }
                Ok(None) => tracing::info!(store, "no checkpoint to resume, starting fresh"),
                Err(e) => tracing::warn!(store, error = %e, "unreadable checkpoint, starting fresh"),
            }
        }
        (CrawlProgress::new(store, Utc::now()), Vec::new())
    }

    async fn subscribe(&self, nav: &Navigator) -> Option<ResponseSubscription> {
        if self.adapter.api_path_patterns.is_empty() {
            return None;
        }
        match nav.page().listen_responses(&self.adapter.api_path_patterns).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(error = %e, "network capture unavailable, continuing without it");
                None
            }
        }
    }

    async fn crawl_category(
        &self,
        nav: &mut Navigator,
        category: &CategoryUrl,
        subscription: Option<&ResponseSubscription>,
        dedup: &mut Deduplicator,
    ) -> CategoryRun {
        let mut collected = Vec::new();
        let normalizer = match Normalizer::new(&self.adapter, &category.name) {
            Ok(n) => n,
            Err(e) => {
                return CategoryRun {
                    offers: collected,
                    error: Some(e),
                }
            }
        };

        if let Some(sub) = subscription {
            drop(sub.drain());
        }
        if let Err(e) = self.open_with_retry(nav, &category.url).await {
            return CategoryRun {
                offers: collected,
                error: Some(e),
            };
        }

        let mut page = 1u32;
        loop {
            self.prepare_page(nav).await;
            let page_url = nav
                .current_url()
                .await
                .unwrap_or_else(|_| category.url.clone());
            let captures = subscription.map(ResponseSubscription::drain).unwrap_or_default();

            let records = match self.extract_page(nav, &captures, &page_url, page).await {
                Ok(records) => records,
                Err(e) => {
                    return CategoryRun {
                        offers: collected,
                        error: Some(e),
                    }
                }
            };

            let normalized: Vec<ProductOffer> = records
                .iter()
                .filter_map(|r| normalizer.normalize(r, &page_url))
                .collect();
            let fresh = dedup.filter_new(normalized);
            let new_count = fresh.len();
            collected.extend(fresh);
            tracing::info!(
                store = %self.adapter.slug(),
                category = %category.name,
                page,
                raw = records.len(),
                new = new_count,
                "page extracted"
            );

            if records.is_empty() || (page > 1 && new_count == 0) {
                tracing::debug!(category = %category.name, page, "no new records, category done");
                break;
            }
            if page >= self.config.max_pages_per_category {
                tracing::debug!(category = %category.name, page, "page limit reached");
                break;
            }

            sleep(self.config.page_delay).await;
            match self.next_page_with_retry(nav, page + 1).await {
                Ok(true) => page += 1,
                Ok(false) => {
                    tracing::debug!(category = %category.name, page, "no further pages");
                    break;
                }
                Err(e) => {
                    return CategoryRun {
                        offers: collected,
                        error: Some(e),
                    }
                }
            }
        }

        CategoryRun {
            offers: collected,
            error: None,
        }
    }

    /// Opens the category's first page, retrying once after a timeout.
    async fn open_with_retry(&self, nav: &mut Navigator, url: &str) -> Result<(), ScraperError> {
        match nav.open(url).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => {
                tracing::warn!(url, error = %e, "navigation failed, retrying once");
                sleep(self.config.page_delay).await;
                nav.open(url).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Moves to `page_number`, retrying once after a timeout.
    async fn next_page_with_retry(
        &self,
        nav: &mut Navigator,
        page_number: u32,
    ) -> Result<bool, ScraperError> {
        match nav.go_to_page(page_number).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(page = page_number, error = %e, "pagination timed out, retrying once");
                sleep(self.config.page_delay).await;
                nav.go_to_page(page_number).await
            }
            other => other,
        }
    }

    async fn prepare_page(&self, nav: &Navigator) {
        nav.dismiss_popups().await;
        let candidates: Vec<String> = self
            .adapter
            .selectors
            .listing
            .iter()
            .chain(&self.adapter.selectors.card)
            .cloned()
            .collect();
        if !nav.wait_for_listing(&candidates).await {
            tracing::debug!("listing markup not detected");
        }
        nav.scroll_to_load().await;
    }

    /// Consults strategies in policy order; the first with output wins.
    ///
    /// Zero output is an [`ScraperError::Extraction`] failure on the first
    /// page, or on a later page where a strategy errored, unless the page
    /// says it has no results.
    async fn extract_page(
        &self,
        nav: &Navigator,
        captures: &[CapturedResponse],
        page_url: &str,
        page: u32,
    ) -> Result<Vec<RawRecord>, ScraperError> {
        let ctx = ExtractionContext {
            navigator: nav,
            adapter: &self.adapter,
            captures,
            vision: self.vision.as_deref(),
            page_url,
        };

        let mut last_error = None;
        for strategy in strategy_order(self.config.extraction_policy, self.vision.is_some()) {
            match strategy.extract(&ctx).await {
                Ok(records) if !records.is_empty() => {
                    tracing::debug!(%strategy, records = records.len(), page, "strategy yielded");
                    return Ok(records);
                }
                Ok(_) => tracing::debug!(%strategy, page, "strategy yielded nothing"),
                Err(e) => {
                    tracing::warn!(%strategy, page, error = %e, "strategy failed");
                    last_error = Some(e);
                }
            }
        }

        let html = nav.content().await.unwrap_or_default();
        if page_looks_empty(&html) {
            return Ok(Vec::new());
        }
        if page == 1 || last_error.is_some() {
            return Err(ScraperError::Extraction {
                url: page_url.to_string(),
                reason: last_error.map_or_else(
                    || "no strategy yielded products".to_string(),
                    |e| e.to_string(),
                ),
            });
        }
        Ok(Vec::new())
    }
}
