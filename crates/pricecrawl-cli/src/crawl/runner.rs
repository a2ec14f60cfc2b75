//! Bounded-concurrency pool over retailers and the end-of-run report.

use std::future::Future;

use futures::stream::{self, StreamExt};
use pricecrawl_core::{RetailerAdapter, RunSummary};
use pricecrawl_scraper::ScraperError;

/// What one store's session ended with.
pub(super) struct StoreResult {
    pub slug: String,
    pub outcome: Result<RunSummary, ScraperError>,
}

/// Runs `run_store` for every adapter, at most `max_concurrent` at a time.
/// A failed store never cancels the others. Results arrive in completion
/// order.
pub(super) async fn run_pool<'a, F, Fut>(
    adapters: &'a [RetailerAdapter],
    max_concurrent: usize,
    run_store: F,
) -> Vec<StoreResult>
where
    F: Fn(&'a RetailerAdapter) -> Fut,
    Fut: Future<Output = Result<RunSummary, ScraperError>> + 'a,
{
    stream::iter(adapters)
        .map(|adapter| {
            let fut = run_store(adapter);
            async move {
                StoreResult {
                    slug: adapter.slug(),
                    outcome: fut.await,
                }
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}

/// Prints one block per store and returns how many stores failed outright.
pub(super) fn report(results: &[StoreResult]) -> usize {
    let mut failed_stores = 0;
    for result in results {
        match &result.outcome {
            Ok(summary) => {
                println!(
                    "{}: {} products, {}/{} categories ok, {} duplicates dropped, {:.1}s",
                    summary.store,
                    summary.total_products,
                    summary.succeeded_count(),
                    summary.categories.len(),
                    summary.duplicates_dropped,
                    summary.duration().as_secs_f64(),
                );
                for failed in summary.failed_categories() {
                    println!(
                        "  failed: {} ({}): {}",
                        failed.name,
                        failed.url,
                        failed.error.as_deref().unwrap_or("unknown error")
                    );
                }
                for error in &summary.persistence_errors {
                    println!("  not persisted: {error}");
                }
            }
            Err(e) => {
                failed_stores += 1;
                tracing::error!(store = %result.slug, error = %e, "store crawl failed");
                println!("{}: failed: {e}", result.slug);
            }
        }
    }

    if failed_stores > 0 {
        tracing::warn!(
            failed_stores,
            total_stores = results.len(),
            "some stores failed"
        );
    }
    failed_stores
}
