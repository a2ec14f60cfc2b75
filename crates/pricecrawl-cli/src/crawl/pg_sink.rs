use async_trait::async_trait;
use pricecrawl_core::ProductOffer;
use pricecrawl_scraper::{OfferSink, ScraperError};
use sqlx::PgPool;

/// Writes each category's offers to `product_offers`.
pub(super) struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub(super) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferSink for PgSink {
    async fn upsert(&self, offers: &[ProductOffer]) -> Result<u64, ScraperError> {
        pricecrawl_db::upsert_offers(&self.pool, offers)
            .await
            .map_err(|e| ScraperError::Sink(e.to_string()))
    }
}
