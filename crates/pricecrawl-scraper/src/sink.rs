use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use pricecrawl_core::ProductOffer;

use crate::error::ScraperError;

/// Downstream store for offers, keyed on `(store, store_product_code)` with
/// last-write-wins semantics.
#[async_trait]
pub trait OfferSink: Send + Sync {
    /// Upserts one batch and returns the number of rows written.
    async fn upsert(&self, offers: &[ProductOffer]) -> Result<u64, ScraperError>;
}

/// Keeps every upserted batch in memory. Useful for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<ProductOffer>>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn batches(&self) -> Vec<Vec<ProductOffer>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl OfferSink for MemorySink {
    async fn upsert(&self, offers: &[ProductOffer]) -> Result<u64, ScraperError> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(offers.to_vec());
        Ok(offers.len() as u64)
    }
}
