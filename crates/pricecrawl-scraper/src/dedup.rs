use std::collections::HashSet;

use pricecrawl_core::ProductOffer;

/// Run-scoped identity set over `lowercase(name)-price_cents`.
///
/// First occurrence wins. Distinct products sharing a name and price collapse
/// into one; the sink's `(store, store_product_code)` upsert is the cross-run
/// identity, not this.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
    dropped: usize,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the set from offers emitted by an earlier, interrupted run.
    #[must_use]
    pub fn seeded<'a>(offers: impl IntoIterator<Item = &'a ProductOffer>) -> Self {
        let mut dedup = Self::new();
        for offer in offers {
            dedup.seen.insert(offer.dedup_key());
        }
        dedup
    }

    /// Returns `true` if `offer` is new to this run. Duplicates are counted.
    pub fn admit(&mut self, offer: &ProductOffer) -> bool {
        if self.seen.insert(offer.dedup_key()) {
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    /// Keeps only offers not seen before, in order.
    pub fn filter_new(&mut self, offers: Vec<ProductOffer>) -> Vec<ProductOffer> {
        offers.into_iter().filter(|o| self.admit(o)).collect()
    }

    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::normalize::Normalizer;
    use crate::record::{RawRecord, RecordSource};

    fn offer(name: &str, price_cents: i64, code: &str) -> ProductOffer {
        ProductOffer {
            store: "testmart".to_string(),
            store_product_code: code.to_string(),
            name: name.to_string(),
            brand: None,
            price_cents,
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

    #[test]
    fn first_occurrence_wins() {
        let mut dedup = Deduplicator::new();
        let kept = dedup.filter_new(vec![
            offer("Milk 2L", 3499, "A"),
            offer("milk 2l", 3499, "B"),
            offer("Milk 2L", 3599, "C"),
        ]);
        let codes: Vec<_> = kept.iter().map(|o| o.store_product_code.as_str()).collect();
        assert_eq!(codes, vec!["A", "C"]);
        assert_eq!(dedup.dropped(), 1);
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn seeded_set_rejects_previous_offers() {
        let previous = vec![offer("Bread", 1599, "A")];
        let mut dedup = Deduplicator::seeded(&previous);
        assert!(!dedup.admit(&offer("Bread", 1599, "B")));
        assert!(dedup.admit(&offer("Butter", 5299, "C")));
    }

    #[test]
    fn normalizing_same_records_twice_yields_one_offer_per_key() {
        let adapter = pricecrawl_core::parse_retailers(
            r#"
retailers:
  - name: Test Mart
    base_url: https://testmart.example
    category_path_pattern: "^/c/"
    selectors: { card: [".card"] }
"#,
        )
        .unwrap()
        .retailers
        .remove(0);
        let normalizer = Normalizer::new(&adapter, "Dairy").unwrap();
        let raws: Vec<RawRecord> = [
            json!({"name": "Milk", "price": "R34.99"}),
            json!({"name": "Eggs", "price": "R25.99"}),
            json!({"name": "Cheese", "price": "R89.99"}),
        ]
        .into_iter()
        .filter_map(|v| RawRecord::from_value(RecordSource::Dom, v))
        .collect();

        let mut dedup = Deduplicator::new();
        let mut emitted = Vec::new();
        for _ in 0..2 {
            let offers = raws
                .iter()
                .filter_map(|r| normalizer.normalize(r, "https://testmart.example/c/dairy"))
                .collect();
            emitted.extend(dedup.filter_new(offers));
        }
        assert_eq!(emitted.len(), 3);
        assert_eq!(dedup.dropped(), 3);
    }
}
