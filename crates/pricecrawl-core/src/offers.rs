use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A canonical, store-scoped price/availability record.
///
/// Produced by normalizing vendor-shaped data from any extraction strategy.
/// Prices are integer cents so repeated arithmetic never drifts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOffer {
    /// Retailer slug, e.g. `"checkers"`.
    pub store: String,
    /// Vendor-assigned product code, or a synthetic `"{store}-{millis}-{suffix}"`
    /// id when the vendor exposes none. Synthetic ids do not reconcile across runs.
    pub store_product_code: String,
    pub name: String,
    pub brand: Option<String>,
    /// Current selling price in cents. Never negative.
    pub price_cents: i64,
    /// Pre-promotion price in cents, when the retailer shows one.
    pub original_price_cents: Option<i64>,
    pub category: String,
    pub subcategory: Option<String>,
    pub on_sale: bool,
    pub promotion_text: Option<String>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub in_stock: bool,
    pub scraped_at: DateTime<Utc>,
}

impl ProductOffer {
    /// Run-scoped identity: `lowercase(name) + "-" + price_cents`.
    ///
    /// Two distinct products that share both name and price collide.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.name, self.price_cents)
    }
}

/// Builds the dedup key for a name/price pair.
#[must_use]
pub fn dedup_key(name: &str, price_cents: i64) -> String {
    format!("{}-{}", name.trim().to_lowercase(), price_cents)
}

/// `true` when the original price exceeds the current price or a
/// non-blank promotion text is present.
#[must_use]
pub fn infer_on_sale(
    price_cents: i64,
    original_price_cents: Option<i64>,
    promotion_text: Option<&str>,
) -> bool {
    let discounted = original_price_cents.is_some_and(|original| original > price_cents);
    let promoted = promotion_text.is_some_and(|t| !t.trim().is_empty());
    discounted || promoted
}
