//! `RawRecord` to [`ProductOffer`] conversion.
//!
//! Every strategy emits vendor-shaped field maps; this module is the single
//! place that knows which vendor keys mean what.

use chrono::Utc;
use pricecrawl_core::{infer_on_sale, ProductOffer, RetailerAdapter};
use serde_json::Value;
use url::Url;

use crate::error::ScraperError;
use crate::price::{cents_value, parse_price_cents, units_to_cents};
use crate::record::RawRecord;

const NAME_KEYS: &[&str] = &["name", "title", "productName", "displayName", "product_name"];
const CODE_KEYS: &[&str] = &[
    "store_product_code",
    "id",
    "sku",
    "code",
    "productId",
    "productCode",
    "product_code",
];
const PRICE_KEYS: &[&str] = &[
    "price",
    "currentPrice",
    "sellingPrice",
    "salePrice",
    "price_cents",
    "priceCents",
];
const ORIGINAL_PRICE_KEYS: &[&str] = &[
    "original_price",
    "originalPrice",
    "wasPrice",
    "was_price",
    "regularPrice",
    "listPrice",
    "original_price_cents",
];
const NESTED_PRICE_KEYS: &[&str] = &["value", "amount", "current", "price", "formattedValue"];
const IMAGE_KEYS: &[&str] = &["image_url", "imageUrl", "image", "thumbnail", "images"];
const URL_KEYS: &[&str] = &["product_url", "productUrl", "url", "link", "href"];
const BRAND_KEYS: &[&str] = &["brand", "brandName", "manufacturer"];
const PROMOTION_KEYS: &[&str] = &["promotion_text", "promotion", "promotionText", "badge", "offer"];
const STOCK_KEYS: &[&str] = &["in_stock", "inStock", "available", "stockStatus"];

/// Converts raw records from one category page into canonical offers.
#[derive(Debug, Clone)]
pub struct Normalizer {
    store: String,
    base_url: Url,
    category: String,
}

impl Normalizer {
    /// # Errors
    ///
    /// Returns [`ScraperError::UrlValidation`] if the adapter's `base_url`
    /// does not parse.
    pub fn new(adapter: &RetailerAdapter, category: &str) -> Result<Self, ScraperError> {
        let base_url = Url::parse(&adapter.base_url).map_err(|e| ScraperError::UrlValidation {
            url: adapter.base_url.clone(),
            status: None,
            reason: e.to_string(),
        })?;
        Ok(Self {
            store: adapter.slug(),
            base_url,
            category: category.to_string(),
        })
    }

    /// Returns `None` for records without a usable name or with a zero price.
    /// `page_url` stands in for the product URL when the record has none.
    #[must_use]
    pub fn normalize(&self, raw: &RawRecord, page_url: &str) -> Option<ProductOffer> {
        let name = resolve_name(raw)?;
        let price_cents = resolve_price(raw, PRICE_KEYS).filter(|c| *c > 0)?;
        let original_price_cents = resolve_price(raw, ORIGINAL_PRICE_KEYS).filter(|c| *c > 0);
        let promotion_text = raw.text_of(PROMOTION_KEYS);
        let on_sale = infer_on_sale(price_cents, original_price_cents, promotion_text.as_deref());

        let store_product_code = raw
            .text_of(CODE_KEYS)
            .unwrap_or_else(|| self.synthetic_code());

        let product_url = raw
            .text_of(URL_KEYS)
            .and_then(|href| self.resolve_url(&href))
            .unwrap_or_else(|| page_url.to_string());

        let subcategory = raw
            .text_of(&["subcategory", "category"])
            .filter(|c| !c.eq_ignore_ascii_case(&self.category));

        Some(ProductOffer {
            store: self.store.clone(),
            store_product_code,
            name,
            brand: resolve_brand(raw),
            price_cents,
            original_price_cents,
            category: self.category.clone(),
            subcategory,
            on_sale,
            promotion_text,
            image_url: self.resolve_image(raw),
            product_url,
            in_stock: resolve_stock(raw),
            scraped_at: Utc::now(),
        })
    }

    fn resolve_image(&self, raw: &RawRecord) -> Option<String> {
        let value = raw.first_of(IMAGE_KEYS)?;
        let href = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Array(items) => items.iter().find_map(image_href)?,
            Value::Object(_) => image_href(value)?,
            _ => return None,
        };
        self.resolve_url(&href)
    }

    fn resolve_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("data:") || href.starts_with("javascript:") {
            return None;
        }
        self.base_url.join(href).ok().map(String::from)
    }

    fn synthetic_code(&self) -> String {
        format!(
            "{}-{}-{:08x}",
            self.store,
            Utc::now().timestamp_millis(),
            rand::random::<u32>()
        )
    }
}

fn resolve_name(raw: &RawRecord) -> Option<String> {
    let name = raw.text_of(NAME_KEYS)?;
    let mut name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(unit) = raw.text_of(&["unit", "size"]) {
        if !name.to_lowercase().contains(&unit.to_lowercase()) {
            name = format!("{name} {unit}");
        }
    }
    (!name.is_empty()).then_some(name)
}

fn image_href(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => ["url", "src", "href"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// Nested object values first, then bare numbers, then formatted strings.
/// The first non-zero result wins.
fn resolve_price(raw: &RawRecord, keys: &[&str]) -> Option<i64> {
    let present: Vec<(&str, &Value)> = keys
        .iter()
        .filter_map(|k| raw.fields.get(*k).map(|v| (*k, v)))
        .collect();

    let nested = present.iter().find_map(|(_, v)| match v {
        Value::Object(map) => NESTED_PRICE_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(|inner| scalar_cents(inner, false))
            .filter(|c| *c > 0),
        _ => None,
    });
    if nested.is_some() {
        return nested;
    }

    let numeric = present.iter().find_map(|(key, v)| match v {
        Value::Number(_) => scalar_cents(v, key.to_lowercase().contains("cents")).filter(|c| *c > 0),
        _ => None,
    });
    if numeric.is_some() {
        return numeric;
    }

    present.iter().find_map(|(_, v)| match v {
        Value::String(_) => scalar_cents(v, false).filter(|c| *c > 0),
        _ => None,
    })
}

fn scalar_cents(value: &Value, already_cents: bool) -> Option<i64> {
    match value {
        Value::Number(n) if already_cents => cents_value(n),
        Value::Number(n) => units_to_cents(n),
        Value::String(s) => parse_price_cents(s),
        _ => None,
    }
}

fn resolve_brand(raw: &RawRecord) -> Option<String> {
    match raw.first_of(BRAND_KEYS)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Missing stock information means in stock.
fn resolve_stock(raw: &RawRecord) -> bool {
    match raw.first_of(STOCK_KEYS) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            let s = s.to_lowercase().replace(['_', ' ', '-'], "");
            !matches!(s.as_str(), "outofstock" | "unavailable" | "soldout" | "false" | "no")
        }
        Some(Value::Number(n)) => n.as_i64().is_none_or(|q| q > 0),
        _ => true,
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
