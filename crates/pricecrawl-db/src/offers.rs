//! Database operations for `product_offers`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pricecrawl_core::ProductOffer;
use sqlx::PgPool;

use crate::DbError;

/// Rows per `INSERT … UNNEST` statement.
pub const UPSERT_CHUNK_SIZE: usize = 500;

/// A row from the `product_offers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferRow {
    pub id: i64,
    pub store: String,
    pub store_product_code: String,
    pub name: String,
    pub brand: Option<String>,
    pub price_cents: i64,
    pub original_price_cents: Option<i64>,
    pub category: String,
    pub subcategory: Option<String>,
    pub on_sale: bool,
    pub promotion_text: Option<String>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub in_stock: bool,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry per `(store, store_product_code)`, keeping the position of the
/// first occurrence and the value of the last. Postgres rejects a single
/// `ON CONFLICT DO UPDATE` statement that touches the same row twice.
fn last_write_per_key(offers: &[ProductOffer]) -> Vec<&ProductOffer> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::with_capacity(offers.len());
    let mut kept: Vec<&ProductOffer> = Vec::with_capacity(offers.len());
    for offer in offers {
        match index.entry((offer.store.as_str(), offer.store_product_code.as_str())) {
            Entry::Occupied(slot) => kept[*slot.get()] = offer,
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(offer);
            }
        }
    }
    kept
}

/// Upsert `offers` keyed on `(store, store_product_code)`; the incoming row
/// replaces every column of an existing one.
///
/// Rows are written in chunks of [`UPSERT_CHUNK_SIZE`] inside one
/// transaction, so a failed batch leaves the table untouched. Returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails.
pub async fn upsert_offers(pool: &PgPool, offers: &[ProductOffer]) -> Result<u64, DbError> {
    let offers = last_write_per_key(offers);
    if offers.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted: u64 = 0;
    let mut updated: u64 = 0;

    for chunk in offers.chunks(UPSERT_CHUNK_SIZE) {
        let mut stores: Vec<&str> = Vec::with_capacity(chunk.len());
        let mut codes: Vec<&str> = Vec::with_capacity(chunk.len());
        let mut names: Vec<&str> = Vec::with_capacity(chunk.len());
        let mut brands: Vec<Option<&str>> = Vec::with_capacity(chunk.len());
        let mut prices: Vec<i64> = Vec::with_capacity(chunk.len());
        let mut original_prices: Vec<Option<i64>> = Vec::with_capacity(chunk.len());
        let mut categories: Vec<&str> = Vec::with_capacity(chunk.len());
        let mut subcategories: Vec<Option<&str>> = Vec::with_capacity(chunk.len());
        let mut on_sales: Vec<bool> = Vec::with_capacity(chunk.len());
        let mut promotions: Vec<Option<&str>> = Vec::with_capacity(chunk.len());
        let mut images: Vec<Option<&str>> = Vec::with_capacity(chunk.len());
        let mut urls: Vec<&str> = Vec::with_capacity(chunk.len());
        let mut in_stocks: Vec<bool> = Vec::with_capacity(chunk.len());
        let mut scraped_ats: Vec<DateTime<Utc>> = Vec::with_capacity(chunk.len());

        for offer in chunk {
            stores.push(&offer.store);
            codes.push(&offer.store_product_code);
            names.push(&offer.name);
            brands.push(offer.brand.as_deref());
            prices.push(offer.price_cents);
            original_prices.push(offer.original_price_cents);
            categories.push(&offer.category);
            subcategories.push(offer.subcategory.as_deref());
            on_sales.push(offer.on_sale);
            promotions.push(offer.promotion_text.as_deref());
            images.push(offer.image_url.as_deref());
            urls.push(&offer.product_url);
            in_stocks.push(offer.in_stock);
            scraped_ats.push(offer.scraped_at);
        }

        let rows: Vec<bool> = sqlx::query_scalar::<_, bool>(
            "INSERT INTO product_offers \
                 (store, store_product_code, name, brand, price_cents, original_price_cents, \
                  category, subcategory, on_sale, promotion_text, image_url, product_url, \
                  in_stock, scraped_at) \
             SELECT * FROM UNNEST(\
                  $1::text[], $2::text[], $3::text[], $4::text[], $5::int8[], $6::int8[], \
                  $7::text[], $8::text[], $9::bool[], $10::text[], $11::text[], $12::text[], \
                  $13::bool[], $14::timestamptz[]) \
             ON CONFLICT (store, store_product_code) DO UPDATE SET \
                 name                 = EXCLUDED.name, \
                 brand                = EXCLUDED.brand, \
                 price_cents          = EXCLUDED.price_cents, \
                 original_price_cents = EXCLUDED.original_price_cents, \
                 category             = EXCLUDED.category, \
                 subcategory          = EXCLUDED.subcategory, \
                 on_sale              = EXCLUDED.on_sale, \
                 promotion_text       = EXCLUDED.promotion_text, \
                 image_url            = EXCLUDED.image_url, \
                 product_url          = EXCLUDED.product_url, \
                 in_stock             = EXCLUDED.in_stock, \
                 scraped_at           = EXCLUDED.scraped_at, \
                 updated_at           = NOW() \
             RETURNING (xmax = 0) AS is_new",
        )
        .bind(&stores)
        .bind(&codes)
        .bind(&names)
        .bind(&brands)
        .bind(&prices)
        .bind(&original_prices)
        .bind(&categories)
        .bind(&subcategories)
        .bind(&on_sales)
        .bind(&promotions)
        .bind(&images)
        .bind(&urls)
        .bind(&in_stocks)
        .bind(&scraped_ats)
        .fetch_all(&mut *tx)
        .await?;

        let new_rows = rows.iter().filter(|is_new| **is_new).count() as u64;
        inserted += new_rows;
        updated += rows.len() as u64 - new_rows;
    }

    tx.commit().await?;
    tracing::debug!(inserted, updated, "upserted product offers");
    Ok(inserted + updated)
}

/// Number of offers stored for `store`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_offers(pool: &PgPool, store: &str) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM product_offers WHERE store = $1")
        .bind(store)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Fetch one offer by its natural key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_offer(
    pool: &PgPool,
    store: &str,
    store_product_code: &str,
) -> Result<Option<OfferRow>, DbError> {
    let row = sqlx::query_as::<_, OfferRow>(
        "SELECT id, store, store_product_code, name, brand, price_cents, original_price_cents, \
                category, subcategory, on_sale, promotion_text, image_url, product_url, \
                in_stock, scraped_at, created_at, updated_at \
         FROM product_offers \
         WHERE store = $1 AND store_product_code = $2",
    )
    .bind(store)
    .bind(store_product_code)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
