//! Live integration tests for pricecrawl-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness from `DATABASE_URL`. They are ignored by default; run
//! them with `cargo test -p pricecrawl-db -- --ignored` against a scratch
//! server.

use chrono::Utc;
use pricecrawl_core::ProductOffer;
use pricecrawl_db::{count_offers, get_offer, upsert_offers, UPSERT_CHUNK_SIZE};

fn offer(store: &str, code: &str, price_cents: i64) -> ProductOffer {
    ProductOffer {
        store: store.to_string(),
        store_product_code: code.to_string(),
        name: format!("Full Cream Milk {code}"),
        brand: Some("Clover".to_string()),
        price_cents,
        original_price_cents: None,
        category: "Dairy".to_string(),
        subcategory: Some("Milk".to_string()),
        on_sale: false,
        promotion_text: None,
        image_url: None,
        product_url: format!("https://www.checkers.co.za/p/{code}"),
        in_stock: true,
        scraped_at: Utc::now(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a Postgres server via DATABASE_URL"]
async fn upsert_inserts_new_offers(pool: sqlx::PgPool) {
    let written = upsert_offers(&pool, &[offer("checkers", "a", 1999), offer("checkers", "b", 2499)])
        .await
        .expect("upsert should succeed");

    assert_eq!(written, 2);
    assert_eq!(count_offers(&pool, "checkers").await.unwrap(), 2);
    let row = get_offer(&pool, "checkers", "a").await.unwrap().unwrap();
    assert_eq!(row.price_cents, 1999);
    assert_eq!(row.brand.as_deref(), Some("Clover"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a Postgres server via DATABASE_URL"]
async fn second_write_replaces_first(pool: sqlx::PgPool) {
    upsert_offers(&pool, &[offer("checkers", "a", 1999)]).await.unwrap();

    let mut cheaper = offer("checkers", "a", 1799);
    cheaper.original_price_cents = Some(1999);
    cheaper.on_sale = true;
    cheaper.promotion_text = Some("Save R2".to_string());
    upsert_offers(&pool, &[cheaper]).await.unwrap();

    assert_eq!(count_offers(&pool, "checkers").await.unwrap(), 1);
    let row = get_offer(&pool, "checkers", "a").await.unwrap().unwrap();
    assert_eq!(row.price_cents, 1799);
    assert_eq!(row.original_price_cents, Some(1999));
    assert!(row.on_sale);
    assert!(row.updated_at >= row.created_at);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a Postgres server via DATABASE_URL"]
async fn duplicate_keys_in_one_batch_keep_the_last(pool: sqlx::PgPool) {
    let written = upsert_offers(
        &pool,
        &[offer("checkers", "a", 1999), offer("checkers", "a", 2099)],
    )
    .await
    .unwrap();

    assert_eq!(written, 1);
    let row = get_offer(&pool, "checkers", "a").await.unwrap().unwrap();
    assert_eq!(row.price_cents, 2099);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a Postgres server via DATABASE_URL"]
async fn batches_larger_than_one_chunk_are_written(pool: sqlx::PgPool) {
    let offers: Vec<ProductOffer> = (0..UPSERT_CHUNK_SIZE + 7)
        .map(|i| offer("shoprite", &format!("sku-{i}"), 1000 + i64::try_from(i).unwrap()))
        .collect();

    let written = upsert_offers(&pool, &offers).await.unwrap();

    assert_eq!(written, offers.len() as u64);
    assert_eq!(
        count_offers(&pool, "shoprite").await.unwrap(),
        i64::try_from(offers.len()).unwrap()
    );
    assert_eq!(count_offers(&pool, "checkers").await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a Postgres server via DATABASE_URL"]
async fn empty_batch_writes_nothing(pool: sqlx::PgPool) {
    assert_eq!(upsert_offers(&pool, &[]).await.unwrap(), 0);
}
