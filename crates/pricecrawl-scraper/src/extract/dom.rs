//! Selector heuristics over rendered listing HTML.
//!
//! Each field has an ordered candidate list from the adapter; the first
//! candidate that matches inside a card wins. Generic fallbacks cover cards
//! whose name or price markup the adapter does not describe.

use pricecrawl_core::RetailerAdapter;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::record::{RawRecord, RecordSource};

const FALLBACK_NAME: &[&str] = &["h2", "h3", "h4", "[class*='name']", "[class*='title']"];
const FALLBACK_PRICE: &[&str] = &["[class*='price']", "[data-price]"];
const FALLBACK_LINK: &[&str] = &["a[href]"];
const FALLBACK_IMAGE: &[&str] = &["img"];
const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src", "srcset"];

fn compile(candidates: &[String]) -> Vec<Selector> {
    candidates
        .iter()
        .filter_map(|raw| match Selector::parse(raw) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::debug!(selector = %raw, error = %e, "skipping unparsable selector");
                None
            }
        })
        .collect()
}

fn compile_with_fallback(candidates: &[String], fallback: &[&str]) -> Vec<Selector> {
    let mut selectors = compile(candidates);
    selectors.extend(fallback.iter().filter_map(|s| Selector::parse(s).ok()));
    selectors
}

struct FieldSelectors {
    name: Vec<Selector>,
    price: Vec<Selector>,
    original_price: Vec<Selector>,
    image: Vec<Selector>,
    link: Vec<Selector>,
    brand: Vec<Selector>,
    promotion: Vec<Selector>,
    out_of_stock: Vec<Selector>,
}

impl FieldSelectors {
    fn for_adapter(adapter: &RetailerAdapter) -> Self {
        let s = &adapter.selectors;
        Self {
            name: compile_with_fallback(&s.name, FALLBACK_NAME),
            price: compile_with_fallback(&s.price, FALLBACK_PRICE),
            original_price: compile(&s.original_price),
            image: compile_with_fallback(&s.image, FALLBACK_IMAGE),
            link: compile_with_fallback(&s.link, FALLBACK_LINK),
            brand: compile(&s.brand),
            promotion: compile(&s.promotion),
            out_of_stock: compile(&s.out_of_stock),
        }
    }
}

/// Whitespace-collapsed text content.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first candidate that matches with non-empty text.
fn first_text(card: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        card.select(sel)
            .map(element_text)
            .find(|t| !t.is_empty())
    })
}

/// Attribute of the first candidate that matches and carries one of `attrs`.
fn first_attr(card: ElementRef<'_>, selectors: &[Selector], attrs: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        card.select(sel).find_map(|el| {
            attrs
                .iter()
                .find_map(|a| el.value().attr(a))
                .map(|v| v.split_whitespace().next().unwrap_or_default().to_string())
                .filter(|v| !v.is_empty())
        })
    })
}

fn product_code(card: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    let attribute = attribute?;
    if let Some(code) = card.value().attr(attribute) {
        return Some(code.to_string());
    }
    let nested = Selector::parse(&format!("[{attribute}]")).ok()?;
    card.select(&nested)
        .find_map(|el| el.value().attr(attribute))
        .map(str::to_string)
}

/// `true` when any of the adapter's card selectors matches in `html`.
#[must_use]
pub fn has_cards(html: &str, adapter: &RetailerAdapter) -> bool {
    let document = Html::parse_document(html);
    compile(&adapter.selectors.card)
        .iter()
        .any(|sel| document.select(sel).next().is_some())
}

/// Extracts one record per product card from `html`.
#[must_use]
pub fn extract(html: &str, adapter: &RetailerAdapter) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    let cards: Vec<ElementRef<'_>> = compile(&adapter.selectors.card)
        .iter()
        .map(|sel| document.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();
    if cards.is_empty() {
        return Vec::new();
    }

    let fields = FieldSelectors::for_adapter(adapter);
    let code_attribute = adapter.selectors.code_attribute.as_deref();

    let records: Vec<RawRecord> = cards
        .into_iter()
        .filter_map(|card| {
            let name = first_text(card, &fields.name)?;
            let price = first_text(card, &fields.price)?;

            let mut map = Map::new();
            map.insert("name".into(), Value::String(name));
            if let Some(original) = first_text(card, &fields.original_price).filter(|o| *o != price) {
                map.insert("original_price".into(), Value::String(original));
            }
            map.insert("price".into(), Value::String(price));
            if let Some(href) = first_attr(card, &fields.link, &["href"]) {
                map.insert("product_url".into(), Value::String(href));
            }
            if let Some(src) = first_attr(card, &fields.image, IMAGE_ATTRS) {
                map.insert("image_url".into(), Value::String(src));
            }
            if let Some(brand) = first_text(card, &fields.brand) {
                map.insert("brand".into(), Value::String(brand));
            }
            if let Some(promo) = first_text(card, &fields.promotion) {
                map.insert("promotion_text".into(), Value::String(promo));
            }
            if let Some(code) = product_code(card, code_attribute) {
                map.insert("store_product_code".into(), Value::String(code));
            }
            let sold_out = fields
                .out_of_stock
                .iter()
                .any(|sel| card.select(sel).next().is_some());
            map.insert("in_stock".into(), Value::Bool(!sold_out));

            Some(RawRecord::new(RecordSource::Dom, map))
        })
        .collect();

    tracing::debug!(records = records.len(), "dom extraction");
    records
}
