//! Currency text to integer cents.
//!
//! All arithmetic is done on the digit strings; no floating point is involved,
//! so `"R1,234.56"` is exactly `123456` cents.

use std::sync::LazyLock;

use regex::Regex;

// Integer part with optional thousands groups, then an optional 1-2 digit
// fraction after `.` or `,`.
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:[, \u{a0}\u{202f}]\d{3})+|\d+)(?:[.,](\d{1,2}))?")
        .expect("static price regex")
});

/// Parses the first decimal number in `text` as a price in cents.
///
/// Currency symbols, whitespace and thousands separators are ignored. Returns
/// `None` when no number is present.
#[must_use]
pub fn parse_price_cents(text: &str) -> Option<i64> {
    let caps = PRICE_RE.captures(text)?;
    let whole: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let fraction = caps.get(2).map_or("", |m| m.as_str());
    digits_to_cents(&whole, fraction)
}

/// Converts a JSON number expressed in currency units (e.g. `45.99`) to cents.
///
/// Negative and exponent-notation values are rejected.
#[must_use]
pub fn units_to_cents(number: &serde_json::Number) -> Option<i64> {
    let text = number.to_string();
    if text.starts_with('-') || text.contains(['e', 'E']) {
        return None;
    }
    let (whole, fraction) = text.split_once('.').unwrap_or((&text, ""));
    let fraction = &fraction[..fraction.len().min(2)];
    digits_to_cents(whole, fraction)
}

/// Interprets a JSON number that is already in cents. Fractions are dropped.
#[must_use]
pub fn cents_value(number: &serde_json::Number) -> Option<i64> {
    if let Some(cents) = number.as_i64() {
        return (cents >= 0).then_some(cents);
    }
    let text = number.to_string();
    if text.starts_with('-') || text.contains(['e', 'E']) {
        return None;
    }
    let whole = text.split('.').next().unwrap_or("0");
    whole.parse().ok()
}

fn digits_to_cents(whole: &str, fraction: &str) -> Option<i64> {
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction_cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction[..2].parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction_cents)
}

#[cfg(test)]
#[path = "price_test.rs"]
mod tests;
