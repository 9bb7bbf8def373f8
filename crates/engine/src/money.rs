// ABOUTME: Money parsing helpers: tolerant numeric parsing, currency-formatted number scanning, cent rounding.
// ABOUTME: All amounts are rust_decimal::Decimal; non-positive parses are rejected by callers via `positive`.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

/// Monetary amount in major currency units.
pub type Money = Decimal;

/// A currency symbol or ISO code followed by an amount.
pub static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[$£€¥]|\b(?:USD|EUR|GBP|CAD|AUD)\b)\s*(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)",
    )
    .unwrap()
});

/// A bare amount with exactly two fraction digits, e.g. `1,049.00`.
static BARE_DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}(?:,\d{3})+\.\d{2}|\d+\.\d{2})\b").unwrap());

static NUMBER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").unwrap());

static THOUSANDS_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+$").unwrap());

/// Parses the first number found in `raw`, tolerating currency symbols,
/// whitespace, thousands separators and a trailing comma decimal.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let found = NUMBER_TOKEN_RE.find(raw)?;
    let negative = raw[..found.start()].ends_with('-');
    let token = found.as_str().trim_end_matches(|c| c == '.' || c == ',');
    if token.is_empty() {
        return None;
    }

    let last_comma = token.rfind(',');
    let last_dot = token.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(c), None) => {
            let fraction_len = token.len() - c - 1;
            if THOUSANDS_COMMA_RE.is_match(token) {
                token.replace(',', "")
            } else if token.matches(',').count() == 1 && fraction_len <= 2 {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (None, Some(_)) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Returns the value only if it is strictly positive.
pub fn positive(value: Money) -> Option<Money> {
    if value > Decimal::ZERO {
        Some(value)
    } else {
        None
    }
}

/// Parses and keeps only strictly positive amounts.
pub fn parse_positive(raw: &str) -> Option<Money> {
    parse_amount(raw).and_then(positive)
}

/// Rounds to cents, half away from zero, always carrying two fraction digits.
pub fn round_cents(value: Money) -> Money {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// All positive currency-formatted amounts in `text`, in document order.
pub fn currency_amounts(text: &str) -> Vec<Money> {
    CURRENCY_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_positive(m.as_str()))
        .collect()
}

/// Bare two-decimal amounts, used when a price region carries no currency symbol.
pub fn bare_amounts(text: &str) -> Vec<Money> {
    BARE_DECIMAL_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_positive(m.as_str()))
        .collect()
}

/// Converts a JSON scalar (number or numeric string) to an amount.
pub fn amount_from_json(value: &serde_json::Value) -> Option<Money> {
    match value {
        serde_json::Value::Number(n) => parse_positive(&n.to_string()),
        serde_json::Value::String(s) => parse_positive(s),
        _ => None,
    }
}
