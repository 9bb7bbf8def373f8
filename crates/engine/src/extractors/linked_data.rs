// ABOUTME: JSON-LD product offer extractor: finds Product nodes and reads their offers' prices.
// ABOUTME: Tolerates single or array offers, string or numeric prices, @graph wrappers and AggregateOffer.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::extractors::{ExtractorTag, PageContext, PriceCandidate};
use crate::money::{amount_from_json, Money};

pub const CONFIDENCE: u8 = 80;

pub fn extract(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    if !ctx.html.contains("ld+json") {
        return Vec::new();
    }
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };
    let doc = Html::parse_document(ctx.html);

    let mut values: Vec<Money> = Vec::new();
    for script in doc.select(&selector) {
        let text = script.text().collect::<String>();
        // Malformed blocks contribute nothing.
        let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
            tracing::trace!("skipping unparsable ld+json block");
            continue;
        };
        collect_product_prices(&value, &mut values);
    }

    values
        .into_iter()
        .filter_map(|v| PriceCandidate::new(v, ExtractorTag::LinkedDataOffer, CONFIDENCE))
        .collect()
}

fn collect_product_prices(value: &Value, out: &mut Vec<Money>) {
    match value {
        Value::Object(map) => {
            if map.get("@type").is_some_and(|t| matches_type(t, "Product")) {
                if let Some(offers) = map.get("offers") {
                    for price in offer_prices(offers) {
                        if !out.contains(&price) {
                            out.push(price);
                        }
                    }
                }
            }
            for key in ["@graph", "graph", "mainEntity", "mainEntityOfPage", "itemListElement", "item"] {
                if let Some(v) = map.get(key) {
                    collect_product_prices(v, out);
                }
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_product_prices(v, out);
            }
        }
        _ => {}
    }
}

fn offer_prices(offers: &Value) -> Vec<Money> {
    match offers {
        Value::Array(arr) => arr.iter().flat_map(offer_prices).collect(),
        Value::Object(map) => {
            if let Some(price) = map.get("price").and_then(amount_from_json) {
                return vec![price];
            }
            if let Some(price) = map.get("lowPrice").and_then(amount_from_json) {
                return vec![price];
            }
            match map.get("priceSpecification") {
                Some(Value::Array(specs)) => specs
                    .iter()
                    .filter_map(|s| s.get("price").and_then(amount_from_json))
                    .take(1)
                    .collect(),
                Some(spec) => spec.get("price").and_then(amount_from_json).into_iter().collect(),
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => {
            s.eq_ignore_ascii_case(expected)
                || s.rsplit('/').next().is_some_and(|tail| tail.eq_ignore_ascii_case(expected))
        }
        Value::Array(arr) => arr.iter().any(|v| matches_type(v, expected)),
        _ => false,
    }
}
