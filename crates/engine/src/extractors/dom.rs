// ABOUTME: Rendered-only extractors: visible DOM text nodes reported by the browser and intercepted JSON API payloads.
// ABOUTME: Sit at the visible-element confidence tier, nudged up for large type, add-to-cart proximity, or product-shaped API data.

use serde_json::{Map, Value};

use crate::extractors::{ExtractorTag, PageContext, PriceCandidate};
use crate::money::{amount_from_json, bare_amounts, currency_amounts, Money};
use crate::render::VisibleNode;

pub const DOM_BASE_CONFIDENCE: u8 = 73;
pub const DOM_BONUS: u8 = 2;
pub const API_CONFIDENCE: u8 = 75;
pub const API_PRODUCT_CONFIDENCE: u8 = 78;

const API_PRICE_KEYS: &[&str] = &[
    "price",
    "priceV2",
    "finalPrice",
    "regularPrice",
    "salePrice",
    "minimumPrice",
    "price_amount",
];

const PRODUCT_MARKER_KEYS: &[&str] = &["sku", "variant", "variantId", "variant_id", "productId", "product_id"];

/// How deep to follow nested `{amount: {value: ..}}` wrappers under a price key.
const PRICE_NESTING: usize = 3;

fn keep_best(out: &mut Vec<PriceCandidate>, candidate: Option<PriceCandidate>) {
    let Some(c) = candidate else { return };
    match out.iter_mut().find(|existing| existing.value == c.value) {
        Some(existing) if existing.confidence < c.confidence => *existing = c,
        Some(_) => {}
        None => out.push(c),
    }
}

fn node_amounts(text: &str) -> Vec<Money> {
    let found = currency_amounts(text);
    if found.is_empty() {
        bare_amounts(text)
    } else {
        found
    }
}

/// Candidates from text nodes the browser reported as visible.
pub fn from_visible_nodes(nodes: &[VisibleNode]) -> Vec<PriceCandidate> {
    let priced: Vec<(&VisibleNode, Vec<Money>)> = nodes
        .iter()
        .map(|n| (n, node_amounts(&n.text)))
        .filter(|(_, amounts)| !amounts.is_empty())
        .collect();

    let largest = priced
        .iter()
        .map(|(n, _)| n.font_size)
        .fold(0.0_f64, f64::max);

    let mut out = Vec::new();
    for (node, amounts) in priced {
        let mut confidence = DOM_BASE_CONFIDENCE;
        if largest > 0.0 && node.font_size >= largest {
            confidence += DOM_BONUS;
        }
        if node.near_cart {
            confidence += DOM_BONUS;
        }
        for value in amounts {
            keep_best(
                &mut out,
                PriceCandidate::new(value, ExtractorTag::RenderedDom, confidence),
            );
        }
    }
    out
}

/// Candidates from JSON responses captured while the page loaded.
pub fn from_api_payloads(ctx: &PageContext<'_>, payloads: &[Value]) -> Vec<PriceCandidate> {
    let mut out = Vec::new();
    for payload in payloads {
        walk_payload(ctx, payload, &mut out);
    }
    out
}

fn walk_payload(ctx: &PageContext<'_>, value: &Value, out: &mut Vec<PriceCandidate>) {
    match value {
        Value::Object(map) => {
            let confidence = if looks_like_product(map) {
                API_PRODUCT_CONFIDENCE
            } else {
                API_CONFIDENCE
            };
            for key in API_PRICE_KEYS {
                if let Some(raw) = map.get(*key).and_then(|v| price_value(v, PRICE_NESTING)) {
                    keep_best(
                        out,
                        PriceCandidate::new(ctx.normalize(raw), ExtractorTag::InterceptedApi, confidence),
                    );
                }
            }
            for v in map.values() {
                if v.is_object() || v.is_array() {
                    walk_payload(ctx, v, out);
                }
            }
        }
        Value::Array(arr) => {
            for v in arr {
                walk_payload(ctx, v, out);
            }
        }
        _ => {}
    }
}

fn price_value(value: &Value, depth: usize) -> Option<Money> {
    match value {
        Value::Object(map) if depth > 0 => ["amount", "value", "price"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| price_value(v, depth - 1))),
        Value::Object(_) => None,
        other => amount_from_json(other),
    }
}

fn looks_like_product(map: &Map<String, Value>) -> bool {
    if PRODUCT_MARKER_KEYS.iter().any(|k| map.contains_key(*k)) {
        return true;
    }
    map.get("__typename")
        .and_then(Value::as_str)
        .is_some_and(|t| t.contains("Product") || t.contains("Variant"))
}
