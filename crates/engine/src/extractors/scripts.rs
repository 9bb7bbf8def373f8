// ABOUTME: Inline-script extractors: embedded product data blocks, analytics price blobs, direct assignments.
// ABOUTME: All three read raw script text and apply cents normalization to the parsed values.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extractors::{ExtractorTag, PageContext, PriceCandidate};
use crate::money::parse_positive;

pub const PRODUCT_DATA_CONFIDENCE: u8 = 85;
pub const PIXEL_CONFIDENCE: u8 = 85;
pub const ASSIGNMENT_CONFIDENCE: u8 = 70;

/// How far past the start of a product object to look for its price field.
const PRODUCT_WINDOW: usize = 4000;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap());

static LD_JSON_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)type\s*=\s*["']?application/ld\+json"#).unwrap());

static PRODUCT_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:["']product["']|\bproduct|\bProduct)\s*[:=]\s*\{"#).unwrap()
});

static PRICE_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']?\bprice["']?\s*:\s*["']?(\d[\d.,]*)"#).unwrap());

static PIXEL_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bPrice["']?\s*:\s*["']\s*(?:[$£€]|&#36;)?\s*(\d[\d,]*(?:\.\d+)?)\s*["']"#)
        .unwrap()
});

static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*\.price\s*=\s*["']?(\d[\d.,]*)"#)
        .unwrap()
});

static JSON_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""price"\s*:\s*"?(\d[\d.,]*)"#).unwrap());

/// Bodies of executable inline scripts (JSON-LD blocks are left to the linked-data extractor).
pub(crate) fn inline_scripts(html: &str) -> impl Iterator<Item = &str> {
    SCRIPT_RE.captures_iter(html).filter_map(|caps| {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if LD_JSON_TYPE_RE.is_match(attrs) {
            return None;
        }
        caps.get(2).map(|m| m.as_str())
    })
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn push_unique(out: &mut Vec<PriceCandidate>, candidate: Option<PriceCandidate>) {
    if let Some(c) = candidate {
        if !out.iter().any(|existing| existing.value == c.value) {
            out.push(c);
        }
    }
}

/// Storefront product objects embedded in scripts, e.g. `var meta = {"product": {... "price": 13500}}`.
pub fn extract_product_data(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let mut out = Vec::new();
    for script in inline_scripts(ctx.html) {
        for block in PRODUCT_BLOCK_RE.find_iter(script) {
            let end = floor_boundary(script, block.end() + PRODUCT_WINDOW);
            let window = &script[block.end()..end];
            let Some(raw) = PRICE_FIELD_RE.captures(window).and_then(|c| c.get(1)) else {
                continue;
            };
            let candidate = parse_positive(raw.as_str()).and_then(|v| {
                PriceCandidate::new(
                    ctx.normalize(v),
                    ExtractorTag::EmbeddedProductData,
                    PRODUCT_DATA_CONFIDENCE,
                )
            });
            push_unique(&mut out, candidate);
        }
    }
    out
}

/// Vendor analytics item blobs carrying a formatted price string, e.g. `Price: "$1,234.56"`.
pub fn extract_pixel_price(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let mut out = Vec::new();
    for script in inline_scripts(ctx.html) {
        for caps in PIXEL_PRICE_RE.captures_iter(script) {
            let Some(raw) = caps.get(1) else { continue };
            let candidate = parse_positive(raw.as_str()).and_then(|v| {
                PriceCandidate::new(ctx.normalize(v), ExtractorTag::PixelPrice, PIXEL_CONFIDENCE)
            });
            push_unique(&mut out, candidate);
        }
    }
    out
}

/// First `something.price = value` and first `"price": value` found in any script.
pub fn extract_inline_assignment(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let mut out = Vec::new();
    for pattern in [&*ASSIGNMENT_RE, &*JSON_PRICE_RE] {
        let first = inline_scripts(ctx.html)
            .find_map(|script| pattern.captures(script).and_then(|c| c.get(1)))
            .and_then(|m| parse_positive(m.as_str()));
        let candidate = first.and_then(|v| {
            PriceCandidate::new(
                ctx.normalize(v),
                ExtractorTag::InlineScriptAssignment,
                ASSIGNMENT_CONFIDENCE,
            )
        });
        push_unique(&mut out, candidate);
    }
    out
}
