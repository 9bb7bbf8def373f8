// ABOUTME: Visible price element extractor over a fixed, ordered list of storefront price selectors.
// ABOUTME: The first selector whose elements carry an amount wins; amounts come from that first element only.

use dom_query::Document;

use crate::extractors::compiled::{get_or_compile, precompile_selectors};
use crate::extractors::{ExtractorTag, PageContext, PriceCandidate};
use crate::money::{bare_amounts, currency_amounts, parse_positive, Money};

pub const CONFIDENCE: u8 = 75;

/// Price-bearing regions used by common storefront themes, most specific first.
pub const PRICE_SELECTORS: &[&str] = &[
    "[itemprop='price']",
    "[data-product-price]",
    ".price-item--sale",
    ".price-item--regular",
    ".product__price",
    ".product-single__price",
    ".ProductMeta__Price",
    "#productPrice",
    "#ProductPrice",
    ".product-price",
    ".price--main",
    ".price-sales",
    ".woocommerce-Price-amount",
    ".our_price_display",
    ".price-wrapper",
    ".product-info-price .price",
    ".price",
];

/// Warms the selector cache; called once when an engine is built.
pub fn warm_selectors() {
    precompile_selectors(PRICE_SELECTORS.iter().copied());
}

pub fn extract(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let doc = Document::from(ctx.html);
    for css in PRICE_SELECTORS {
        let Some(matcher) = get_or_compile(css) else {
            continue;
        };
        for el in doc.select_matcher(&matcher).iter() {
            let amounts = element_amounts(&el);
            if amounts.is_empty() {
                continue;
            }
            tracing::trace!(selector = css, count = amounts.len(), "visible price region");
            return amounts
                .into_iter()
                .filter_map(|v| PriceCandidate::new(v, ExtractorTag::VisiblePriceElement, CONFIDENCE))
                .collect();
        }
    }
    Vec::new()
}

fn element_amounts(el: &dom_query::Selection<'_>) -> Vec<Money> {
    // Microdata nodes often keep the machine-readable value in `content`.
    if let Some(content) = el.attr("content") {
        if let Some(v) = parse_positive(&content) {
            return vec![v];
        }
    }

    let text = el.text();
    let mut found = currency_amounts(&text);
    if found.is_empty() {
        found = bare_amounts(&text);
    }
    let mut unique: Vec<Money> = Vec::with_capacity(found.len());
    for v in found {
        if !unique.contains(&v) {
            unique.push(v);
        }
    }
    unique
}
