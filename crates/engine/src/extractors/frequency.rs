// ABOUTME: Last-resort extractor nominating the most frequent currency-formatted amount in the content.
// ABOUTME: Demoted to confidence 50 when one value dominates, which usually means a repeated listing price.

use std::collections::HashMap;

use crate::extractors::{ExtractorTag, PageContext, PriceCandidate};
use crate::money::{currency_amounts, Money};

pub const CONFIDENCE: u8 = 60;
pub const DOMINANT_CONFIDENCE: u8 = 50;

pub fn extract(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let amounts = currency_amounts(ctx.html);
    if amounts.is_empty() {
        return Vec::new();
    }

    let total = amounts.len();
    let mut histogram: HashMap<Money, usize> = HashMap::new();
    for value in amounts {
        *histogram.entry(value.normalize()).or_default() += 1;
    }

    // Highest count, then highest value.
    let Some((value, count)) = histogram
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(va.cmp(vb)))
    else {
        return Vec::new();
    };

    let confidence = if count * 2 > total {
        DOMINANT_CONFIDENCE
    } else {
        CONFIDENCE
    };
    tracing::debug!(%value, count, total, confidence, "frequency fallback nominee");

    PriceCandidate::new(value, ExtractorTag::FrequencyFallback, confidence)
        .into_iter()
        .collect()
}
