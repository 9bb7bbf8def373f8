// ABOUTME: Candidate extractors: an ordered list of pure functions that each emit PriceCandidates.
// ABOUTME: Defines PriceCandidate, ExtractorTag, PageContext, and the generic/rendered pipelines.

//! Price candidate extraction.
//!
//! Each extractor scans one category of price signal and returns zero or more
//! candidates. All applicable extractors run and their output is pooled; the
//! frequency fallback only runs when nothing else produced a candidate.
//!
//! Submodules:
//! - `metadata`: page-level `price:amount` meta annotations.
//! - `scripts`: embedded product data, analytics price blobs, inline assignments.
//! - `linked_data`: JSON-LD `Product` offers.
//! - `visible`: known price-bearing markup regions.
//! - `frequency`: most frequent currency-formatted amount.
//! - `dom`: rendered-only signals (visible DOM nodes, intercepted API responses).
//! - `compiled`, `select`: selector cache and selector-based text extraction.

pub mod compiled;
pub mod dom;
pub mod frequency;
pub mod linked_data;
pub mod metadata;
pub mod scripts;
pub mod select;
pub mod visible;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{positive, Money};
use crate::options::CentsNormalization;
use crate::resource::AcquiredContent;

/// Identifies which extractor produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorTag {
    StructuredMetadata,
    EmbeddedProductData,
    PixelPrice,
    LinkedDataOffer,
    VisiblePriceElement,
    InlineScriptAssignment,
    FrequencyFallback,
    RenderedDom,
    InterceptedApi,
    SiteOverride,
}

impl ExtractorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorTag::StructuredMetadata => "structured_metadata",
            ExtractorTag::EmbeddedProductData => "embedded_product_data",
            ExtractorTag::PixelPrice => "pixel_price",
            ExtractorTag::LinkedDataOffer => "linked_data_offer",
            ExtractorTag::VisiblePriceElement => "visible_price_element",
            ExtractorTag::InlineScriptAssignment => "inline_script_assignment",
            ExtractorTag::FrequencyFallback => "frequency_fallback",
            ExtractorTag::RenderedDom => "rendered_dom",
            ExtractorTag::InterceptedApi => "intercepted_api",
            ExtractorTag::SiteOverride => "site_override",
        }
    }
}

impl fmt::Display for ExtractorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single extractor's proposed price and how much it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceCandidate {
    pub value: Money,
    pub source: ExtractorTag,
    pub confidence: u8,
}

impl PriceCandidate {
    /// Returns `None` unless `value` is strictly positive. Confidence is capped at 100.
    pub fn new(value: Decimal, source: ExtractorTag, confidence: u8) -> Option<Self> {
        positive(value).map(|value| Self {
            value,
            source,
            confidence: confidence.min(100),
        })
    }
}

/// Input shared by all extractors for one content payload.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub url: &'a str,
    pub html: &'a str,
    pub normalization: &'a CentsNormalization,
}

impl<'a> PageContext<'a> {
    pub fn new(url: &'a str, html: &'a str, normalization: &'a CentsNormalization) -> Self {
        Self {
            url,
            html,
            normalization,
        }
    }

    /// Apply cents normalization for values read from script or API data.
    pub fn normalize(&self, value: Decimal) -> Decimal {
        self.normalization.apply(value, self.url)
    }
}

/// A named extractor function.
#[derive(Clone, Copy)]
pub struct Extractor {
    pub tag: ExtractorTag,
    pub run: fn(&PageContext<'_>) -> Vec<PriceCandidate>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor").field("tag", &self.tag).finish()
    }
}

/// Generic extractors in descending default confidence.
pub const GENERIC_EXTRACTORS: &[Extractor] = &[
    Extractor {
        tag: ExtractorTag::StructuredMetadata,
        run: metadata::extract,
    },
    Extractor {
        tag: ExtractorTag::EmbeddedProductData,
        run: scripts::extract_product_data,
    },
    Extractor {
        tag: ExtractorTag::PixelPrice,
        run: scripts::extract_pixel_price,
    },
    Extractor {
        tag: ExtractorTag::LinkedDataOffer,
        run: linked_data::extract,
    },
    Extractor {
        tag: ExtractorTag::VisiblePriceElement,
        run: visible::extract,
    },
    Extractor {
        tag: ExtractorTag::InlineScriptAssignment,
        run: scripts::extract_inline_assignment,
    },
];

/// Runs only when every other extractor came up empty.
pub const FALLBACK_EXTRACTOR: Extractor = Extractor {
    tag: ExtractorTag::FrequencyFallback,
    run: frequency::extract,
};

fn run_generic(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let mut pool = Vec::new();
    for extractor in GENERIC_EXTRACTORS {
        let found = (extractor.run)(ctx);
        if !found.is_empty() {
            tracing::debug!(
                extractor = %extractor.tag,
                count = found.len(),
                "extractor produced candidates"
            );
        }
        pool.extend(found);
    }
    pool
}

fn with_fallback(ctx: &PageContext<'_>, pool: Vec<PriceCandidate>) -> Vec<PriceCandidate> {
    if pool.is_empty() {
        (FALLBACK_EXTRACTOR.run)(ctx)
    } else {
        pool
    }
}

/// Pools candidates from every generic extractor over markup.
pub fn collect_candidates(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let pool = run_generic(ctx);
    with_fallback(ctx, pool)
}

/// Pools candidates for acquired content: generic extractors over its markup,
/// plus the DOM and intercepted-API extractors when it came from a browser.
pub fn collect_for_content(
    content: &AcquiredContent,
    normalization: &CentsNormalization,
) -> Vec<PriceCandidate> {
    let ctx = PageContext::new(&content.url, &content.html, normalization);
    let mut pool = run_generic(&ctx);
    pool.extend(dom::from_visible_nodes(&content.dom_nodes));
    pool.extend(dom::from_api_payloads(&ctx, &content.api_payloads));
    with_fallback(&ctx, pool)
}
