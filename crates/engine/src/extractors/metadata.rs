// ABOUTME: Structured price metadata extractor for OpenGraph-style price:amount meta tags.
// ABOUTME: Matches attributes in either order; values are taken as-is with no cents normalization.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extractors::{ExtractorTag, PageContext, PriceCandidate};
use crate::money::parse_positive;

pub const CONFIDENCE: u8 = 90;

static META_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // property/name before content
        r#"(?is)<meta\b[^>]*?\b(?:property|name)\s*=\s*["'](?:og:|product:)?price:amount["'][^>]*?\bcontent\s*=\s*["']([^"']*)["']"#,
        // content before property/name
        r#"(?is)<meta\b[^>]*?\bcontent\s*=\s*["']([^"']*)["'][^>]*?\b(?:property|name)\s*=\s*["'](?:og:|product:)?price:amount["']"#,
        // microdata annotation on a meta tag
        r#"(?is)<meta\b[^>]*?\bitemprop\s*=\s*["']price["'][^>]*?\bcontent\s*=\s*["']([^"']*)["']"#,
        r#"(?is)<meta\b[^>]*?\bcontent\s*=\s*["']([^"']*)["'][^>]*?\bitemprop\s*=\s*["']price["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub fn extract(ctx: &PageContext<'_>) -> Vec<PriceCandidate> {
    let mut out: Vec<PriceCandidate> = Vec::new();
    for pattern in META_PATTERNS.iter() {
        for caps in pattern.captures_iter(ctx.html) {
            let Some(raw) = caps.get(1) else { continue };
            let Some(value) = parse_positive(raw.as_str()) else {
                continue;
            };
            if out.iter().any(|c| c.value == value) {
                continue;
            }
            if let Some(candidate) =
                PriceCandidate::new(value, ExtractorTag::StructuredMetadata, CONFIDENCE)
            {
                out.push(candidate);
            }
        }
    }
    out
}
