// ABOUTME: PriceEngine: the cascade that turns a product URL into an ExtractionResult.
// ABOUTME: Tries lightweight then rendered acquisition, running the site override or generic pipeline on each.

//! The resolve cascade.
//!
//! For each strategy in order (lightweight, then rendered when a launcher is
//! configured) the engine acquires content once. A matching site override
//! handler gets first look at that content; if it declines, every generic
//! extractor runs and the resolver picks a winner. The first strategy that
//! yields a price ends the cascade. The site adjustment, if any, is applied to
//! the winning price. Every failure is recorded as data in the result.

use std::sync::Arc;

use chrono::Utc;

use crate::extractors::{collect_for_content, visible, ExtractorTag, PageContext};
use crate::money::{round_cents, Money};
use crate::options::{EngineBuilder, Options};
use crate::overrides::{load_builtin_registry, SiteOverride, SiteOverrideRegistry};
use crate::render::RenderedFetch;
use crate::resolver;
use crate::resource::gate::RequestGate;
use crate::resource::{AcquiredContent, ContentSource, LightweightFetch};
use crate::result::{AcquisitionAttempt, ExtractionResult, Strategy};

/// Characters of content kept in `diagnostic_sample`.
const SAMPLE_LEN: usize = 500;
/// How much of the sample precedes the first mention of "price".
const SAMPLE_LEAD: usize = 150;

const NO_PRICE: &str = "no price found";
const RENDER_UNAVAILABLE: &str = "rendered fetch unavailable";
const ADJUSTMENT_OVERFLOW: &str = "price adjustment overflowed";

/// What won for one piece of content.
#[derive(Debug, Clone, PartialEq)]
struct Resolution {
    price: Money,
    source: ExtractorTag,
    confidence: u8,
    detail: String,
}

/// Resolves product prices. Cheap to share behind an `Arc`; calls may run concurrently.
#[derive(Clone)]
pub struct PriceEngine {
    opts: Options,
    registry: SiteOverrideRegistry,
    lightweight: LightweightFetch,
    rendered: Option<RenderedFetch>,
}

impl std::fmt::Debug for PriceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceEngine")
            .field("opts", &self.opts)
            .field("overrides", &self.registry.len())
            .finish()
    }
}

impl Default for PriceEngine {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl PriceEngine {
    /// Create a new EngineBuilder for configuring the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a new engine with the given options.
    pub fn new(opts: Options) -> Self {
        visible::warm_selectors();

        let gate = opts
            .gate
            .clone()
            .unwrap_or_else(|| Arc::new(RequestGate::new(opts.tuning.request_delay)));
        let lightweight = LightweightFetch::new(&opts, gate);
        let rendered = opts
            .launcher
            .clone()
            .map(|launcher| {
                RenderedFetch::new(launcher, &opts.tuning)
                    .allow_private_networks(opts.allow_private_networks)
            });
        let registry = opts.registry.clone().unwrap_or_else(load_builtin_registry);

        Self {
            opts,
            registry,
            lightweight,
            rendered,
        }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn registry(&self) -> &SiteOverrideRegistry {
        &self.registry
    }

    /// The gate spacing this engine's lightweight requests.
    pub fn gate(&self) -> &Arc<RequestGate> {
        self.lightweight.gate()
    }

    /// Resolve the current price published at `url`.
    pub async fn resolve_price(&self, url: &str) -> ExtractionResult {
        self.resolve_price_for("", url).await
    }

    /// Same as [`resolve_price`](Self::resolve_price), tagging the result with a catalog SKU.
    pub async fn resolve_price_for(&self, sku: &str, url: &str) -> ExtractionResult {
        let mut sources: Vec<&dyn ContentSource> = vec![&self.lightweight];
        if let Some(ref rendered) = self.rendered {
            sources.push(rendered);
        }
        self.cascade(sku, url, &sources).await
    }

    /// Run the override and generic pipeline over markup the caller already has.
    pub fn resolve_html(&self, sku: &str, url: &str, html: &str) -> ExtractionResult {
        let entry = self.registry.lookup(url);
        let content = AcquiredContent::from_html(Strategy::Lightweight, url, html);
        match self.evaluate(&content, entry) {
            Ok(resolution) => ExtractionResult {
                sku: sku.to_string(),
                url: url.to_string(),
                price: Some(resolution.price),
                note: format!("provided html: {}", resolution.detail),
                error: None,
                diagnostic_sample: None,
                strategy: None,
                source: Some(resolution.source),
                attempts: Vec::new(),
                checked_at: Utc::now(),
            },
            Err(reason) => ExtractionResult {
                sku: sku.to_string(),
                url: url.to_string(),
                price: None,
                note: String::new(),
                error: Some(reason.to_string()),
                diagnostic_sample: diagnostic_sample(html),
                strategy: None,
                source: None,
                attempts: Vec::new(),
                checked_at: Utc::now(),
            },
        }
    }

    async fn cascade(
        &self,
        sku: &str,
        url: &str,
        sources: &[&dyn ContentSource],
    ) -> ExtractionResult {
        let entry = self.registry.lookup(url);
        if let Some(entry) = entry {
            tracing::debug!(url, domain = entry.domain(), "site override matched");
        }

        let mut attempts = Vec::new();
        let mut last_html: Option<String> = None;

        for source in sources {
            let strategy = source.strategy();
            let content = match source.acquire(url).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(url, %strategy, error = %err, "acquisition failed");
                    attempts.push(AcquisitionAttempt::failed(strategy, err.reason()));
                    continue;
                }
            };

            match self.evaluate(&content, entry) {
                Ok(resolution) => {
                    tracing::info!(
                        url,
                        %strategy,
                        extractor = %resolution.source,
                        confidence = resolution.confidence,
                        price = %resolution.price,
                        "price resolved"
                    );
                    attempts.push(AcquisitionAttempt::resolved(strategy));
                    return ExtractionResult {
                        sku: sku.to_string(),
                        url: url.to_string(),
                        price: Some(resolution.price),
                        note: format!("{}: {}", strategy, resolution.detail),
                        error: None,
                        diagnostic_sample: None,
                        strategy: Some(strategy),
                        source: Some(resolution.source),
                        attempts,
                        checked_at: Utc::now(),
                    };
                }
                Err(reason) => {
                    tracing::debug!(url, %strategy, reason, "no usable price");
                    attempts.push(AcquisitionAttempt::no_price(strategy, reason));
                    last_html = Some(content.html);
                }
            }
        }

        if !sources.iter().any(|s| s.strategy() == Strategy::Rendered) {
            attempts.push(AcquisitionAttempt::failed(Strategy::Rendered, RENDER_UNAVAILABLE));
        }

        let reasons = attempts
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        tracing::warn!(url, reasons = %reasons, "all strategies exhausted");

        ExtractionResult {
            sku: sku.to_string(),
            url: url.to_string(),
            price: None,
            note: String::new(),
            error: Some(format!("{NO_PRICE}: {reasons}")),
            diagnostic_sample: last_html.as_deref().and_then(diagnostic_sample),
            strategy: None,
            source: None,
            attempts,
            checked_at: Utc::now(),
        }
    }

    /// Override first, then the generic pool; the adjustment applies to either.
    fn evaluate(
        &self,
        content: &AcquiredContent,
        entry: Option<&SiteOverride>,
    ) -> Result<Resolution, &'static str> {
        let ctx = PageContext::new(&content.url, &content.html, &self.opts.normalization);

        let mut resolution = entry
            .and_then(|e| {
                let price = e.try_extract(&ctx)?;
                let kind = e.handler().map(|h| h.kind()).unwrap_or("custom");
                Some(Resolution {
                    price: round_cents(price),
                    source: ExtractorTag::SiteOverride,
                    confidence: 100,
                    detail: format!("site_override {} ({})", e.domain(), kind),
                })
            })
            .or_else(|| {
                let pool = collect_for_content(content, &self.opts.normalization);
                let winner = resolver::select(&pool)?;
                tracing::debug!(
                    url = %content.url,
                    candidates = pool.len(),
                    extractor = %winner.source,
                    "resolver picked candidate"
                );
                Some(Resolution {
                    price: round_cents(winner.value),
                    source: winner.source,
                    confidence: winner.confidence,
                    detail: format!("{} (confidence {})", winner.source, winner.confidence),
                })
            })
            .ok_or(NO_PRICE)?;

        if let Some(adjustment) = entry.and_then(|e| e.adjustment()) {
            let price = resolution.price;
            resolution.price = adjustment.apply(price).ok_or_else(|| {
                tracing::warn!(url = %content.url, %price, "adjusted price overflowed; discarding");
                ADJUSTMENT_OVERFLOW
            })?;
            resolution.detail = format!(
                "{}, adjusted x{} x{}",
                resolution.detail,
                adjustment.tax_factor(),
                adjustment.markup_factor()
            );
        }
        Ok(resolution)
    }
}

/// Excerpt around the first mention of "price", or the start of the content.
fn diagnostic_sample(html: &str) -> Option<String> {
    let trimmed = html.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    let start_byte = lower
        .find("price")
        .map(|pos| pos.saturating_sub(SAMPLE_LEAD))
        .unwrap_or(0);
    let mut start = start_byte;
    while !trimmed.is_char_boundary(start) {
        start -= 1;
    }
    Some(trimmed[start..].chars().take(SAMPLE_LEN).collect())
}
