// ABOUTME: Site override registry: per-domain custom price handlers and post-resolution price adjustments.
// ABOUTME: Entries match by case-insensitive hostname substring; the first matching entry in table order applies.

//! Site overrides.
//!
//! Some storefronts defeat the generic extractors (the visible price is
//! injected late, or the page carries several unrelated prices). For those
//! domains an entry can name a [`SiteOverrideHandler`] that is tried on the
//! acquired content before the generic pipeline. Independently, an entry can
//! carry a [`SiteAdjustment`] (tax and markup factors) applied to whatever
//! price is finally resolved for the domain.
//!
//! Entries come from a JSON table (see [`loader`]) or are registered in code.

pub mod handlers;
pub mod loader;

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use url::Url;

use crate::error::ConfigError;
use crate::extractors::PageContext;
use crate::money::{positive, round_cents, Money};

pub use handlers::{ScriptVariableHandler, SelectorHandler, ShopifyVariantHandler};
pub use loader::{load_builtin_registry, load_registry_from_path, parse_registry};

/// Custom price extraction for a problem domain.
pub trait SiteOverrideHandler: Send + Sync + fmt::Debug {
    /// Short name used in logs and notes.
    fn kind(&self) -> &'static str;

    /// Whether this handler applies to the given URL. Domain matching is done
    /// by the registry; handlers only refine it (e.g. require a query param).
    fn matches(&self, _url: &str) -> bool {
        true
    }

    /// The price found on the page, if any.
    fn extract(&self, ctx: &PageContext<'_>) -> Option<Money>;
}

/// Multiplicative tax and markup applied after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteAdjustment {
    tax_factor: Decimal,
    markup_factor: Decimal,
}

impl SiteAdjustment {
    /// Both factors must be at least 1.
    pub fn new(domain: &str, tax_factor: Decimal, markup_factor: Decimal) -> Result<Self, ConfigError> {
        for (field, value) in [("tax_factor", tax_factor), ("markup_factor", markup_factor)] {
            if value < Decimal::ONE {
                return Err(ConfigError::InvalidFactor {
                    domain: domain.to_string(),
                    field,
                    value,
                });
            }
        }
        Ok(Self {
            tax_factor,
            markup_factor,
        })
    }

    pub fn tax_factor(&self) -> Decimal {
        self.tax_factor
    }

    pub fn markup_factor(&self) -> Decimal {
        self.markup_factor
    }

    /// `round(price * tax * markup, 2)`, or `None` if the product overflows.
    pub fn apply(&self, price: Money) -> Option<Money> {
        price
            .checked_mul(self.tax_factor)?
            .checked_mul(self.markup_factor)
            .map(round_cents)
    }
}

/// One row of the override table.
#[derive(Debug, Clone)]
pub struct SiteOverride {
    domain: String,
    supported_domains: Vec<String>,
    handler: Option<Arc<dyn SiteOverrideHandler>>,
    adjustment: Option<SiteAdjustment>,
}

impl SiteOverride {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().to_ascii_lowercase(),
            supported_domains: Vec::new(),
            handler: None,
            adjustment: None,
        }
    }

    pub fn with_supported_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into().trim().to_ascii_lowercase();
        if !domain.is_empty() {
            self.supported_domains.push(domain);
        }
        self
    }

    pub fn with_handler(mut self, handler: impl SiteOverrideHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_shared_handler(mut self, handler: Arc<dyn SiteOverrideHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_adjustment(mut self, adjustment: SiteAdjustment) -> Self {
        self.adjustment = Some(adjustment);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn supported_domains(&self) -> &[String] {
        &self.supported_domains
    }

    pub fn handler(&self) -> Option<&dyn SiteOverrideHandler> {
        self.handler.as_deref()
    }

    pub fn adjustment(&self) -> Option<SiteAdjustment> {
        self.adjustment
    }

    /// Case-insensitive substring match against the primary and supported domains.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        std::iter::once(&self.domain)
            .chain(self.supported_domains.iter())
            .any(|pattern| !pattern.is_empty() && host.contains(pattern.as_str()))
    }

    /// Runs the custom handler, if one is configured and applies to this URL.
    pub fn try_extract(&self, ctx: &PageContext<'_>) -> Option<Money> {
        let handler = self.handler.as_ref()?;
        if !handler.matches(ctx.url) {
            return None;
        }
        let price = handler.extract(ctx).and_then(positive);
        tracing::debug!(
            domain = %self.domain,
            handler = handler.kind(),
            price = ?price,
            "site override handler ran"
        );
        price
    }

    /// Applies the configured adjustment; a missing adjustment leaves the price unchanged.
    pub fn adjust(&self, price: Money) -> Option<Money> {
        match self.adjustment {
            Some(adjustment) => adjustment.apply(price),
            None => Some(price),
        }
    }
}

/// Ordered table of site overrides.
#[derive(Debug, Clone, Default)]
pub struct SiteOverrideRegistry {
    entries: Vec<SiteOverride>,
}

impl SiteOverrideRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Earlier entries win when several match a host.
    pub fn register(&mut self, entry: SiteOverride) -> Result<(), ConfigError> {
        if entry.domain.is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Appends every entry of `other` after the existing ones.
    pub fn extend(&mut self, other: SiteOverrideRegistry) {
        self.entries.extend(other.entries);
    }

    /// The first entry whose domain patterns match the URL's host.
    pub fn lookup(&self, url: &str) -> Option<&SiteOverride> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.entries.iter().find(|entry| entry.matches_host(host))
    }

    pub fn entries(&self) -> &[SiteOverride] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
