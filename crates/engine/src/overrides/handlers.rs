// ABOUTME: Built-in SiteOverrideHandler implementations configurable from the override table.
// ABOUTME: Selector lists, Shopify ?variant= pricing, and a named inline script variable.

use dom_query::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::extractors::select::{first_value, SelectorSpec};
use crate::extractors::PageContext;
use crate::money::{currency_amounts, parse_positive, Money};
use crate::overrides::SiteOverrideHandler;

/// Reads the price from the first configured selector that matches.
#[derive(Debug, Clone)]
pub struct SelectorHandler {
    selectors: Vec<SelectorSpec>,
}

impl SelectorHandler {
    pub fn new(selectors: Vec<SelectorSpec>) -> Self {
        crate::extractors::compiled::precompile_selectors(
            selectors.iter().map(|s| s.parts().0.to_string()),
        );
        Self { selectors }
    }

    pub fn selectors(&self) -> &[SelectorSpec] {
        &self.selectors
    }
}

impl SiteOverrideHandler for SelectorHandler {
    fn kind(&self) -> &'static str {
        "selectors"
    }

    fn extract(&self, ctx: &PageContext<'_>) -> Option<Money> {
        let doc = Document::from(ctx.html);
        let text = first_value(&doc, &self.selectors)?;
        currency_amounts(&text)
            .into_iter()
            .next()
            .or_else(|| parse_positive(&text))
    }
}

/// Shopify storefronts: price of the variant named by `?variant=<id>`.
///
/// Variant prices in the storefront's embedded product JSON are integer
/// cents; a value that already has a decimal point is taken as-is.
#[derive(Debug, Clone, Default)]
pub struct ShopifyVariantHandler;

/// How far past a variant's id to look for its price.
const VARIANT_WINDOW: usize = 1500;

static VARIANT_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""price"\s*:\s*"?(\d+(?:\.\d+)?)"?"#).unwrap());

impl ShopifyVariantHandler {
    fn variant_id(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == "variant")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
    }
}

impl SiteOverrideHandler for ShopifyVariantHandler {
    fn kind(&self) -> &'static str {
        "shopify_variant"
    }

    fn matches(&self, url: &str) -> bool {
        Self::variant_id(url).is_some()
    }

    fn extract(&self, ctx: &PageContext<'_>) -> Option<Money> {
        let id = Self::variant_id(ctx.url)?;
        let id_re = Regex::new(&format!(r#""id"\s*:\s*"?{}\b"#, regex::escape(&id))).ok()?;

        for found in id_re.find_iter(ctx.html) {
            let mut end = (found.end() + VARIANT_WINDOW).min(ctx.html.len());
            while !ctx.html.is_char_boundary(end) {
                end -= 1;
            }
            let window = &ctx.html[found.end()..end];
            let Some(raw) = VARIANT_PRICE_RE.captures(window).and_then(|c| c.get(1)) else {
                continue;
            };
            let raw = raw.as_str();
            let value = parse_positive(raw)?;
            return Some(if raw.contains('.') {
                value
            } else {
                value / Money::ONE_HUNDRED
            });
        }
        None
    }
}

/// A named inline script variable or object key, e.g. `productPrice = 249.95`.
#[derive(Debug, Clone)]
pub struct ScriptVariableHandler {
    name: String,
    pattern: Regex,
}

impl ScriptVariableHandler {
    pub fn new(name: impl Into<String>) -> Result<Self, regex::Error> {
        let name = name.into();
        let pattern = Regex::new(&format!(
            r#"["']?\b{}["']?\s*[=:]\s*["']?(\d[\d.,]*)"#,
            regex::escape(&name)
        ))?;
        Ok(Self { name, pattern })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SiteOverrideHandler for ScriptVariableHandler {
    fn kind(&self) -> &'static str {
        "script_variable"
    }

    fn extract(&self, ctx: &PageContext<'_>) -> Option<Money> {
        let raw = self.pattern.captures(ctx.html)?.get(1)?;
        parse_positive(raw.as_str()).map(|v| ctx.normalize(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CentsNormalization;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn selector_handler_reads_first_matching_spec() {
        let handler = SelectorHandler::new(vec![
            SelectorSpec::Css(".ProductMeta__Price".into()),
            SelectorSpec::CssAttr(vec!["meta[itemprop=price]".into(), "content".into()]),
        ]);
        let html = r#"<meta itemprop="price" content="1,049.00"><span class="price">$5.00</span>"#;
        let norm = CentsNormalization::default();
        let ctx = PageContext::new("https://goapr.com/p", html, &norm);
        assert_eq!(handler.extract(&ctx), Some(d("1049.00")));
    }

    #[test]
    fn selector_handler_prefers_currency_amount_in_text() {
        let handler = SelectorHandler::new(vec![SelectorSpec::Css(".price-box".into())]);
        let html = r#"<div class="price-box">Qty 2 for $89.90</div>"#;
        let norm = CentsNormalization::default();
        let ctx = PageContext::new("https://goapr.com/p", html, &norm);
        assert_eq!(handler.extract(&ctx), Some(d("89.90")));
    }

    const SHOPIFY_HTML: &str = r#"<script>
        var meta = {"product":{"id":700,"variants":[
            {"id":41001,"price":45900,"name":"Coilover - Street"},
            {"id":41002,"price":52900,"name":"Coilover - Track"}
        ]}};
    </script>"#;

    #[test]
    fn shopify_variant_picks_requested_variant_in_cents() {
        let norm = CentsNormalization::default();
        let url = "https://store.myshopify.com/products/coilover?variant=41002";
        let ctx = PageContext::new(url, SHOPIFY_HTML, &norm);
        let handler = ShopifyVariantHandler;
        assert!(handler.matches(url));
        assert_eq!(handler.extract(&ctx), Some(d("529")));
    }

    #[test]
    fn shopify_variant_requires_variant_param() {
        let handler = ShopifyVariantHandler;
        assert!(!handler.matches("https://store.myshopify.com/products/coilover"));
        assert!(!handler.matches("https://store.myshopify.com/products/coilover?variant=abc"));
    }

    #[test]
    fn shopify_variant_decimal_price_kept() {
        let norm = CentsNormalization::default();
        let html = r#"{"variants":[{"id":9,"title":"Default","price":"129.95"}]}"#;
        let ctx = PageContext::new("https://s.test/products/x?variant=9", html, &norm);
        assert_eq!(ShopifyVariantHandler.extract(&ctx), Some(d("129.95")));
    }

    #[test]
    fn shopify_unknown_variant_yields_none() {
        let norm = CentsNormalization::default();
        let ctx = PageContext::new("https://s.test/products/x?variant=410", SHOPIFY_HTML, &norm);
        assert_eq!(ShopifyVariantHandler.extract(&ctx), None);
    }

    #[test]
    fn script_variable_handler() {
        let handler = ScriptVariableHandler::new("productPrice").unwrap();
        let norm = CentsNormalization::default();
        let html = r#"<script>var productPrice = 249.95; var shipping = 12;</script>"#;
        let ctx = PageContext::new("https://bilstein.test/p", html, &norm);
        assert_eq!(handler.extract(&ctx), Some(d("249.95")));
        assert_eq!(handler.name(), "productPrice");

        let cents = r#"<script>window.cfg = {"productPrice": "24995"};</script>"#;
        let ctx = PageContext::new("https://bilstein.test/p", cents, &norm);
        assert_eq!(handler.extract(&ctx), Some(d("249.95")));
    }
}
