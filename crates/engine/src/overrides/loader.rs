// ABOUTME: JSON loader for the site override table, from the embedded builtin file or a path on disk.
// ABOUTME: Validates domains and adjustment factors and builds the handler named by each entry.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::extractors::select::SelectorSpec;
use crate::overrides::handlers::{ScriptVariableHandler, SelectorHandler, ShopifyVariantHandler};
use crate::overrides::{SiteAdjustment, SiteOverride, SiteOverrideRegistry};

/// Embedded JSON containing the default override table.
const BUILTIN_OVERRIDES_JSON: &str = include_str!("../../data/site_overrides.json");

#[derive(Debug, Deserialize)]
struct OverrideEntry {
    domain: String,
    #[serde(default)]
    supported_domains: Vec<String>,
    #[serde(default)]
    handler: Option<HandlerEntry>,
    #[serde(default)]
    adjustment: Option<AdjustmentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HandlerEntry {
    Selectors { selectors: Vec<SelectorSpec> },
    ShopifyVariant,
    ScriptVariable { name: String },
}

fn one() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Deserialize)]
struct AdjustmentEntry {
    #[serde(default = "one")]
    tax_factor: Decimal,
    #[serde(default = "one")]
    markup_factor: Decimal,
}

fn build_entry(entry: OverrideEntry) -> Result<SiteOverride, ConfigError> {
    let domain = entry.domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return Err(ConfigError::EmptyDomain);
    }

    let mut site = SiteOverride::new(&domain);
    for extra in entry.supported_domains {
        site = site.with_supported_domain(extra);
    }

    site = match entry.handler {
        Some(HandlerEntry::Selectors { selectors }) => site.with_handler(SelectorHandler::new(selectors)),
        Some(HandlerEntry::ShopifyVariant) => site.with_handler(ShopifyVariantHandler),
        Some(HandlerEntry::ScriptVariable { name }) => {
            let handler = ScriptVariableHandler::new(name).map_err(|e| ConfigError::InvalidHandler {
                domain: domain.clone(),
                reason: e.to_string(),
            })?;
            site.with_handler(handler)
        }
        None => site,
    };

    if let Some(adj) = entry.adjustment {
        site = site.with_adjustment(SiteAdjustment::new(&domain, adj.tax_factor, adj.markup_factor)?);
    }
    Ok(site)
}

/// Parses an override table from JSON text.
pub fn parse_registry(json: &str) -> Result<SiteOverrideRegistry, ConfigError> {
    let entries: Vec<OverrideEntry> = serde_json::from_str(json)?;
    let mut registry = SiteOverrideRegistry::new();
    for entry in entries {
        registry.register(build_entry(entry)?)?;
    }
    Ok(registry)
}

/// Reads and parses an override table file.
pub fn load_registry_from_path(path: impl AsRef<Path>) -> Result<SiteOverrideRegistry, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let registry = parse_registry(&json)?;
    tracing::debug!(path = %path.display(), entries = registry.len(), "loaded site overrides");
    Ok(registry)
}

/// Loads the builtin override table from embedded JSON.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed; it is covered by tests.
pub fn load_builtin_registry() -> SiteOverrideRegistry {
    parse_registry(BUILTIN_OVERRIDES_JSON).expect("failed to parse builtin site overrides")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn builtin_registry_loads() {
        let registry = load_builtin_registry();
        assert!(!registry.is_empty());
        let entry = registry
            .lookup("https://www.goapr.com/products/carbon-intake")
            .expect("goapr.com entry");
        assert_eq!(entry.handler().map(|h| h.kind()), Some("selectors"));
    }

    #[test]
    fn builtin_shopify_entry() {
        let registry = load_builtin_registry();
        let entry = registry
            .lookup("https://artec-store.myshopify.com/products/kit?variant=1")
            .expect("myshopify entry");
        assert_eq!(entry.handler().map(|h| h.kind()), Some("shopify_variant"));
    }

    #[test]
    fn parses_all_handler_kinds_and_adjustments() {
        let json = r#"[
            {"domain": "one.test", "handler": {"type": "selectors", "selectors": [".price", ["meta[itemprop=price]", "content"]]}},
            {"domain": "two.test", "supported_domains": ["two-eu.test"], "handler": {"type": "shopify_variant"}},
            {"domain": "three.test", "handler": {"type": "script_variable", "name": "productPrice"},
             "adjustment": {"tax_factor": "1.1", "markup_factor": 1.2}},
            {"domain": "four.test", "adjustment": {"markup_factor": "1.25"}}
        ]"#;
        let registry = parse_registry(json).unwrap();
        assert_eq!(registry.len(), 4);

        let three = registry.lookup("https://three.test/p").unwrap();
        let adj = three.adjustment().unwrap();
        assert_eq!(adj.tax_factor(), Decimal::from_str("1.1").unwrap());
        assert_eq!(adj.markup_factor(), Decimal::from_str("1.2").unwrap());

        let four = registry.lookup("https://www.four.test/p").unwrap();
        assert!(four.handler().is_none());
        assert_eq!(four.adjustment().unwrap().tax_factor(), Decimal::ONE);

        assert!(registry.lookup("https://two-eu.test/x").is_some());
    }

    #[test]
    fn invalid_factor_is_config_error() {
        let json = r#"[{"domain": "cheap.test", "adjustment": {"tax_factor": "0.8"}}]"#;
        assert!(matches!(
            parse_registry(json),
            Err(ConfigError::InvalidFactor { .. })
        ));
    }

    #[test]
    fn malformed_and_empty_domain() {
        assert!(matches!(parse_registry("{not json"), Err(ConfigError::Malformed(_))));
        assert!(matches!(
            parse_registry(r#"[{"domain": " "}]"#),
            Err(ConfigError::EmptyDomain)
        ));
        assert!(matches!(
            parse_registry(r#"[{"domain": "x.test", "handler": {"type": "teleport"}}]"#),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"domain": "file.test"}}]"#).unwrap();
        let registry = load_registry_from_path(file.path()).unwrap();
        assert_eq!(registry.len(), 1);

        let missing = load_registry_from_path("/nonexistent/overrides.json");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
