// ABOUTME: Selector specs for site override tables and the text/attribute lookup behind them.
// ABOUTME: Selectors are tried in order; the first one yielding a non-empty value wins.

//! Selector-based value lookup.
//!
//! A `SelectorSpec` is either a bare CSS selector (inner text is read) or a
//! `[selector, attribute]` pair (the attribute value is read). Override
//! tables list several specs per site so that a theme change on one element
//! does not immediately break price extraction for that site.

use dom_query::{Document, Selection};
use serde::{Deserialize, Serialize};

use crate::extractors::compiled::get_or_compile;

/// How to read a value out of the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    /// Read inner text, e.g. `"span.price-item--sale"`.
    Css(String),
    /// Read an attribute, e.g. `["meta[itemprop=price]", "content"]`.
    CssAttr(Vec<String>),
}

impl SelectorSpec {
    /// The CSS part and the optional attribute name.
    pub fn parts(&self) -> (&str, Option<&str>) {
        match self {
            SelectorSpec::Css(css) => (css.as_str(), None),
            SelectorSpec::CssAttr(parts) => match parts.as_slice() {
                [css, attr, ..] => (css.as_str(), Some(attr.as_str())),
                [css] => (css.as_str(), None),
                [] => ("", None),
            },
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All non-empty values for one spec, in document order.
pub fn select_values(doc: &Document, spec: &SelectorSpec) -> Vec<String> {
    let (css, attr) = spec.parts();
    if css.is_empty() {
        return Vec::new();
    }
    let Some(matcher) = get_or_compile(css) else {
        return Vec::new();
    };

    doc.select_matcher(&matcher)
        .iter()
        .filter_map(|el: Selection<'_>| {
            let raw = match attr {
                Some(name) => el.attr(name).map(|v| v.to_string())?,
                None => el.text().to_string(),
            };
            let value = normalize_whitespace(&raw);
            (!value.is_empty()).then_some(value)
        })
        .collect()
}

/// First non-empty value from the first spec that matches anything.
pub fn first_value(doc: &Document, specs: &[SelectorSpec]) -> Option<String> {
    specs
        .iter()
        .find_map(|spec| select_values(doc, spec).into_iter().next())
}
