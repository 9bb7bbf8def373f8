// ABOUTME: Process-wide cache of compiled dom_query matchers keyed by selector text.
// ABOUTME: Shared by the visible-price extractor and selector-based site override handlers.

use std::collections::HashMap;
use std::sync::RwLock;

use dom_query::Matcher;
use once_cell::sync::Lazy;

/// Invalid selectors are cached as `None` so they are only parsed once.
static MATCHERS: Lazy<RwLock<HashMap<String, Option<Matcher>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the compiled matcher for `css`, compiling it on first use.
pub fn get_or_compile(css: &str) -> Option<Matcher> {
    {
        let cache = MATCHERS.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Matcher::new(css).ok();
    if compiled.is_none() {
        tracing::debug!(selector = css, "invalid price selector");
    }
    let mut cache = MATCHERS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    cache
        .entry(css.to_string())
        .or_insert(compiled)
        .clone()
}

/// Compiles a batch of selectors up front, e.g. the built-in price regions or
/// the selectors named by a freshly loaded override table.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cache = MATCHERS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    for css in selectors {
        let css = css.as_ref();
        if !cache.contains_key(css) {
            cache.insert(css.to_string(), Matcher::new(css).ok());
        }
    }
}
