// ABOUTME: Configuration for the price engine: acquisition tuning, cents normalization, and EngineBuilder.
// ABOUTME: EngineBuilder provides a fluent API for constructing PriceEngine instances with custom settings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use rust_decimal::Decimal;

use crate::engine::PriceEngine;
use crate::overrides::SiteOverrideRegistry;
use crate::render::BrowserLauncher;
use crate::resource::gate::RequestGate;

/// Browser-like user agent sent by the lightweight fetch.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Timing and retry constants for both acquisition strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTuning {
    /// Minimum delay between two outbound lightweight requests.
    pub request_delay: Duration,
    /// Sleep after an HTTP 429 before retrying the same request.
    pub rate_limit_backoff: Duration,
    /// Retries of a single request after rate limiting.
    pub max_retries: u32,
    /// Per-request timeout of the lightweight fetch.
    pub request_timeout: Duration,
    /// Quiet window with no in-flight requests that counts as network idle.
    pub render_settle: Duration,
    /// Hard limit for one rendered page load.
    pub render_timeout: Duration,
}

impl Default for AcquisitionTuning {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            rate_limit_backoff: Duration::from_secs(5),
            max_retries: 2,
            request_timeout: Duration::from_secs(30),
            render_settle: Duration::from_millis(500),
            render_timeout: Duration::from_secs(30),
        }
    }
}

/// Reinterprets improbably large whole-number prices as minor currency units.
///
/// Applies when the parsed value exceeds `threshold`, has no fractional part,
/// and the page URL contains none of the exemption keywords (matched
/// case-insensitively).
#[derive(Debug, Clone)]
pub struct CentsNormalization {
    threshold: Decimal,
    keywords: Vec<String>,
    matcher: Option<AhoCorasick>,
}

impl CentsNormalization {
    pub fn new<I, S>(threshold: Decimal, exempt_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = exempt_keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .collect();
        let matcher = if keywords.is_empty() {
            None
        } else {
            AhoCorasickBuilder::new()
                .ascii_case_insensitive(true)
                .build(&keywords)
                .ok()
        };
        Self {
            threshold,
            keywords,
            matcher,
        }
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn exempt_keywords(&self) -> &[String] {
        &self.keywords
    }

    /// True if `url` contains an exemption keyword.
    pub fn is_exempt(&self, url: &str) -> bool {
        self.matcher
            .as_ref()
            .map(|m| m.is_match(url))
            .unwrap_or(false)
    }

    /// Applies the heuristic to a raw value parsed from script or API data.
    /// Values with a fractional part are never divided.
    pub fn apply(&self, value: Decimal, url: &str) -> Decimal {
        if value > self.threshold && value.fract().is_zero() && !self.is_exempt(url) {
            value / Decimal::ONE_HUNDRED
        } else {
            value
        }
    }
}

impl Default for CentsNormalization {
    fn default() -> Self {
        Self::new(Decimal::ONE_THOUSAND, ["luxury", "premium"])
    }
}

/// Configuration options for the price engine.
#[derive(Clone)]
pub struct Options {
    pub user_agent: String,
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
    pub tuning: AcquisitionTuning,
    pub normalization: CentsNormalization,
    pub http_client: Option<reqwest::Client>,
    pub registry: Option<SiteOverrideRegistry>,
    pub launcher: Option<Arc<dyn BrowserLauncher>>,
    pub gate: Option<Arc<RequestGate>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: HashMap::new(),
            allow_private_networks: false,
            tuning: AcquisitionTuning::default(),
            normalization: CentsNormalization::default(),
            http_client: None,
            registry: None,
            launcher: None,
            gate: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("user_agent", &self.user_agent)
            .field("headers", &self.headers)
            .field("allow_private_networks", &self.allow_private_networks)
            .field("tuning", &self.tuning)
            .field("normalization", &self.normalization)
            .field("registry", &self.registry)
            .field("rendered", &self.launcher.is_some())
            .finish()
    }
}

/// Builder for constructing PriceEngine instances with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    opts: Options,
}

impl EngineBuilder {
    /// Create a new EngineBuilder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Add a custom header to all lightweight requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Replace all acquisition tuning constants.
    pub fn tuning(mut self, tuning: AcquisitionTuning) -> Self {
        self.opts.tuning = tuning;
        self
    }

    /// Set the minimum delay between lightweight requests.
    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.opts.tuning.request_delay = delay;
        self
    }

    /// Set the lightweight request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.opts.tuning.request_timeout = timeout;
        self
    }

    /// Override the cents-normalization heuristic.
    pub fn normalization(mut self, normalization: CentsNormalization) -> Self {
        self.opts.normalization = normalization;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Set the site override registry (defaults to the builtin table).
    pub fn registry(mut self, registry: SiteOverrideRegistry) -> Self {
        self.opts.registry = Some(registry);
        self
    }

    /// Enable the rendered strategy with the given browser launcher.
    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.opts.launcher = Some(launcher);
        self
    }

    /// Share a request gate between engines.
    pub fn gate(mut self, gate: Arc<RequestGate>) -> Self {
        self.opts.gate = Some(gate);
        self
    }

    /// Build the PriceEngine with the configured options.
    pub fn build(self) -> PriceEngine {
        PriceEngine::new(self.opts)
    }
}
