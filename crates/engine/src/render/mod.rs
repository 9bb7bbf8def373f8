// ABOUTME: Rendered acquisition: the browser capability traits and the RenderedFetch content source.
// ABOUTME: Loads a page in a script-executing session, waits for network idle, dismisses overlays, probes visible prices.

//! Rendered fetch.
//!
//! A [`BrowserLauncher`] opens one [`BrowserSession`] per acquisition. The
//! session is always closed before `acquire` returns, whether the load
//! succeeded, failed, timed out or panicked. The Chromium-backed launcher
//! lives in [`chromium`] behind the `chromium` feature; tests and embedders
//! can supply their own implementation of the traits.

#[cfg(feature = "chromium")]
pub mod chromium;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::AcquisitionError;
use crate::options::AcquisitionTuning;
use crate::resource::{ensure_public_host, AcquiredContent, ContentSource};
use crate::result::Strategy;

const OP: &str = "RenderedFetch";

/// A visible text node that looked like a price, as reported by the probe script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleNode {
    pub text: String,
    #[serde(rename = "fontSize", default)]
    pub font_size: f64,
    #[serde(rename = "nearCart", default)]
    pub near_cart: bool,
}

/// One live page in a script-executing browser.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> anyhow::Result<()>;

    /// Returns once no request has been in flight for `settle`, or `deadline` passed.
    async fn wait_for_idle(&mut self, settle: Duration, deadline: Duration) -> anyhow::Result<()>;

    async fn evaluate(&mut self, script: &str) -> anyhow::Result<Value>;

    /// Serialized DOM of the current document.
    async fn content(&mut self) -> anyhow::Result<String>;

    /// JSON response bodies captured since navigation began.
    async fn take_responses(&mut self) -> Vec<Value>;

    /// Releases the page and any browser process behind it.
    async fn close(self: Box<Self>);
}

/// Opens browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>>;
}

/// Clicks the first visible button or link whose text is accept/close vocabulary.
/// Evaluates to the number of elements clicked.
pub const DISMISS_OVERLAYS: &str = r#"(() => {
  const words = /^(accept|accept all|accept cookies|agree|i agree|allow all|ok|okay|got it|continue|close|dismiss|no thanks|×|x)$/i;
  let clicked = 0;
  for (const el of document.querySelectorAll('button, [role="button"], a')) {
    const text = (el.innerText || el.getAttribute('aria-label') || '').trim();
    if (!text || text.length > 40 || !words.test(text)) continue;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden' || el.offsetParent === null) continue;
    try { el.click(); clicked += 1; } catch (e) {}
    if (clicked >= 3) break;
  }
  return clicked;
})()"#;

/// Collects visible leaf-ish elements whose text carries a currency amount.
/// Evaluates to `[{text, fontSize, nearCart}]`.
pub const VISIBLE_PRICE_PROBE: &str = r#"(() => {
  const money = /(?:[$£€¥]|\b(?:USD|EUR|GBP|CAD|AUD)\b)\s*\d/;
  const cartWords = /add to (cart|bag|basket)|buy now/i;
  const carts = Array.from(document.querySelectorAll('button, input[type="submit"], a'))
    .filter(el => cartWords.test(el.innerText || el.value || ''));
  const near = (el) => carts.some(cart => {
    const a = el.getBoundingClientRect(), b = cart.getBoundingClientRect();
    return Math.abs(a.top - b.top) < 250 && Math.abs(a.left - b.left) < 600;
  });
  const out = [];
  for (const el of document.body ? document.body.querySelectorAll('*') : []) {
    if (el.children.length > 2) continue;
    const text = (el.innerText || '').trim();
    if (!text || text.length > 80 || !money.test(text)) continue;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden' || parseFloat(style.opacity) === 0) continue;
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) continue;
    out.push({ text, fontSize: parseFloat(style.fontSize) || 0, nearCart: near(el) });
    if (out.length >= 200) break;
  }
  return out;
})()"#;

/// Content source that renders the page in a browser session.
#[derive(Clone)]
pub struct RenderedFetch {
    launcher: Arc<dyn BrowserLauncher>,
    settle: Duration,
    timeout: Duration,
    allow_private_networks: bool,
}

impl RenderedFetch {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, tuning: &AcquisitionTuning) -> Self {
        Self {
            launcher,
            settle: tuning.render_settle,
            timeout: tuning.render_timeout,
            allow_private_networks: false,
        }
    }

    /// Allow navigating to hosts on private networks (blocked by default).
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.allow_private_networks = allow;
        self
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<AcquiredContent, AcquisitionError> {
        session
            .navigate(url)
            .await
            .map_err(|e| AcquisitionError::render(url, OP, Some(e.context("navigation failed"))))?;

        if let Err(e) = session.wait_for_idle(self.settle, self.timeout).await {
            tracing::debug!(url, error = %e, "network never went idle; continuing");
        }

        match session.evaluate(DISMISS_OVERLAYS).await {
            Ok(clicked) if clicked.as_u64().unwrap_or(0) > 0 => {
                tracing::debug!(url, clicked = %clicked, "dismissed overlays");
                if let Err(e) = session.wait_for_idle(self.settle, self.settle * 4).await {
                    tracing::debug!(url, error = %e, "no idle after overlay dismissal");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(url, error = %e, "overlay dismissal script failed"),
        }

        let dom_nodes = match session.evaluate(VISIBLE_PRICE_PROBE).await {
            Ok(value) => serde_json::from_value::<Vec<VisibleNode>>(value).unwrap_or_default(),
            Err(e) => {
                tracing::debug!(url, error = %e, "visible price probe failed");
                Vec::new()
            }
        };

        let html = session
            .content()
            .await
            .map_err(|e| AcquisitionError::render(url, OP, Some(e.context("reading DOM failed"))))?;
        let api_payloads = session.take_responses().await;

        tracing::debug!(
            url,
            html_len = html.len(),
            nodes = dom_nodes.len(),
            payloads = api_payloads.len(),
            "rendered content acquired"
        );

        let mut content = AcquiredContent::from_html(Strategy::Rendered, url, html);
        content.dom_nodes = dom_nodes;
        content.api_payloads = api_payloads;
        Ok(content)
    }
}

#[async_trait]
impl ContentSource for RenderedFetch {
    fn strategy(&self) -> Strategy {
        Strategy::Rendered
    }

    async fn acquire(&self, url: &str) -> Result<AcquiredContent, AcquisitionError> {
        let parsed = Url::parse(url).map_err(|e| {
            AcquisitionError::invalid_url(url, OP, Some(anyhow::anyhow!("invalid URL: {}", e)))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AcquisitionError::invalid_url(
                url,
                OP,
                Some(anyhow::anyhow!("scheme must be http or https")),
            ));
        }
        if !self.allow_private_networks {
            ensure_public_host(&parsed, url, OP, "navigation to").await?;
        }

        let mut session = self
            .launcher
            .launch()
            .await
            .map_err(|e| AcquisitionError::render(url, OP, Some(e.context("browser launch failed"))))?;

        let outcome = tokio::time::timeout(
            self.timeout,
            AssertUnwindSafe(self.drive(session.as_mut(), url)).catch_unwind(),
        )
        .await;

        session.close().await;

        match outcome {
            Err(_) => Err(AcquisitionError::timeout(
                url,
                OP,
                Some(anyhow::anyhow!("page did not finish within {:?}", self.timeout)),
            )),
            Ok(Err(_)) => Err(AcquisitionError::render(
                url,
                OP,
                Some(anyhow::anyhow!("browser session panicked")),
            )),
            Ok(Ok(result)) => result,
        }
    }
}
