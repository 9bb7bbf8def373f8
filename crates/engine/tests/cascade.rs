// ABOUTME: End-to-end tests of the resolve cascade against a mock HTTP server and a scripted browser.
// ABOUTME: Covers rendered fallback, single acquisition per strategy, rate limiting, overrides, and exhaustion reports.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use pricewatch_engine::render::VISIBLE_PRICE_PROBE;
use pricewatch_engine::{
    AcquisitionTuning, BrowserLauncher, BrowserSession, ExtractorTag, PriceEngine, RequestGate,
    SiteAdjustment, SiteOverride, SiteOverrideRegistry, Strategy,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

const NO_PRICE_PAGE: &str = "<html><body><div id=\"app\">Loading product</div></body></html>";

#[derive(Clone, Default)]
struct Page {
    html: String,
    nodes: Value,
    responses: Vec<Value>,
    fail: bool,
}

#[derive(Default)]
struct Counters {
    launched: AtomicUsize,
    closed: AtomicUsize,
}

struct ScriptedSession {
    page: Page,
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, _url: &str) -> anyhow::Result<()> {
        if self.page.fail {
            anyhow::bail!("net::ERR_CONNECTION_RESET");
        }
        Ok(())
    }

    async fn wait_for_idle(&mut self, _settle: Duration, _deadline: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> anyhow::Result<Value> {
        if script == VISIBLE_PRICE_PROBE {
            Ok(self.page.nodes.clone())
        } else {
            Ok(json!(0))
        }
    }

    async fn content(&mut self) -> anyhow::Result<String> {
        Ok(self.page.html.clone())
    }

    async fn take_responses(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.page.responses)
    }

    async fn close(self: Box<Self>) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedBrowser {
    page: Page,
    counters: Arc<Counters>,
}

impl ScriptedBrowser {
    fn new(page: Page) -> Arc<Self> {
        Arc::new(Self {
            page,
            counters: Arc::new(Counters::default()),
        })
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            page: self.page.clone(),
            counters: self.counters.clone(),
        }))
    }
}

fn tuning() -> AcquisitionTuning {
    AcquisitionTuning {
        request_delay: Duration::from_millis(1),
        rate_limit_backoff: Duration::from_millis(5),
        max_retries: 1,
        request_timeout: Duration::from_secs(5),
        render_settle: Duration::from_millis(1),
        render_timeout: Duration::from_secs(5),
    }
}

fn engine_with(browser: Option<Arc<ScriptedBrowser>>) -> PriceEngine {
    let mut builder = PriceEngine::builder()
        .allow_private_networks(true)
        .tuning(tuning())
        .registry(SiteOverrideRegistry::new());
    if let Some(browser) = browser {
        builder = builder.launcher(browser);
    }
    builder.build()
}

fn serve<'a>(server: &'a MockServer, path: &str, status: u16, body: &str) -> httpmock::Mock<'a> {
    let body = body.to_string();
    let path = path.to_string();
    server.mock(move |when, then| {
        when.method(GET).path(path);
        then.status(status)
            .header("content-type", "text/html; charset=utf-8")
            .body(body);
    })
}

#[tokio::test]
async fn lightweight_price_skips_browser() {
    let server = MockServer::start();
    let mock = serve(
        &server,
        "/p/coilover",
        200,
        r#"<script type="application/ld+json">{"@type":"Product","offers":{"@type":"Offer","price":"1899.00"}}</script>"#,
    );
    let browser = ScriptedBrowser::new(Page::default());
    let engine = engine_with(Some(browser.clone()));

    let result = engine.resolve_price_for("CO-1", &server.url("/p/coilover")).await;

    mock.assert();
    assert_eq!(result.price, Some(d("1899.00")));
    assert_eq!(result.source, Some(ExtractorTag::LinkedDataOffer));
    assert_eq!(result.strategy, Some(Strategy::Lightweight));
    assert_eq!(result.note, "lightweight fetch: linked_data_offer (confidence 80)");
    assert_eq!(browser.counters.launched.load(Ordering::SeqCst), 0);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn rendered_dom_nodes_resolve_script_built_page() {
    let server = MockServer::start();
    let mock = serve(&server, "/p/intake", 200, NO_PRICE_PAGE);
    let browser = ScriptedBrowser::new(Page {
        html: NO_PRICE_PAGE.to_string(),
        nodes: json!([
            {"text": "$24.99", "fontSize": 12.0, "nearCart": false},
            {"text": "$1,299.00", "fontSize": 28.0, "nearCart": true}
        ]),
        ..Page::default()
    });
    let engine = engine_with(Some(browser.clone()));

    let result = engine.resolve_price(&server.url("/p/intake")).await;

    mock.assert_calls(1);
    assert_eq!(result.price, Some(d("1299.00")));
    assert_eq!(result.source, Some(ExtractorTag::RenderedDom));
    assert_eq!(result.note, "rendered fetch: rendered_dom (confidence 77)");
    assert_eq!(result.attempts.len(), 2);
    assert!(result.attempts[0].succeeded);
    assert_eq!(result.attempts[0].error_message.as_deref(), Some("no price found"));
    assert_eq!(browser.counters.launched.load(Ordering::SeqCst), 1);
    assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn intercepted_api_payload_is_normalized_from_cents() {
    let server = MockServer::start();
    serve(&server, "/p/exhaust", 200, NO_PRICE_PAGE);
    let browser = ScriptedBrowser::new(Page {
        html: NO_PRICE_PAGE.to_string(),
        nodes: json!([]),
        responses: vec![json!({"data": {"product": {"sku": "EX-9", "price": 135000}}})],
        ..Page::default()
    });
    let engine = engine_with(Some(browser));

    let result = engine.resolve_price(&server.url("/p/exhaust")).await;

    assert_eq!(result.price.map(|p| p.to_string()), Some("1350.00".to_string()));
    assert_eq!(result.source, Some(ExtractorTag::InterceptedApi));
    assert!(result.note.ends_with("(confidence 78)"));
}

#[tokio::test]
async fn rate_limited_lightweight_falls_back_to_rendered() {
    let server = MockServer::start();
    let mock = serve(&server, "/p/busy", 429, "");
    let browser = ScriptedBrowser::new(Page {
        html: r#"<meta property="og:price:amount" content="412.50">"#.to_string(),
        nodes: json!([]),
        ..Page::default()
    });
    let engine = engine_with(Some(browser));

    let result = engine.resolve_price(&server.url("/p/busy")).await;

    mock.assert_calls(2);
    assert_eq!(result.price, Some(d("412.50")));
    assert_eq!(result.strategy, Some(Strategy::Rendered));
    assert!(!result.attempts[0].succeeded);
    assert!(result.attempts[0]
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("rate limited"));
    let summary = engine.gate().tracker().summary();
    assert_eq!(summary.requests, 2);
    assert_eq!(summary.rate_limited, 2);
}

#[tokio::test]
async fn exhaustion_lists_every_failed_strategy() {
    let server = MockServer::start();
    serve(&server, "/p/gone", 404, "");
    let browser = ScriptedBrowser::new(Page {
        fail: true,
        ..Page::default()
    });
    let engine = engine_with(Some(browser.clone()));

    let result = engine.resolve_price_for("GONE-1", &server.url("/p/gone")).await;

    assert_eq!(result.price, None);
    assert_eq!(result.sku, "GONE-1");
    let error = result.error.unwrap();
    assert!(error.starts_with("no price found: lightweight fetch: HTTP error status"));
    assert!(error.contains("; rendered fetch: render error"));
    assert!(result.diagnostic_sample.is_none());
    assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhaustion_without_browser_keeps_sample() {
    let server = MockServer::start();
    let page = format!("<html><body>{}<p>Price on request</p></body></html>", "x".repeat(300));
    serve(&server, "/p/quote", 200, &page);
    let engine = engine_with(None);

    let result = engine.resolve_price(&server.url("/p/quote")).await;

    assert_eq!(result.price, None);
    assert_eq!(
        result.error.as_deref(),
        Some("no price found: lightweight fetch: no price found; rendered fetch: rendered fetch unavailable")
    );
    let sample = result.diagnostic_sample.unwrap();
    assert!(sample.contains("Price on request"));
    assert!(!sample.starts_with("<html>"));
}

#[tokio::test]
async fn override_runs_on_rendered_content_and_adjusts() {
    let server = MockServer::start();
    let url = server.url("/p/shock");
    let host = url::Url::parse(&url).unwrap().host_str().unwrap().to_string();
    serve(&server, "/p/shock", 200, NO_PRICE_PAGE);

    let mut registry = SiteOverrideRegistry::new();
    registry
        .register(
            SiteOverride::new(&host)
                .with_handler(
                    pricewatch_engine::overrides::ScriptVariableHandler::new("productPrice").unwrap(),
                )
                .with_adjustment(SiteAdjustment::new(&host, d("1.0"), d("1.25")).unwrap()),
        )
        .unwrap();
    let browser = ScriptedBrowser::new(Page {
        html: "<script>window.productPrice = 180.00;</script>".to_string(),
        nodes: json!([]),
        ..Page::default()
    });
    let engine = PriceEngine::builder()
        .allow_private_networks(true)
        .tuning(tuning())
        .registry(registry)
        .launcher(browser)
        .build();

    let result = engine.resolve_price(&url).await;

    assert_eq!(result.price.map(|p| p.to_string()), Some("225.00".to_string()));
    assert_eq!(result.source, Some(ExtractorTag::SiteOverride));
    assert_eq!(
        result.note,
        format!("rendered fetch: site_override {host} (script_variable), adjusted x1.0 x1.25")
    );
}

#[tokio::test]
async fn concurrent_calls_share_the_gate() {
    let server = MockServer::start();
    serve(
        &server,
        "/p/a",
        200,
        r#"<meta property="og:price:amount" content="10.00">"#,
    );
    serve(
        &server,
        "/p/b",
        200,
        r#"<meta property="og:price:amount" content="20.00">"#,
    );
    let gate = Arc::new(RequestGate::new(Duration::from_millis(20)));
    let engine = Arc::new(
        PriceEngine::builder()
            .allow_private_networks(true)
            .tuning(tuning())
            .registry(SiteOverrideRegistry::new())
            .gate(gate.clone())
            .build(),
    );

    let url_a = server.url("/p/a");
    let url_b = server.url("/p/b");
    let (a, b) = tokio::join!(
        engine.resolve_price(&url_a),
        engine.resolve_price(&url_b)
    );

    assert_eq!(a.price, Some(d("10.00")));
    assert_eq!(b.price, Some(d("20.00")));
    assert_eq!(gate.tracker().summary().requests, 2);
}

#[test]
fn builtin_shopify_override_reads_variant_price() {
    let engine = PriceEngine::builder().build();
    let html = r#"<script>var meta = {"product":{"variants":[
        {"id":41001,"price":45900,"name":"Street"},
        {"id":41002,"price":52900,"name":"Track"}
    ]}};</script>
    <meta property="og:price:amount" content="459.00">"#;

    let result = engine.resolve_html(
        "SH-2",
        "https://apr-store.myshopify.com/products/coilover?variant=41002",
        html,
    );

    assert_eq!(result.price, Some(d("529.00")));
    assert_eq!(
        result.note,
        "provided html: site_override myshopify.com (shopify_variant)"
    );

    let result = engine.resolve_html("SH-2", "https://apr-store.myshopify.com/products/coilover", html);
    assert_eq!(result.price, Some(d("459.00")));
    assert_eq!(result.source, Some(ExtractorTag::StructuredMetadata));
}

#[test]
fn embedded_cents_price_normalized_unless_exempt() {
    let engine = PriceEngine::builder().registry(SiteOverrideRegistry::new()).build();
    let html = r#"<script>var meta = {"product":{"id":8812,"vendor":"Parts Co","price": "135000"}};</script>"#;

    let plain = engine.resolve_html("", "https://parts.test/products/b6", html);
    assert_eq!(plain.price.map(|p| p.to_string()), Some("1350.00".to_string()));
    assert_eq!(plain.source, Some(ExtractorTag::EmbeddedProductData));

    let exempt = engine.resolve_html("", "https://luxury.parts.test/products/b6", html);
    assert_eq!(exempt.price.map(|p| p.to_string()), Some("135000.00".to_string()));
}

#[tokio::test]
async fn private_host_is_refused_by_both_strategies() {
    let browser = ScriptedBrowser::new(Page {
        html: r#"<meta property="og:price:amount" content="99.00">"#.to_string(),
        nodes: json!([]),
        ..Page::default()
    });
    let engine = PriceEngine::builder()
        .tuning(tuning())
        .registry(SiteOverrideRegistry::new())
        .launcher(browser.clone())
        .build();

    let result = engine.resolve_price("http://127.0.0.1:9/admin").await;

    assert_eq!(result.price, None);
    assert_eq!(browser.counters.launched.load(Ordering::SeqCst), 0);
    assert_eq!(result.attempts.len(), 2);
    for attempt in &result.attempts {
        assert!(!attempt.succeeded);
        assert!(attempt.error_message.as_deref().unwrap().starts_with("SSRF blocked"));
    }
}
