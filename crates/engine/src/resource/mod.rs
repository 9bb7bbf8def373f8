// ABOUTME: Content acquisition: the ContentSource seam, acquired payloads, and the raw HTTP fetch.
// ABOUTME: Fetch sends browser-like headers with SSRF protection, content-length limits, and charset decoding.

pub mod gate;
pub mod lightweight;

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use bytes::Bytes;
use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use url::Url;

use crate::error::AcquisitionError;
use crate::render::VisibleNode;
use crate::result::Strategy;

pub use lightweight::LightweightFetch;

/// Product pages larger than this are refused (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

const OP: &str = "Fetch";

/// Content obtained for one URL by one strategy.
#[derive(Debug, Clone)]
pub struct AcquiredContent {
    pub strategy: Strategy,
    pub url: String,
    pub final_url: String,
    /// Page markup: the raw response body, or the serialized DOM after rendering.
    pub html: String,
    /// Visible price-bearing nodes reported by the rendered DOM probe.
    pub dom_nodes: Vec<VisibleNode>,
    /// JSON bodies of API responses intercepted during a rendered load.
    pub api_payloads: Vec<serde_json::Value>,
}

impl AcquiredContent {
    /// Wrap markup that was obtained without a browser.
    pub fn from_html(strategy: Strategy, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            strategy,
            final_url: url.clone(),
            url,
            html: html.into(),
            dom_nodes: Vec::new(),
            api_payloads: Vec::new(),
        }
    }
}

/// One way of obtaining a URL's content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn acquire(&self, url: &str) -> Result<AcquiredContent, AcquisitionError>;
}

/// Options for fetching a resource.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
}

/// Result of a successful fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decode the body as UTF-8 text, using charset hints from the content-type header.
    pub fn text_utf8(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

static PRIVATE_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        // RFC1918
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        // Loopback
        "127.0.0.0/8",
        // Link-local
        "169.254.0.0/16",
    ]
    .iter()
    .map(|net| net.parse().unwrap())
    .collect()
});

static PRIVATE_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    // Unique local, link-local
    ["fc00::/7", "fe80::/10"]
        .iter()
        .map(|net| net.parse().unwrap())
        .collect()
});

/// Check if an IP address is in a private/reserved range.
pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => PRIVATE_V4.iter().any(|net| net.contains(ip)),
        IpAddr::V6(ip) => ip.is_loopback() || PRIVATE_V6.iter().any(|net| net.contains(ip)),
    }
}

/// Decode with the declared charset, falling back to detection when it is missing or unknown.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let declared = content_type
        .and_then(extract_charset)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()));
    let encoding = declared.unwrap_or_else(|| {
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(body, true);
        detector.guess(None, true)
    });
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase())
    })
}

fn too_large(url: &str, len: usize) -> Result<(), AcquisitionError> {
    if len > MAX_CONTENT_LENGTH {
        return Err(AcquisitionError::fetch(
            url,
            OP,
            Some(anyhow::anyhow!("page exceeds {} bytes", MAX_CONTENT_LENGTH)),
        ));
    }
    Ok(())
}

/// Header set a desktop browser sends for a top-level navigation.
///
/// The referrer is the site's own origin, as if the product page was reached
/// from the storefront.
pub fn browser_headers(url: &Url) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        ),
        ("Accept-Language", "en-US,en;q=0.9".to_string()),
        ("Cache-Control", "no-cache".to_string()),
        ("Upgrade-Insecure-Requests", "1".to_string()),
        ("Sec-Fetch-Dest", "document".to_string()),
        ("Sec-Fetch-Mode", "navigate".to_string()),
        ("Sec-Fetch-Site", "same-origin".to_string()),
    ];
    let origin = url.origin();
    if origin.is_tuple() {
        headers.push(("Referer", format!("{}/", origin.ascii_serialization())));
    }
    headers
}

/// Reject hosts that are, or resolve to, private addresses.
pub(crate) async fn ensure_public_host(
    target: &Url,
    url: &str,
    op: &str,
    what: &str,
) -> Result<(), AcquisitionError> {
    let Some(host) = target.host_str() else {
        return Ok(());
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(AcquisitionError::ssrf(
                url,
                op,
                Some(anyhow::anyhow!("{} private IP addresses are not allowed", what)),
            ));
        }
        return Ok(());
    }

    let port = target.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        AcquisitionError::fetch(
            url,
            op,
            Some(anyhow::anyhow!("DNS lookup failed: {}", e)),
        )
    })?;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(AcquisitionError::ssrf(
                url,
                op,
                Some(anyhow::anyhow!("{} private IP addresses are not allowed", what)),
            ));
        }
    }
    Ok(())
}

/// Fetch a resource from the given URL with browser-like headers.
///
/// Statuses >= 400 are failures; 429 is reported as `RateLimited` so the
/// caller can back off and retry.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult, AcquisitionError> {
    if url.is_empty() {
        return Err(AcquisitionError::invalid_url(url, OP, None));
    }

    let parsed_url = Url::parse(url).map_err(|e| {
        AcquisitionError::invalid_url(url, OP, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    let scheme = parsed_url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(AcquisitionError::invalid_url(
            url,
            OP,
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }

    if !opts.allow_private_networks {
        ensure_public_host(&parsed_url, url, OP, "requests to").await?;
    }

    let mut request = client.get(url);
    for (key, value) in browser_headers(&parsed_url) {
        request = request.header(key, value);
    }
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AcquisitionError::timeout(url, OP, Some(anyhow::anyhow!("request timed out")))
        } else {
            AcquisitionError::fetch(url, OP, Some(anyhow::anyhow!("request failed: {}", e)))
        }
    })?;

    if !opts.allow_private_networks {
        let final_url = response.url().clone();
        ensure_public_host(&final_url, url, OP, "redirects to").await?;
    }

    let status = response.status().as_u16();
    if status == 429 {
        return Err(AcquisitionError::rate_limited(url, OP));
    }
    if status >= 400 {
        return Err(AcquisitionError::status(url, OP, status));
    }

    if let Some(len) = response.content_length() {
        too_large(url, len as usize)?;
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            AcquisitionError::timeout(url, OP, Some(anyhow::anyhow!("body read timed out")))
        } else {
            AcquisitionError::fetch(
                url,
                OP,
                Some(anyhow::anyhow!("failed to read body: {}", e)),
            )
        }
    })?;

    too_large(url, body.len())?;

    Ok(FetchResult {
        status,
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn create_test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent("test-agent")
            .build()
            .unwrap()
    }

    fn open_opts() -> FetchOptions {
        FetchOptions {
            allow_private_networks: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_ok_utf8() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/product");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<p>$19.99</p>");
        });

        let result = fetch(&create_test_client(), &server.url("/product"), &open_opts()).await;
        mock.assert();

        let result = result.expect("fetch should succeed");
        assert_eq!(result.status, 200);
        assert_eq!(result.text_utf8(), "<p>$19.99</p>");
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/product")
                .header_exists("accept-language")
                .header_exists("referer")
                .header("upgrade-insecure-requests", "1");
            then.status(200).body("ok");
        });

        let result = fetch(&create_test_client(), &server.url("/product"), &open_opts()).await;
        mock.assert();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_error_status_rejected() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("not found");
        });

        let result = fetch(&create_test_client(), &server.url("/gone"), &open_opts()).await;
        mock.assert();

        let err = result.expect_err("should fail on 404");
        assert!(err.is_status());
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_429_is_rate_limited() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(429);
        });

        let err = fetch(&create_test_client(), &server.url("/busy"), &open_opts())
            .await
            .expect_err("should fail on 429");
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_scheme() {
        let err = fetch(&create_test_client(), "ftp://files.test/p", &open_opts())
            .await
            .expect_err("ftp is not fetchable");
        assert!(err.is_invalid_url());
    }

    #[tokio::test]
    async fn test_private_ip_block() {
        let server = MockServer::start();
        let opts = FetchOptions::default();

        let url = format!("http://127.0.0.1:{}/test", server.port());
        let err = fetch(&create_test_client(), &url, &opts)
            .await
            .expect_err("should fail on private IP");
        assert!(err.is_ssrf());
    }

    #[test]
    fn test_browser_headers_referer_is_origin() {
        let url = Url::parse("https://shop.example.com/products/widget?variant=1").unwrap();
        let headers = browser_headers(&url);
        let referer = headers
            .iter()
            .find(|(k, _)| *k == "Referer")
            .map(|(_, v)| v.as_str());
        assert_eq!(referer, Some("https://shop.example.com/"));
    }

    #[test]
    fn test_decode_iso_8859_1_with_chardetng() {
        let iso_bytes: &[u8] = &[0x63, 0x61, 0x66, 0xe9];
        assert_eq!(decode_body(iso_bytes, None), "caf\u{e9}");
    }

    #[test]
    fn test_is_private_ip_v4() {
        assert!(is_private_ip(&"10.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"172.31.255.255".parse().unwrap()));
        assert!(is_private_ip(&"192.168.0.1".parse().unwrap()));
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"169.254.0.1".parse().unwrap()));

        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"172.32.0.1".parse().unwrap()));
    }

    #[test]
    fn test_is_private_ip_v6() {
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_extract_charset() {
        assert_eq!(
            extract_charset("text/html; charset=ISO-8859-1"),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(
            extract_charset("text/html; charset=\"utf-8\""),
            Some("utf-8".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
    }
}
