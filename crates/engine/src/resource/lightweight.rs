// ABOUTME: Lightweight acquisition: one gated HTTP GET with browser-like headers, no script execution.
// ABOUTME: Retries the same request after a fixed backoff when rate limited, up to the configured retry count.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AcquisitionError;
use crate::options::Options;
use crate::resource::gate::RequestGate;
use crate::resource::{fetch, is_private_ip, AcquiredContent, ContentSource, FetchOptions};
use crate::result::Strategy;

/// Plain HTTP content source shared by every resolve call of an engine.
#[derive(Debug, Clone)]
pub struct LightweightFetch {
    http_client: reqwest::Client,
    fetch_opts: FetchOptions,
    gate: Arc<RequestGate>,
    max_retries: u32,
    backoff: Duration,
}

/// HTTP client that refuses redirects into private networks unless allowed.
pub fn build_http_client(opts: &Options) -> reqwest::Client {
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= 10 {
            return attempt.error("too many redirects");
        }
        if allow_private {
            return attempt.follow();
        }
        let next = attempt.url().clone();
        let Some(host) = next.host_str() else {
            return attempt.follow();
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            if is_private_ip(&ip) {
                return attempt.error("redirect to private IP blocked");
            }
            return attempt.follow();
        }
        // the policy callback is synchronous, so resolve with the blocking resolver
        let port = next.port_or_known_default().unwrap_or(80);
        match (host, port).to_socket_addrs() {
            Ok(addrs) => {
                for sa in addrs {
                    if is_private_ip(&sa.ip()) {
                        return attempt.error("redirect to private IP blocked");
                    }
                }
                attempt.follow()
            }
            Err(_) => attempt.error("DNS lookup failed during redirect"),
        }
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .timeout(opts.tuning.request_timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .expect("failed to build HTTP client")
}

impl LightweightFetch {
    pub fn new(opts: &Options, gate: Arc<RequestGate>) -> Self {
        let http_client = opts
            .http_client
            .clone()
            .unwrap_or_else(|| build_http_client(opts));
        Self {
            http_client,
            fetch_opts: FetchOptions {
                headers: opts.headers.clone(),
                allow_private_networks: opts.allow_private_networks,
            },
            gate,
            max_retries: opts.tuning.max_retries,
            backoff: opts.tuning.rate_limit_backoff,
        }
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }
}

#[async_trait]
impl ContentSource for LightweightFetch {
    fn strategy(&self) -> Strategy {
        Strategy::Lightweight
    }

    async fn acquire(&self, url: &str) -> Result<AcquiredContent, AcquisitionError> {
        let mut attempt = 0;
        loop {
            self.gate.wait_turn().await;
            match fetch(&self.http_client, url, &self.fetch_opts).await {
                Ok(result) => {
                    tracing::debug!(
                        url,
                        status = result.status,
                        bytes = result.body.len(),
                        "lightweight fetch complete"
                    );
                    let mut content =
                        AcquiredContent::from_html(Strategy::Lightweight, url, result.text_utf8());
                    content.final_url = result.final_url;
                    return Ok(content);
                }
                Err(err) if err.is_rate_limited() && attempt < self.max_retries => {
                    attempt += 1;
                    self.gate.tracker().record_rate_limited(self.backoff);
                    tracing::warn!(
                        url,
                        attempt,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "rate limited; backing off"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => {
                    if err.is_rate_limited() {
                        self.gate.tracker().record_rate_limited(Duration::ZERO);
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AcquisitionTuning;
    use httpmock::prelude::*;

    fn opts(max_retries: u32) -> Options {
        Options {
            allow_private_networks: true,
            tuning: AcquisitionTuning {
                request_delay: Duration::from_millis(1),
                rate_limit_backoff: Duration::from_millis(10),
                max_retries,
                request_timeout: Duration::from_secs(5),
                ..AcquisitionTuning::default()
            },
            ..Options::default()
        }
    }

    fn source(max_retries: u32) -> LightweightFetch {
        LightweightFetch::new(
            &opts(max_retries),
            Arc::new(RequestGate::new(Duration::from_millis(1))),
        )
    }

    #[tokio::test]
    async fn acquires_markup() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/products/intake");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(r#"<meta property="og:price:amount" content="349.99">"#);
        });

        let fetch = source(2);
        let content = fetch.acquire(&server.url("/products/intake")).await.unwrap();
        mock.assert();
        assert_eq!(content.strategy, Strategy::Lightweight);
        assert!(content.html.contains("349.99"));
        assert!(content.dom_nodes.is_empty());
        assert_eq!(fetch.gate().tracker().summary().requests, 1);
    }

    #[tokio::test]
    async fn retries_rate_limited_request_then_gives_up() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(429);
        });

        let fetch = source(2);
        let err = fetch.acquire(&server.url("/busy")).await.unwrap_err();
        assert!(err.is_rate_limited());
        mock.assert_calls(3);
        let summary = fetch.gate().tracker().summary();
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.rate_limited, 3);
        assert_eq!(summary.total_backoff, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let fetch = source(2);
        let err = fetch.acquire(&server.url("/gone")).await.unwrap_err();
        assert!(err.is_status());
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn private_network_blocked_by_default() {
        let fetch = LightweightFetch::new(&Options::default(), Arc::new(RequestGate::new(Duration::ZERO)));
        let err = fetch.acquire("http://127.0.0.1:9/p").await.unwrap_err();
        assert!(err.is_ssrf());
    }
}
