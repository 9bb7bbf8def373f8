// ABOUTME: Chromium-backed BrowserLauncher using chromiumoxide over the DevTools protocol.
// ABOUTME: Tracks in-flight requests for idle detection and captures JSON response bodies during the load.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::options::DEFAULT_USER_AGENT;
use crate::render::{BrowserLauncher, BrowserSession};

/// Captured API bodies larger than this are ignored.
const MAX_CAPTURED_BODY: usize = 2 * 1024 * 1024;
const MAX_CAPTURED_RESPONSES: usize = 50;
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Launches a fresh headless Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    user_agent: String,
    executable: Option<std::path::PathBuf>,
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            executable: None,
        }
    }
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use a specific Chrome/Chromium binary instead of auto-detection.
    pub fn executable(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }
}

#[derive(Debug)]
struct NetworkState {
    in_flight: AtomicI64,
    last_activity: Mutex<Instant>,
    json_requests: Mutex<HashSet<RequestId>>,
    responses: Mutex<Vec<Value>>,
}

impl NetworkState {
    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    fn quiet_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

fn is_json_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.contains("application/json") || mime.contains("+json") || mime.contains("graphql")
}

/// Background tasks of a session under construction; aborted on drop unless
/// handed over with `into_parts`.
struct SessionTasks {
    handler: Option<JoinHandle<()>>,
    listeners: Vec<JoinHandle<()>>,
}

impl SessionTasks {
    fn new(handler: JoinHandle<()>) -> Self {
        Self {
            handler: Some(handler),
            listeners: Vec::new(),
        }
    }

    fn into_parts(mut self) -> (JoinHandle<()>, Vec<JoinHandle<()>>) {
        let listeners = std::mem::take(&mut self.listeners);
        match self.handler.take() {
            Some(handler) => (handler, listeners),
            None => unreachable!("handler is only taken here"),
        }
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
        if let Some(ref handler) = self.handler {
            handler.abort();
        }
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    network: Arc<NetworkState>,
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder().args(vec![
            "--disable-blink-features=AutomationControlled",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--no-sandbox",
            "--no-first-run",
            "--window-size=1366,900",
        ]);
        if let Some(ref path) = self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("browser config error: {e}"))?;

        let (mut browser, mut handler) = Browser::launch(config).await?;
        let mut tasks = SessionTasks::new(tokio::spawn(async move {
            while handler.next().await.is_some() {}
        }));

        let network = Arc::new(NetworkState {
            in_flight: AtomicI64::new(0),
            last_activity: Mutex::new(Instant::now()),
            json_requests: Mutex::new(HashSet::new()),
            responses: Mutex::new(Vec::new()),
        });

        match open_page(&browser, &self.user_agent, &network, &mut tasks.listeners).await {
            Ok(page) => {
                tracing::debug!("chromium session ready");
                let (handler, listeners) = tasks.into_parts();
                Ok(Box::new(ChromiumSession {
                    browser,
                    page,
                    handler,
                    listeners,
                    network,
                }))
            }
            Err(e) => {
                drop(tasks);
                if let Err(close_err) = browser.close().await {
                    tracing::debug!(error = %close_err, "closing browser after failed setup");
                }
                let _ = browser.wait().await;
                Err(e)
            }
        }
    }
}

/// Opens the working page and wires the network listeners. Listeners are
/// pushed as they are spawned so a failure part way through can abort them.
async fn open_page(
    browser: &Browser,
    user_agent: &str,
    network: &Arc<NetworkState>,
    listeners: &mut Vec<JoinHandle<()>>,
) -> anyhow::Result<Page> {
    let page = browser.new_page("about:blank").await?;
    page.set_user_agent(user_agent).await?;
    page.execute(EnableParams::default()).await?;

    let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
    let state = network.clone();
    listeners.push(tokio::spawn(async move {
        while sent.next().await.is_some() {
            state.in_flight.fetch_add(1, Ordering::SeqCst);
            state.touch();
        }
    }));

    let mut received = page.event_listener::<EventResponseReceived>().await?;
    let state = network.clone();
    listeners.push(tokio::spawn(async move {
        while let Some(event) = received.next().await {
            if is_json_mime(&event.response.mime_type) {
                if let Ok(mut ids) = state.json_requests.lock() {
                    ids.insert(event.request_id.clone());
                }
            }
            state.touch();
        }
    }));

    let mut failed = page.event_listener::<EventLoadingFailed>().await?;
    let state = network.clone();
    listeners.push(tokio::spawn(async move {
        while failed.next().await.is_some() {
            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            state.touch();
        }
    }));

    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let state = network.clone();
    let body_page = page.clone();
    listeners.push(tokio::spawn(async move {
        while let Some(event) = finished.next().await {
            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            state.touch();

            let wanted = state
                .json_requests
                .lock()
                .map(|mut ids| ids.remove(&event.request_id))
                .unwrap_or(false);
            if !wanted {
                continue;
            }
            let Ok(body) = body_page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await
            else {
                continue;
            };
            if body.result.base64_encoded || body.result.body.len() > MAX_CAPTURED_BODY {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&body.result.body) {
                if let Ok(mut responses) = state.responses.lock() {
                    if responses.len() < MAX_CAPTURED_RESPONSES {
                        responses.push(value);
                    }
                }
            }
        }
    }));

    Ok(page)
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        self.network.touch();
        self.page.goto(url).await?;
        Ok(())
    }

    async fn wait_for_idle(&mut self, settle: Duration, deadline: Duration) -> anyhow::Result<()> {
        let started = Instant::now();
        loop {
            let in_flight = self.network.in_flight.load(Ordering::SeqCst);
            if in_flight <= 0 && self.network.quiet_for() >= settle {
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(anyhow!("{in_flight} requests still in flight after {deadline:?}"));
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn evaluate(&mut self, script: &str) -> anyhow::Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<Value>()?)
    }

    async fn content(&mut self) -> anyhow::Result<String> {
        Ok(self.page.content().await?)
    }

    async fn take_responses(&mut self) -> Vec<Value> {
        self.network
            .responses
            .lock()
            .map(|mut responses| std::mem::take(&mut *responses))
            .unwrap_or_default()
    }

    async fn close(self: Box<Self>) {
        let ChromiumSession {
            mut browser,
            page,
            handler,
            listeners,
            ..
        } = *self;
        for listener in listeners {
            listener.abort();
        }
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "closing page failed");
        }
        if let Err(e) = browser.close().await {
            tracing::debug!(error = %e, "closing browser failed");
        }
        let _ = browser.wait().await;
        handler.abort();
    }
}
