// ABOUTME: Sequential request gate that spaces outbound lightweight requests by a minimum delay.
// ABOUTME: Owned explicitly by the lightweight fetch (shareable via Arc) and tracks request outcomes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Spaces outbound requests so that two of them never start closer than
/// `min_interval` apart.
///
/// The lock is held while waiting, so concurrent callers queue up and are
/// released one at a time in lock order.
#[derive(Debug)]
pub struct RequestGate {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
    tracker: GateTracker,
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
            tracker: GateTracker::default(),
        }
    }

    /// Wait until the next request may be issued, then record it as issued now.
    pub async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if Instant::now() < ready_at {
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
        self.tracker.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn tracker(&self) -> &GateTracker {
        &self.tracker
    }
}

impl Default for RequestGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

/// Counters for requests passed through the gate.
#[derive(Debug, Default)]
pub struct GateTracker {
    requests: AtomicU64,
    rate_limited: AtomicU64,
    backoff_ms: AtomicU64,
}

impl GateTracker {
    pub fn record_rate_limited(&self, backoff: Duration) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        self.backoff_ms
            .fetch_add(backoff.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> GateSummary {
        GateSummary {
            requests: self.requests.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            total_backoff: Duration::from_millis(self.backoff_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Snapshot of gate counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSummary {
    pub requests: u64,
    pub rate_limited: u64,
    pub total_backoff: Duration,
}
