// ABOUTME: ExtractionResult returned by every resolve call, plus Strategy and AcquisitionAttempt records.
// ABOUTME: Failures are represented as data here; nothing past resolve_price is an Err.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::extractors::ExtractorTag;

/// Content acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Lightweight,
    Rendered,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Lightweight => "lightweight fetch",
            Strategy::Rendered => "rendered fetch",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of running one strategy during a resolve call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionAttempt {
    pub strategy: Strategy,
    /// Whether content was acquired (not whether a price was found).
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl AcquisitionAttempt {
    pub fn failed(strategy: Strategy, message: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: false,
            error_message: Some(message.into()),
        }
    }

    /// Content arrived but yielded no price.
    pub fn no_price(strategy: Strategy, message: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: true,
            error_message: Some(message.into()),
        }
    }

    pub fn resolved(strategy: Strategy) -> Self {
        Self {
            strategy,
            succeeded: true,
            error_message: None,
        }
    }
}

impl fmt::Display for AcquisitionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_message {
            Some(ref msg) => write!(f, "{}: {}", self.strategy, msg),
            None => write!(f, "{}: ok", self.strategy),
        }
    }
}

/// The result of resolving a price for one product page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub sku: String,
    pub url: String,
    pub price: Option<Decimal>,
    pub note: String,
    pub error: Option<String>,
    pub diagnostic_sample: Option<String>,
    pub strategy: Option<Strategy>,
    pub source: Option<ExtractorTag>,
    pub attempts: Vec<AcquisitionAttempt>,
    pub checked_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// True when a price was found.
    pub fn is_resolved(&self) -> bool {
        self.price.is_some()
    }

    /// One-line tab-separated summary: sku, url, price (or `-`), note or error.
    pub fn summary_line(&self) -> String {
        let price = self
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let detail = self.error.as_deref().unwrap_or(&self.note);
        format!("{}\t{}\t{}\t{}", self.sku, self.url, price, detail)
    }
}
