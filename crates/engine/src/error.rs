// ABOUTME: Error types for the price engine: AcquisitionError with ErrorCode, and ConfigError.
// ABOUTME: Acquisition errors are recovered by the cascade; config errors surface at construction only.

use std::fmt;

/// Error codes representing the categories of content acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Fetch,
    Status,
    RateLimited,
    Timeout,
    Ssrf,
    Render,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Status => "HTTP error status",
            ErrorCode::RateLimited => "rate limited",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Ssrf => "SSRF blocked",
            ErrorCode::Render => "render error",
        };
        write!(f, "{}", s)
    }
}

/// Failure to obtain content for a URL from one acquisition strategy.
#[derive(Debug, thiserror::Error)]
pub struct AcquisitionError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl AcquisitionError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Fetch error (network failure, unreadable body, oversize body).
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Fetch, url, op, source)
    }

    /// Create a Status error for an HTTP status >= 400 other than 429.
    pub fn status(url: impl Into<String>, op: impl Into<String>, status: u16) -> Self {
        Self::with_code(
            ErrorCode::Status,
            url,
            op,
            Some(anyhow::anyhow!("HTTP status {}", status)),
        )
    }

    /// Create a RateLimited error (HTTP 429, retries exhausted or not yet retried).
    pub fn rate_limited(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(
            ErrorCode::RateLimited,
            url,
            op,
            Some(anyhow::anyhow!("HTTP status 429")),
        )
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Create an SSRF error.
    pub fn ssrf(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Ssrf, url, op, source)
    }

    /// Create a Render error (browser launch, navigation, or evaluation failure).
    pub fn render(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Render, url, op, source)
    }

    /// Short human-readable reason without the URL, for diagnostic notes.
    pub fn reason(&self) -> String {
        match self.source {
            Some(ref src) => format!("{}: {}", self.code, src),
            None => self.code.to_string(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == ErrorCode::RateLimited
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    pub fn is_ssrf(&self) -> bool {
        self.code == ErrorCode::Ssrf
    }

    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    pub fn is_status(&self) -> bool {
        self.code == ErrorCode::Status
    }

    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    pub fn is_render(&self) -> bool {
        self.code == ErrorCode::Render
    }
}

/// Errors raised while building the site override registry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The override table could not be read.
    #[error("failed to read override table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The override table is not valid JSON for the expected shape.
    #[error("malformed override table: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An adjustment factor is below 1.
    #[error("invalid adjustment for {domain}: {field} must be >= 1 (got {value})")]
    InvalidFactor {
        domain: String,
        field: &'static str,
        value: rust_decimal::Decimal,
    },

    /// A handler definition could not be built (e.g. an unusable variable name).
    #[error("invalid handler for {domain}: {reason}")]
    InvalidHandler { domain: String, reason: String },

    /// An entry names no domain to match.
    #[error("override entry has an empty domain")]
    EmptyDomain,
}
