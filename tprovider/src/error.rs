//! Provider error kinds, status classification and status extraction.
//!
//! ```rust
//! use tprovider::{ProviderError, ProviderErrorKind};
//!
//! let throttled = ProviderError::from_status(429, "slow down");
//! assert_eq!(throttled.kind, ProviderErrorKind::RateLimited);
//! assert_eq!(throttled.status_code(), Some(429));
//!
//! let embedded = ProviderError::transport("upstream returned status 503");
//! assert_eq!(embedded.status_code(), Some(503));
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Authentication,
    RateLimited,
    InvalidRequest,
    Timeout,
    Transport,
    Unavailable,
    Unsupported,
    Cancelled,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            status: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message, false)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message, true).with_status(429)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message, false)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message, true)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message, true)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message, true)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unsupported, message, false)
    }

    pub fn cancelled() -> Self {
        Self::new(ProviderErrorKind::Cancelled, "request aborted", false)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message, false)
    }

    /// Builds an error from an HTTP status returned by a provider endpoint.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let error = match status {
            401 | 403 => Self::authentication(message),
            429 => Self::rate_limited(message),
            408 | 504 => Self::timeout(message),
            400 | 404 | 413 | 422 => Self::invalid_request(message),
            500..=599 => Self::unavailable(message),
            _ => Self::new(ProviderErrorKind::Transport, message, false),
        };

        error.with_status(status)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ProviderErrorKind::Cancelled
    }

    /// HTTP status associated with this error.
    ///
    /// Checks the direct status first, then a nested status in a JSON body carried by the
    /// message, then a status code written into the message text.
    pub fn status_code(&self) -> Option<u16> {
        self.status.or_else(|| extract_status(&self.message))
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({status}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for ProviderError {}

static STATUS_IN_TEXT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bstatus(?:[ _]?code)?|\bhttp(?:/[\d.]+)?|\berror)\D{0,3}([1-5]\d{2})\b").ok()
});

static LEADING_STATUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*([45]\d{2})\b").ok());

/// Pulls an HTTP status out of an error message.
pub fn extract_status(message: &str) -> Option<u16> {
    if let Some(status) = status_from_json(message) {
        return Some(status);
    }

    [&STATUS_IN_TEXT, &LEADING_STATUS]
        .into_iter()
        .filter_map(|pattern| pattern.as_ref())
        .find_map(|pattern| {
            pattern
                .captures(message)
                .and_then(|captures| captures.get(1))
                .and_then(|value| value.as_str().parse::<u16>().ok())
        })
}

fn status_from_json(message: &str) -> Option<u16> {
    let start = message.find('{')?;
    let end = message.rfind('}')?;
    if end <= start {
        return None;
    }

    let body = serde_json::from_str::<Value>(&message[start..=end]).ok()?;
    let candidates = [
        body.get("status"),
        body.get("statusCode"),
        body.get("response").and_then(|response| response.get("status")),
        body.get("error").and_then(|error| error.get("status")),
        body.get("error").and_then(|error| error.get("code")),
    ];

    candidates.into_iter().flatten().find_map(as_status)
}

fn as_status(value: &Value) -> Option<u16> {
    let number = match value {
        Value::Number(number) => number.as_u64()?,
        Value::String(text) => text.trim().parse::<u64>().ok()?,
        _ => return None,
    };

    (100..=599).contains(&number).then_some(number as u16)
}
