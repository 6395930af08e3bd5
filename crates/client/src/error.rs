use std::time::Duration;

use cartographer::ValidationError;
use thiserror::Error;

/// Why a backend operation did not produce a result.
///
/// `Display` is the text shown after the operation's failure prefix, e.g.
/// `Analysis failed: HTTP error! status: 500`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. `detail` is the backend's `detail` field when present,
    /// otherwise `HTTP error! status: N`.
    #[error("{detail}")]
    Http { status: u16, detail: String },

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid API base URL {url:?}: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ApiError {
    pub fn http(status: u16, detail: Option<String>) -> Self {
        ApiError::Http {
            status,
            detail: detail.unwrap_or_else(|| format!("HTTP error! status: {status}")),
        }
    }

    /// Message body used in user notices.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ApiError::Timeout { .. } => true,
            ApiError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}
