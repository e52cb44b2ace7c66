//! Failures while generating copy with the Messages API.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::types::StopReason;

/// Why a generation request produced no usable text.
#[derive(Debug, Error)]
pub enum ClaudeError {
    /// The Messages API could not be reached or the body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The key cannot be sent as a header or was refused by the API.
    #[error("credentials rejected: {0}")]
    Credentials(String),

    /// Too many requests.
    #[error("rate limited, retry after {} seconds", retry_after.as_secs())]
    RateLimited {
        /// Wait named by `Retry-After`, 60 seconds when absent.
        retry_after: Duration,
    },

    /// The API answered with an error status.
    #[error("generation refused with HTTP {status} ({kind}): {message}")]
    Refused {
        /// HTTP status.
        status: u16,
        /// Error type reported by the API, `unknown` for non-JSON bodies.
        kind: String,
        /// Error message or raw body.
        message: String,
    },

    /// The success body was not a Messages response.
    #[error("unreadable reply: {0}")]
    UnreadableReply(String),

    /// The model stopped without producing any text.
    #[error("no text generated (stop reason {stop_reason:?})")]
    NoText {
        /// Why the model stopped, when the reply said.
        stop_reason: Option<StopReason>,
    },

    /// Text came back but did not hold what the prompt asked for.
    #[error("generated text unusable: {0}")]
    UnusableText(String),
}

impl ClaudeError {
    /// Whether asking again later could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::RateLimited { .. } | Self::NoText { .. } => true,
            Self::Refused { status, .. } => *status >= 500,
            Self::Credentials(_) | Self::UnreadableReply(_) | Self::UnusableText(_) => false,
        }
    }
}

/// Error body: `{"type": "error", "error": {"type": ..., "message": ...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) message: String,
}
