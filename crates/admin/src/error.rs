//! Unified error handling for batch jobs.

use thiserror::Error;

use catalog_ops_core::FailureKind;

use crate::claude::ClaudeError;
use crate::config::ConfigError;
use crate::pipeline::SinkError;
use crate::pipeline::fetcher::InputError;
use crate::shopify::AdminShopifyError;

/// Job-level error type.
///
/// Per-record failures never surface here; they are counted in the job's
/// report. These are the failures that stop a job outright.
#[derive(Debug, Error)]
pub enum JobError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Shopify API operation failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    /// Claude API operation failed.
    #[error("Claude error: {0}")]
    Claude(#[from] ClaudeError),

    /// Input file could not be loaded.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Report could not be written.
    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    /// Local file system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline run ended in `Aborted`.
    #[error("Pipeline aborted ({kind}): {message}")]
    Pipeline {
        /// Failure category.
        kind: FailureKind,
        /// Cause.
        message: String,
    },

    /// Bad argument from the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl JobError {
    /// Whether this failure is worth reporting to error tracking.
    ///
    /// Caller mistakes and cancellation are not.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) => false,
            Self::Pipeline { kind, .. } => !matches!(kind, FailureKind::Cancelled),
            Self::Shopify(_) | Self::Claude(_) | Self::Input(_) | Self::Sink(_) | Self::Io(_) => {
                true
            }
        }
    }

    /// Send to Sentry (when configured) and log.
    pub fn capture(&self) {
        if self.is_reportable() {
            let event_id = sentry::capture_error(self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Job failed");
        } else {
            tracing::error!(error = %self, "Job failed");
        }
    }
}

/// Result type alias for jobs.
pub type Result<T> = std::result::Result<T, JobError>;
