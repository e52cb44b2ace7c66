//! Cursor-paginated fetch-reduce pipeline.
//!
//! A run pulls pages from a [`PageFetcher`] in cursor order, turns each raw
//! record into a canonical one with a [`Normalizer`], folds canonical records
//! into a [`Reducer`]'s state and, once the cursor is exhausted, finalizes the
//! state into a report that a [`Sink`] writes out.
//!
//! ```text
//! Fetching -> Normalizing -> Folding -> (next page -> Fetching
//!                                        | Finalizing -> Sinking -> Done)
//! ```
//!
//! `Aborted` is reachable from any non-terminal state on a fatal failure, on
//! transient failures that exhaust their attempts, or on cancellation.

pub mod driver;
pub mod fetcher;
pub mod normalize;
pub mod reducers;
pub mod similarity;
pub mod sink;
pub mod worker;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use catalog_ops_core::{CanonicalRecord, Cursor, FailureKind, Page, RawRecord, RunCounts, RunOutcome};

use crate::shopify::AdminShopifyError;

pub use driver::{CancelFlag, PipelineDriver, RetryPolicy};
pub use worker::{PipelineHandle, spawn_pipeline};

/// Failure of a single page fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Retryable: network failure, 429, 5xx or GraphQL throttling.
    #[error("transient fetch failure: {message}")]
    Transient {
        /// What went wrong.
        message: String,
        /// Server-requested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// Not retryable: auth, schema, missing resource or exhausted quota.
    #[error("fatal fetch failure: {0}")]
    Fatal(String),
}

impl FetchError {
    /// A transient failure without a server-requested wait.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether the driver may retry this failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<AdminShopifyError> for FetchError {
    fn from(err: AdminShopifyError) -> Self {
        if err.is_transient() {
            Self::Transient {
                retry_after: err.retry_after(),
                message: err.to_string(),
            }
        } else {
            Self::Fatal(err.to_string())
        }
    }
}

/// A raw record that cannot be normalized. Skipped and counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    /// A required field is absent or blank.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong type or format.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure writing a report or a per-record change.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Retryable write failure (file system or network).
    #[error("I/O error: {0}")]
    Io(String),

    /// The destination rejected the value; retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<csv::Error> for SinkError {
    fn from(err: csv::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<AdminShopifyError> for SinkError {
    fn from(err: AdminShopifyError) -> Self {
        if err.is_transient() {
            Self::Io(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

/// Produces pages of raw records.
///
/// Implementations never retry and never cache; retrying is the driver's job.
#[async_trait]
pub trait PageFetcher: Send {
    /// Fetch the page after `cursor`, or the first page when `cursor` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transient`] for retryable failures and
    /// [`FetchError::Fatal`] otherwise.
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError>;
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for Box<F> {
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
        (**self).fetch(cursor).await
    }
}

/// Turns a source-shaped record into the canonical form.
pub trait Normalizer: Send + Sync {
    /// Normalize one record.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRecord`] if a required field is missing.
    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord, MalformedRecord>;
}

/// Fold-then-finalize aggregation strategy.
///
/// `fold` takes the state by value and returns the next one; it must not
/// depend on anything but its inputs.
pub trait Reducer: Send + Sync {
    /// Running accumulator.
    type State: Send;
    /// Finalized output.
    type Report: Send + Sync;

    /// Empty state.
    fn init(&self) -> Self::State;

    /// Fold one record into the state.
    fn fold(&self, state: Self::State, record: CanonicalRecord) -> Self::State;

    /// Turn the final state into a report. Called at most once per run.
    fn finalize(&self, state: Self::State) -> Self::Report;

    /// Whether an aborted run may still release a report built from the
    /// records folded so far.
    fn supports_partial_report(&self) -> bool {
        true
    }
}

/// Writes a finished report.
#[async_trait]
pub trait Sink<R>: Send + Sync {
    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the report cannot be written.
    async fn write(&self, report: &R) -> Result<(), SinkError>;

    /// Write the report together with the run that produced it.
    ///
    /// Sinks that only care about the aggregate keep the default, which
    /// forwards the bare report to [`Sink::write`].
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the report cannot be written.
    async fn write_run(&self, run: &RunSummary<'_, R>) -> Result<(), SinkError>
    where
        R: Sync,
    {
        self.write(run.report).await
    }
}

/// A finalized report with its run's outcome and counts.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a, R> {
    /// Run id.
    pub run_id: Uuid,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Processed / skipped / failed / pages.
    pub counts: RunCounts,
    /// The aggregate.
    pub report: &'a R,
}

/// Result of an idempotent per-record write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The destination changed.
    Written,
    /// The destination already held this value.
    Unchanged,
}

/// Applies one per-record change.
///
/// Writing the same item twice must leave the destination as the first write did.
#[async_trait]
pub trait RecordSink<T>: Send + Sync {
    /// Apply one change.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] for retryable failures.
    async fn write_one(&self, item: &T) -> Result<WriteOutcome, SinkError>;
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<R> {
    /// Unique id of this run, for correlating logs.
    pub run_id: Uuid,
    /// Completed, or aborted with a cause.
    pub outcome: RunOutcome,
    /// Processed / skipped / failed / pages.
    pub counts: RunCounts,
    /// The finalized report, when one was produced.
    pub report: Option<R>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: DateTime<Utc>,
}

impl<R> RunReport<R> {
    /// Whether the run completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.outcome.is_completed()
    }

    /// Failure kind of an aborted run.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            RunOutcome::Completed => None,
            RunOutcome::Aborted { kind, .. } => Some(*kind),
        }
    }
}

/// Result of applying one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ItemResult {
    /// The destination changed.
    Written,
    /// The destination already held this value.
    Unchanged,
    /// Failed after retries, or rejected outright.
    Failed(String),
}

/// Tally of a per-record apply pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    /// Items whose destination changed.
    pub written: usize,
    /// Items already in the target state.
    pub unchanged: usize,
    /// Items that failed after retries or were rejected.
    pub failed: usize,
}

/// Per-item results of an apply pass, in input order.
///
/// When the pass was cancelled, `results` is shorter than the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// One entry per attempted item.
    pub results: Vec<ItemResult>,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
}

impl ApplyReport {
    /// Count results by kind.
    #[must_use]
    pub fn summary(&self) -> ApplySummary {
        self.results
            .iter()
            .fold(ApplySummary::default(), |mut summary, result| {
                match result {
                    ItemResult::Written => summary.written += 1,
                    ItemResult::Unchanged => summary.unchanged += 1,
                    ItemResult::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }
}
