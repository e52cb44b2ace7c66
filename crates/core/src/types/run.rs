//! Run bookkeeping shared between the pipeline driver and its observers.

use serde::{Deserialize, Serialize};

/// Lifecycle of a single pipeline run.
///
/// `Done` is the only success terminal and `Aborted` the only failure terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not started yet.
    #[default]
    Idle,
    /// Waiting on the fetcher.
    Fetching,
    /// Turning raw records into canonical ones.
    Normalizing,
    /// Feeding canonical records to the reducer.
    Folding,
    /// Producing the final report.
    Finalizing,
    /// Handing the report to the sink.
    Sinking,
    /// Finished successfully.
    Done,
    /// Stopped by a fatal failure or cancellation.
    Aborted,
}

impl PipelineState {
    /// Whether the run can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl core::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Folding => "folding",
            Self::Finalizing => "finalizing",
            Self::Sinking => "sinking",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Kind of failure that terminated a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retryable failure that exhausted its attempts.
    Transient,
    /// Auth, schema or quota failure.
    Fatal,
    /// Sink could not write the report.
    Io,
    /// Stopped on request.
    Cancelled,
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-run record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunCounts {
    /// Records folded into the aggregate.
    pub processed: usize,
    /// Malformed records dropped by the normalizer.
    pub skipped: usize,
    /// Records whose per-record write failed.
    pub failed: usize,
    /// Pages fetched.
    pub pages: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Reached `Done`.
    Completed,
    /// Reached `Aborted`.
    Aborted {
        /// Failure category.
        kind: FailureKind,
        /// Human-readable cause.
        message: String,
    },
}

impl RunOutcome {
    /// Whether the run reached `Done`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Immutable progress view published by a running pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressSnapshot {
    /// Current state.
    pub state: PipelineState,
    /// Pages fetched so far.
    pub pages_fetched: usize,
    /// Records folded so far.
    pub processed: usize,
    /// Malformed records so far.
    pub skipped: usize,
    /// Fetch retries so far.
    pub retries: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Aborted.is_terminal());
        assert!(!PipelineState::Fetching.is_terminal());
        assert!(!PipelineState::Idle.is_terminal());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = RunOutcome::Aborted {
            kind: FailureKind::Fatal,
            message: "Unauthorized".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["kind"], "fatal");
        assert_eq!(json["message"], "Unauthorized");

        let json = serde_json::to_value(RunOutcome::Completed).unwrap();
        assert_eq!(json["status"], "completed");
    }
}
