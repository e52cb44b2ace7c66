//! Background pipeline worker.
//!
//! The worker task owns the fetcher, reducer state and sink for the whole
//! run. Observers only read immutable [`ProgressSnapshot`]s and may request
//! cancellation.

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use catalog_ops_core::ProgressSnapshot;

use super::{CancelFlag, Normalizer, PageFetcher, PipelineDriver, Reducer, RunReport, Sink};

/// Handle to a running pipeline.
#[derive(Debug)]
pub struct PipelineHandle<R> {
    /// Latest progress snapshot.
    pub progress: watch::Receiver<ProgressSnapshot>,
    /// Cancellation request shared with the worker.
    pub cancel: CancelFlag,
    /// Resolves to the run's report.
    pub join: JoinHandle<RunReport<R>>,
}

impl<R> PipelineHandle<R> {
    /// Copy of the latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.progress.borrow()
    }

    /// Ask the worker to stop at the next page boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker task panicked or was aborted.
    pub async fn wait(self) -> Result<RunReport<R>, JoinError> {
        self.join.await
    }
}

/// Run a pipeline on a tokio task.
pub fn spawn_pipeline<F, N, Rd, S>(
    driver: PipelineDriver,
    mut fetcher: F,
    normalizer: N,
    reducer: Rd,
    sink: S,
) -> PipelineHandle<Rd::Report>
where
    F: PageFetcher + 'static,
    N: Normalizer + 'static,
    Rd: Reducer + 'static,
    Rd::State: 'static,
    Rd::Report: 'static,
    S: Sink<Rd::Report> + 'static,
{
    let (tx, rx) = watch::channel(ProgressSnapshot::default());
    let driver = driver.with_progress(tx);
    let cancel = driver.cancel_flag();

    let join = tokio::spawn(async move {
        driver
            .run(&mut fetcher, &normalizer, &reducer, &sink)
            .await
    });

    PipelineHandle {
        progress: rx,
        cancel,
        join,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use catalog_ops_core::{Cursor, FailureKind, Page, PipelineState, RawRecord};

    use super::*;
    use crate::pipeline::fetcher::StaticFetcher;
    use crate::pipeline::normalize::SheetRowNormalizer;
    use crate::pipeline::reducers::InventoryRiskReducer;
    use crate::pipeline::sink::DiscardSink;
    use crate::pipeline::{FetchError, RetryPolicy};

    #[tokio::test]
    async fn test_spawned_run_reports_done() {
        let fetcher = StaticFetcher::from_json_str(r#"[{"Title": "Jade"}, {"Title": "Opal"}]"#).unwrap();
        let handle = spawn_pipeline(
            PipelineDriver::new(RetryPolicy::immediate(1)),
            fetcher,
            SheetRowNormalizer::default(),
            InventoryRiskReducer::default(),
            DiscardSink,
        );
        let progress = handle.progress.clone();

        let report = handle.wait().await.unwrap();
        assert!(report.is_completed());
        assert_eq!(report.counts.processed, 2);
        assert_eq!(progress.borrow().state, PipelineState::Done);
    }

    /// Never-ending source that waits between pages.
    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&mut self, _cursor: Option<&Cursor>) -> Result<Page, FetchError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Page {
                records: vec![RawRecord::new(serde_json::json!({ "Title": "x", "_row": 1 }))],
                next_cursor: Some(Cursor::new("more")),
            })
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_worker() {
        let handle = spawn_pipeline(
            PipelineDriver::new(RetryPolicy::immediate(1)),
            SlowFetcher,
            SheetRowNormalizer::default(),
            InventoryRiskReducer::default(),
            DiscardSink,
        );

        let mut progress = handle.progress.clone();
        progress
            .wait_for(|snapshot| snapshot.pages_fetched >= 2)
            .await
            .unwrap();
        handle.cancel();

        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.failure_kind(), Some(FailureKind::Cancelled));
        assert!(report.report.is_some());
        assert_eq!(report.counts.processed, report.counts.pages);
    }
}
