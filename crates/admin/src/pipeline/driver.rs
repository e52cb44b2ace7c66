//! Pipeline driver: retry policy, cancellation and the run loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{Notify, watch};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use catalog_ops_core::{
    Cursor, FailureKind, Page, PipelineState, ProgressSnapshot, RunCounts, RunOutcome,
};

use crate::config::PipelineConfig;

use super::{
    ApplyReport, FetchError, ItemResult, Normalizer, PageFetcher, RecordSink, Reducer, RunReport,
    RunSummary, Sink, SinkError, WriteOutcome,
};

/// Exponential backoff with jitter for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on the computed backoff.
    pub max: Duration,
    /// Add up to 10% random jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl RetryPolicy {
    /// Policy from pipeline configuration.
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base: config.backoff_base,
            max: config.backoff_max,
            jitter: true,
        }
    }

    /// Retry without waiting. Used in tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Backoff after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base.saturating_mul(1_u32 << exponent).min(self.max);

        if self.jitter && !delay.is_zero() {
            let jitter_ms = u64::try_from(delay.as_millis() / 10).unwrap_or(u64::MAX);
            let extra = rand::rng().random_range(0..=jitter_ms);
            delay.saturating_add(Duration::from_millis(extra))
        } else {
            delay
        }
    }

    /// Wait before the next attempt, honoring a server-requested `Retry-After`.
    #[must_use]
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        retry_after.map_or(backoff, |requested| backoff.max(requested))
    }
}

/// Shared cancellation request.
///
/// Cloning shares the flag. The driver checks it at page boundaries and
/// wakes from backoff sleeps when it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    /// A fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns `true` if cancelled.
    pub async fn sleep_or_cancelled(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        tokio::select! {
            () = tokio::time::sleep(duration) => self.is_cancelled(),
            () = &mut notified => true,
        }
    }
}

/// Why a run stopped early.
struct Abort {
    kind: FailureKind,
    message: String,
}

impl Abort {
    fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "Cancelled by request".to_string(),
        }
    }
}

/// Runs fetch, normalize, fold, finalize and sink for one pipeline.
#[derive(Debug)]
pub struct PipelineDriver {
    retry: RetryPolicy,
    page_delay: Duration,
    cancel: CancelFlag,
    progress: Option<watch::Sender<ProgressSnapshot>>,
}

impl PipelineDriver {
    /// Driver with the given retry policy and no delay between pages.
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            page_delay: Duration::ZERO,
            cancel: CancelFlag::new(),
            progress: None,
        }
    }

    /// Driver from pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(RetryPolicy::from_config(config)).with_page_delay(config.page_delay)
    }

    /// Wait this long between pages.
    #[must_use]
    pub const fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Observe an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Publish progress snapshots on this channel.
    #[must_use]
    pub fn with_progress(mut self, progress: watch::Sender<ProgressSnapshot>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The flag this driver observes.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        if let Some(tx) = &self.progress {
            tx.send_replace(snapshot);
        }
    }

    /// Drive one run to a terminal state.
    ///
    /// Never returns an error: failures are reported in the returned
    /// [`RunReport`]'s outcome.
    pub async fn run<F, N, R, S>(
        &self,
        fetcher: &mut F,
        normalizer: &N,
        reducer: &R,
        sink: &S,
    ) -> RunReport<R::Report>
    where
        F: PageFetcher + ?Sized,
        N: Normalizer + ?Sized,
        R: Reducer,
        S: Sink<R::Report> + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id);
        self.run_inner(run_id, fetcher, normalizer, reducer, sink)
            .instrument(span)
            .await
    }

    async fn run_inner<F, N, R, S>(
        &self,
        run_id: Uuid,
        fetcher: &mut F,
        normalizer: &N,
        reducer: &R,
        sink: &S,
    ) -> RunReport<R::Report>
    where
        F: PageFetcher + ?Sized,
        N: Normalizer + ?Sized,
        R: Reducer,
        S: Sink<R::Report> + ?Sized,
    {
        let started_at = Utc::now();
        let mut snapshot = ProgressSnapshot::default();
        let mut counts = RunCounts::default();
        let mut state = reducer.init();
        let mut cursor: Option<Cursor> = None;

        info!("Pipeline run started");

        loop {
            if self.cancel.is_cancelled() {
                return self.aborted(run_id, started_at, reducer, state, counts, snapshot, Abort::cancelled());
            }

            snapshot.state = PipelineState::Fetching;
            self.publish(snapshot);

            let page = match self.fetch_with_retry(fetcher, cursor.as_ref(), &mut snapshot).await {
                Ok(page) => page,
                Err(abort) => {
                    return self.aborted(run_id, started_at, reducer, state, counts, snapshot, abort);
                }
            };
            counts.pages += 1;
            snapshot.pages_fetched = counts.pages;

            snapshot.state = PipelineState::Normalizing;
            self.publish(snapshot);

            let Page {
                records,
                next_cursor,
            } = page;
            let mut canonical = Vec::with_capacity(records.len());
            for raw in &records {
                match normalizer.normalize(raw) {
                    Ok(record) => canonical.push(record),
                    Err(error) => {
                        counts.skipped += 1;
                        debug!(%error, "Skipping malformed record");
                    }
                }
            }
            drop(records);

            snapshot.state = PipelineState::Folding;
            snapshot.skipped = counts.skipped;
            self.publish(snapshot);

            for record in canonical {
                state = reducer.fold(state, record);
                counts.processed += 1;
            }
            snapshot.processed = counts.processed;
            self.publish(snapshot);

            debug!(
                page = counts.pages,
                processed = counts.processed,
                skipped = counts.skipped,
                "Page folded"
            );

            match next_cursor {
                None => break,
                Some(next) => cursor = Some(next),
            }

            if !self.page_delay.is_zero() && self.cancel.sleep_or_cancelled(self.page_delay).await {
                return self.aborted(run_id, started_at, reducer, state, counts, snapshot, Abort::cancelled());
            }
        }

        snapshot.state = PipelineState::Finalizing;
        self.publish(snapshot);
        let report = reducer.finalize(state);

        snapshot.state = PipelineState::Sinking;
        self.publish(snapshot);

        let summary = RunSummary {
            run_id,
            outcome: RunOutcome::Completed,
            counts,
            report: &report,
        };
        let outcome = match sink.write_run(&summary).await {
            Ok(()) => {
                snapshot.state = PipelineState::Done;
                info!(
                    processed = counts.processed,
                    skipped = counts.skipped,
                    pages = counts.pages,
                    "Pipeline run completed"
                );
                RunOutcome::Completed
            }
            Err(error) => {
                snapshot.state = PipelineState::Aborted;
                warn!(%error, "Report sink failed");
                RunOutcome::Aborted {
                    kind: FailureKind::Io,
                    message: error.to_string(),
                }
            }
        };
        self.publish(snapshot);

        RunReport {
            run_id,
            outcome,
            counts,
            report: Some(report),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn fetch_with_retry<F: PageFetcher + ?Sized>(
        &self,
        fetcher: &mut F,
        cursor: Option<&Cursor>,
        snapshot: &mut ProgressSnapshot,
    ) -> Result<Page, Abort> {
        let mut attempt = 1;
        loop {
            match fetcher.fetch(cursor).await {
                Ok(page) => return Ok(page),
                Err(FetchError::Fatal(message)) => {
                    return Err(Abort {
                        kind: FailureKind::Fatal,
                        message,
                    });
                }
                Err(FetchError::Transient {
                    message,
                    retry_after,
                }) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(Abort {
                            kind: FailureKind::Transient,
                            message: format!("{message} (gave up after {attempt} attempts)"),
                        });
                    }

                    let delay = self.retry.delay(attempt, retry_after);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %message,
                        "Transient fetch failure, retrying"
                    );
                    snapshot.retries += 1;
                    self.publish(*snapshot);

                    if self.cancel.sleep_or_cancelled(delay).await {
                        return Err(Abort::cancelled());
                    }
                    attempt += 1;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn aborted<R: Reducer>(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        reducer: &R,
        state: R::State,
        counts: RunCounts,
        mut snapshot: ProgressSnapshot,
        abort: Abort,
    ) -> RunReport<R::Report> {
        warn!(
            kind = %abort.kind,
            message = %abort.message,
            processed = counts.processed,
            "Pipeline run aborted"
        );
        snapshot.state = PipelineState::Aborted;
        self.publish(snapshot);

        let report = reducer
            .supports_partial_report()
            .then(|| reducer.finalize(state));

        RunReport {
            run_id,
            outcome: RunOutcome::Aborted {
                kind: abort.kind,
                message: abort.message,
            },
            counts,
            report,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Apply `sink` to each item in order.
    ///
    /// `SinkError::Io` is retried with this driver's backoff; a rejected
    /// write or exhausted retries mark the item failed and the pass moves on.
    /// Cancellation stops before the next item.
    pub async fn apply_each<T, S>(&self, items: &[T], sink: &S) -> ApplyReport
    where
        T: Sync,
        S: RecordSink<T> + ?Sized,
    {
        let mut report = ApplyReport::default();

        for (index, item) in items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(remaining = items.len() - index, "Apply pass cancelled");
                report.cancelled = true;
                break;
            }

            let result = self.apply_one(item, sink).await;
            if let ItemResult::Failed(error) = &result {
                warn!(index, %error, "Record write failed");
            }
            report.results.push(result);
        }

        let summary = report.summary();
        info!(
            written = summary.written,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "Apply pass finished"
        );
        report
    }

    async fn apply_one<T, S>(&self, item: &T, sink: &S) -> ItemResult
    where
        T: Sync,
        S: RecordSink<T> + ?Sized,
    {
        let mut attempt = 1;
        loop {
            match sink.write_one(item).await {
                Ok(WriteOutcome::Written) => return ItemResult::Written,
                Ok(WriteOutcome::Unchanged) => return ItemResult::Unchanged,
                Err(SinkError::Io(message)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt, None);
                    debug!(attempt, error = %message, "Retrying record write");
                    if self.cancel.sleep_or_cancelled(delay).await {
                        return ItemResult::Failed(format!("{message} (cancelled during retry)"));
                    }
                    attempt += 1;
                }
                Err(error) => return ItemResult::Failed(error.to_string()),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use catalog_ops_core::{CanonicalRecord, RawRecord};

    use super::*;
    use crate::pipeline::MalformedRecord;

    struct ScriptedFetcher {
        responses: VecDeque<Result<Page, FetchError>>,
        calls: usize,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Page, FetchError>>) -> Self {
            Self {
                responses: responses.into(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&mut self, _cursor: Option<&Cursor>) -> Result<Page, FetchError> {
            self.calls += 1;
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Fatal("script exhausted".to_string())))
        }
    }

    fn page(ids: &[i64], next: Option<&str>) -> Page {
        Page {
            records: ids
                .iter()
                .map(|id| RawRecord::new(serde_json::json!({ "id": id.to_string(), "qty": id })))
                .collect(),
            next_cursor: next.map(Cursor::new),
        }
    }

    struct IdNormalizer;

    impl Normalizer for IdNormalizer {
        fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord, MalformedRecord> {
            let id = raw.str_field("id").ok_or(MalformedRecord::MissingField("id"))?;
            let qty = raw.value()["qty"].as_i64().unwrap_or(0);
            Ok(CanonicalRecord::new(id, id, qty))
        }
    }

    struct SumReducer {
        partial: bool,
    }

    impl Reducer for SumReducer {
        type State = i64;
        type Report = i64;

        fn init(&self) -> i64 {
            0
        }

        fn fold(&self, state: i64, record: CanonicalRecord) -> i64 {
            state + record.quantity
        }

        fn finalize(&self, state: i64) -> i64 {
            state
        }

        fn supports_partial_report(&self) -> bool {
            self.partial
        }
    }

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<Vec<i64>>,
        fail: bool,
    }

    #[async_trait]
    impl Sink<i64> for MemorySink {
        async fn write(&self, report: &i64) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Io("disk full".to_string()));
            }
            self.written.lock().unwrap().push(*report);
            Ok(())
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_millis(100),
            max: Duration::from_millis(1000),
            jitter: false,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_delay_honors_retry_after() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: false,
        };
        assert_eq!(
            policy.delay(1, Some(Duration::from_secs(4))),
            Duration::from_secs(4)
        );
        assert_eq!(
            policy.delay(2, Some(Duration::from_millis(50))),
            Duration::from_millis(200)
        );
    }

    #[tokio::test]
    async fn test_cancel_wakes_sleeper() {
        let flag = CancelFlag::new();
        let sleeper = flag.clone();
        let task = tokio::spawn(async move { sleeper.sleep_or_cancelled(Duration::from_secs(60)).await });
        tokio::task::yield_now().await;
        flag.cancel();
        let cancelled = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(cancelled);
    }

    #[tokio::test]
    async fn test_run_completes_across_pages() {
        let mut fetcher = ScriptedFetcher::new(vec![
            Ok(page(&[1, 2], Some("c1"))),
            Ok(page(&[3], None)),
        ]);
        let sink = MemorySink::default();
        let driver = PipelineDriver::new(RetryPolicy::immediate(3));

        let report = driver
            .run(&mut fetcher, &IdNormalizer, &SumReducer { partial: true }, &sink)
            .await;

        assert!(report.is_completed());
        assert_eq!(report.report, Some(6));
        assert_eq!(report.counts.processed, 3);
        assert_eq!(report.counts.pages, 2);
        assert_eq!(*sink.written.lock().unwrap(), vec![6]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::transient("502")),
            Err(FetchError::transient("timeout")),
            Ok(page(&[5], None)),
        ]);
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let driver = PipelineDriver::new(RetryPolicy::immediate(3)).with_progress(tx);

        let report = driver
            .run(
                &mut fetcher,
                &IdNormalizer,
                &SumReducer { partial: true },
                &MemorySink::default(),
            )
            .await;

        assert!(report.is_completed());
        assert_eq!(fetcher.calls, 3);
        let last = *rx.borrow();
        assert_eq!(last.retries, 2);
        assert_eq!(last.state, PipelineState::Done);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_with_partial_report() {
        let mut fetcher = ScriptedFetcher::new(vec![
            Ok(page(&[4], Some("c1"))),
            Err(FetchError::transient("503")),
            Err(FetchError::transient("503")),
        ]);
        let sink = MemorySink::default();
        let driver = PipelineDriver::new(RetryPolicy::immediate(2));

        let report = driver
            .run(&mut fetcher, &IdNormalizer, &SumReducer { partial: true }, &sink)
            .await;

        assert_eq!(report.failure_kind(), Some(FailureKind::Transient));
        assert_eq!(report.report, Some(4));
        assert_eq!(report.counts.processed, 1);
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_failure_withholds_report_when_partial_unsupported() {
        let mut fetcher = ScriptedFetcher::new(vec![
            Ok(page(&[4], Some("c1"))),
            Err(FetchError::Fatal("Unauthorized".to_string())),
        ]);
        let driver = PipelineDriver::new(RetryPolicy::immediate(5));

        let report = driver
            .run(
                &mut fetcher,
                &IdNormalizer,
                &SumReducer { partial: false },
                &MemorySink::default(),
            )
            .await;

        assert_eq!(report.failure_kind(), Some(FailureKind::Fatal));
        assert_eq!(report.report, None);
        assert_eq!(fetcher.calls, 2);
    }

    #[tokio::test]
    async fn test_cancel_before_first_fetch() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(page(&[1], None))]);
        let driver = PipelineDriver::new(RetryPolicy::immediate(1));
        driver.cancel_flag().cancel();

        let report = driver
            .run(
                &mut fetcher,
                &IdNormalizer,
                &SumReducer { partial: true },
                &MemorySink::default(),
            )
            .await;

        assert_eq!(report.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(fetcher.calls, 0);
        assert_eq!(report.report, Some(0));
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_with_report() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(page(&[7], None))]);
        let sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };
        let driver = PipelineDriver::new(RetryPolicy::immediate(1));

        let report = driver
            .run(&mut fetcher, &IdNormalizer, &SumReducer { partial: false }, &sink)
            .await;

        assert_eq!(report.failure_kind(), Some(FailureKind::Io));
        assert_eq!(report.report, Some(7));
    }

    struct FlakySink {
        calls: AtomicUsize,
        failures_before_success: usize,
    }

    #[async_trait]
    impl RecordSink<&'static str> for FlakySink {
        async fn write_one(&self, item: &&'static str) -> Result<WriteOutcome, SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match *item {
                "same" => Ok(WriteOutcome::Unchanged),
                "bad" => Err(SinkError::Rejected("invalid".to_string())),
                _ if call < self.failures_before_success => Err(SinkError::Io("reset".to_string())),
                _ => Ok(WriteOutcome::Written),
            }
        }
    }

    #[tokio::test]
    async fn test_apply_each_retries_io_and_counts() {
        let sink = FlakySink {
            calls: AtomicUsize::new(0),
            failures_before_success: 2,
        };
        let driver = PipelineDriver::new(RetryPolicy::immediate(3));

        let report = driver.apply_each(&["new", "same", "bad"], &sink).await;

        assert_eq!(report.results[0], ItemResult::Written);
        assert_eq!(report.results[1], ItemResult::Unchanged);
        assert!(matches!(report.results[2], ItemResult::Failed(_)));
        let summary = report.summary();
        assert_eq!((summary.written, summary.unchanged, summary.failed), (1, 1, 1));
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_apply_each_gives_up_after_max_attempts() {
        let sink = FlakySink {
            calls: AtomicUsize::new(0),
            failures_before_success: 10,
        };
        let driver = PipelineDriver::new(RetryPolicy::immediate(3));

        let report = driver.apply_each(&["new"], &sink).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.summary().failed, 1);
    }
}
