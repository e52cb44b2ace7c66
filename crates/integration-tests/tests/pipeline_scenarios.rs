//! Driver runs over scripted pages.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::HashSet;

use catalog_ops_admin::pipeline::normalize::ProductNormalizer;
use catalog_ops_admin::pipeline::reducers::{
    FuzzyMatchReducer, InventoryReport, InventoryRiskReducer, MatchStatus, OfflineItem,
};
use catalog_ops_admin::pipeline::{CancelFlag, PipelineDriver, Reducer, RetryPolicy};
use catalog_ops_core::{CanonicalRecord, FailureKind, RunOutcome};
use catalog_ops_integration_tests::{MemorySink, ScriptedFetcher, paginate, product_node};
use serde_json::json;

fn driver() -> PipelineDriver {
    PipelineDriver::new(RetryPolicy::immediate(3))
}

/// 110 products; ids 7, 23, 61 and 104 hold fewer than two units.
fn catalog() -> Vec<serde_json::Value> {
    (1..=110)
        .map(|id| {
            let quantity = match id {
                7 | 61 => 0,
                23 | 104 => 1,
                _ => i64::try_from(id % 9).unwrap() + 2,
            };
            product_node(id, &format!("Bead Strand {id}"), quantity)
        })
        .collect()
}

fn expected_total() -> i64 {
    (1..=110_u64)
        .map(|id| match id {
            7 | 61 => 0,
            23 | 104 => 1,
            _ => i64::try_from(id % 9).unwrap() + 2,
        })
        .sum()
}

// =============================================================================
// Inventory
// =============================================================================

#[tokio::test]
async fn test_three_pages_fold_into_one_inventory_report() {
    let mut fetcher = ScriptedFetcher::new(paginate(catalog(), &[50, 50, 10]));
    let sink = MemorySink::<InventoryReport>::default();

    let run = driver()
        .run(&mut fetcher, &ProductNormalizer, &InventoryRiskReducer::default(), &sink)
        .await;

    assert_eq!(run.outcome, RunOutcome::Completed);
    assert_eq!(run.counts.processed, 110);
    assert_eq!(run.counts.skipped, 0);
    assert_eq!(run.counts.pages, 3);

    let report = run.report.unwrap();
    assert_eq!(report.critical_count, 4);
    assert_eq!(report.total_quantity, expected_total());
    assert_eq!(report.record_count, 110);

    let mut critical: Vec<&str> = report.critical_items.iter().map(|r| r.id.as_str()).collect();
    critical.sort_unstable();
    assert_eq!(
        critical,
        [
            "gid://shopify/Product/104",
            "gid://shopify/Product/23",
            "gid://shopify/Product/61",
            "gid://shopify/Product/7",
        ]
    );

    assert_eq!(sink.reports(), vec![report]);
    assert_eq!(
        fetcher.cursors,
        vec![None, Some("cursor-1".to_string()), Some("cursor-2".to_string())]
    );
}

#[tokio::test]
async fn test_cancel_after_second_page_stops_fetching() {
    let cancel = CancelFlag::new();
    let pages = paginate(catalog(), &[22, 22, 22, 22, 22]);
    let mut fetcher = ScriptedFetcher::new(pages).cancel_after(2, cancel.clone());
    let sink = MemorySink::<InventoryReport>::default();

    let run = driver()
        .with_cancel_flag(cancel)
        .run(&mut fetcher, &ProductNormalizer, &InventoryRiskReducer::default(), &sink)
        .await;

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(run.failure_kind(), Some(FailureKind::Cancelled));
    assert_eq!(run.counts.processed, 44);
    assert!(sink.reports().is_empty());

    let partial = run.report.unwrap();
    assert_eq!(partial.record_count, 44);
    // ids 7 and 23 fall within the first 44 products
    assert_eq!(partial.critical_count, 2);
}

#[tokio::test]
async fn test_malformed_record_is_skipped_without_changing_the_aggregate() {
    let clean = paginate(catalog(), &[50, 50, 10]);
    let mut dirty = clean.clone();
    dirty[1]
        .records
        .insert(10, json!({ "title": "No id here", "totalInventory": 0 }).into());

    let reducer = InventoryRiskReducer::default();
    let clean_run = driver()
        .run(&mut ScriptedFetcher::new(clean), &ProductNormalizer, &reducer, &MemorySink::default())
        .await;
    let dirty_run = driver()
        .run(&mut ScriptedFetcher::new(dirty), &ProductNormalizer, &reducer, &MemorySink::default())
        .await;

    assert_eq!(dirty_run.counts.skipped, 1);
    assert_eq!(dirty_run.counts.processed, 110);
    assert_eq!(dirty_run.report, clean_run.report);
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let reducer = InventoryRiskReducer {
        critical_below: 3,
        low_below: 6,
    };

    let mut reports = Vec::new();
    for _ in 0..2 {
        let run = driver()
            .run(
                &mut ScriptedFetcher::new(paginate(catalog(), &[50, 50, 10])),
                &ProductNormalizer,
                &reducer,
                &MemorySink::default(),
            )
            .await;
        reports.push(run.report.unwrap());
    }

    assert_eq!(reports[0], reports[1]);
    assert_eq!(reports[0].variance.to_bits(), reports[1].variance.to_bits());
}

/// Collects ids in fold order.
struct IdCollector;

impl Reducer for IdCollector {
    type State = Vec<String>;
    type Report = Vec<String>;

    fn init(&self) -> Vec<String> {
        Vec::new()
    }

    fn fold(&self, mut state: Vec<String>, record: CanonicalRecord) -> Vec<String> {
        state.push(record.id);
        state
    }

    fn finalize(&self, state: Vec<String>) -> Vec<String> {
        state
    }
}

#[tokio::test]
async fn test_every_id_is_folded_once() {
    let mut fetcher = ScriptedFetcher::new(paginate(catalog(), &[50, 50, 10]));
    let run = driver()
        .run(&mut fetcher, &ProductNormalizer, &IdCollector, &MemorySink::default())
        .await;

    let ids = run.report.unwrap();
    assert_eq!(ids.len(), 110);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 110);
    assert_eq!(ids[0], "gid://shopify/Product/1");
    assert_eq!(ids[109], "gid://shopify/Product/110");
}

// =============================================================================
// Matching
// =============================================================================

#[tokio::test]
async fn test_exact_title_scores_one_and_selects_that_id() {
    let reducer = FuzzyMatchReducer::new([
        OfflineItem::named("Bead Strand 42"),
        OfflineItem::named("Agate Slab"),
    ]);
    let run = driver()
        .run(
            &mut ScriptedFetcher::new(paginate(catalog(), &[50, 50, 10])),
            &ProductNormalizer,
            &reducer,
            &MemorySink::default(),
        )
        .await;

    let report = run.report.unwrap();
    let MatchStatus::Matched { candidate } = &report.entries[0].status else {
        panic!("expected a confident match, got {:?}", report.entries[0].status);
    };
    assert_eq!(candidate.online_id, "gid://shopify/Product/42");
    assert!((candidate.score - 1.0).abs() < f64::EPSILON);

    assert!(matches!(
        report.entries[1].status,
        MatchStatus::NoConfidentMatch { .. }
    ));
    assert_eq!(report.matched, 1);
    assert_eq!(report.unmatched, 1);
}

#[tokio::test]
async fn test_aborted_match_run_has_no_partial_report() {
    let cancel = CancelFlag::new();
    let mut fetcher =
        ScriptedFetcher::new(paginate(catalog(), &[50, 50, 10])).cancel_after(1, cancel.clone());

    let run = driver()
        .with_cancel_flag(cancel)
        .run(
            &mut fetcher,
            &ProductNormalizer,
            &FuzzyMatchReducer::new([OfflineItem::named("Bead Strand 3")]),
            &MemorySink::default(),
        )
        .await;

    assert_eq!(run.failure_kind(), Some(FailureKind::Cancelled));
    assert!(run.report.is_none());
}

// =============================================================================
// Page boundaries
// =============================================================================

mod page_boundaries {
    use proptest::prelude::*;

    use super::*;

    fn run_with_sizes(sizes: &[usize]) -> InventoryReport {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            driver()
                .run(
                    &mut ScriptedFetcher::new(paginate(catalog(), sizes)),
                    &ProductNormalizer,
                    &InventoryRiskReducer::default(),
                    &MemorySink::default(),
                )
                .await
                .report
                .unwrap()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn report_does_not_depend_on_page_size(page_size in 1_usize..=110) {
            let mut sizes = vec![page_size; 110 / page_size];
            if 110 % page_size != 0 {
                sizes.push(110 % page_size);
            }

            let report = run_with_sizes(&sizes);
            prop_assert_eq!(report, run_with_sizes(&[110]));
        }
    }
}
