//! Read-only catalog reports.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use catalog_ops_admin::error::JobError;
use catalog_ops_admin::pipeline::fetcher::{RecordShape, ShopifyCatalogFetcher, StaticFetcher};
use catalog_ops_admin::pipeline::normalize::{ProductNormalizer, SheetRowNormalizer, VariantNormalizer};
use catalog_ops_admin::pipeline::reducers::{
    FuzzyMatchReducer, ImageMetadataReducer, ImageReport, InventoryRiskReducer,
};
use catalog_ops_admin::pipeline::sink::{CsvFileSink, FanOutSink, JsonFileSink};
use catalog_ops_admin::pipeline::{Normalizer, PageFetcher, Reducer, Sink, spawn_pipeline};
use catalog_ops_core::{FailureKind, ProgressSnapshot};

use super::{Context, catalog_scope, finish_run};

/// Which online products to read.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Only products in this collection (numeric id or GID)
    #[arg(long)]
    pub collection: Option<String>,

    /// Only products matching this Shopify search query
    #[arg(long, conflicts_with = "collection")]
    pub search: Option<String>,
}

#[derive(Debug, Args)]
pub struct InventoryArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Read a JSON or CSV sheet instead of the store
    #[arg(long, conflicts_with_all = ["collection", "search"])]
    pub input: Option<PathBuf>,

    /// Sheet column holding quantities (with --input)
    #[arg(long, default_value = "Quantity")]
    pub quantity_column: String,

    /// One record per variant instead of per product
    #[arg(long)]
    pub variants: bool,

    /// Quantities below this are critical
    #[arg(long, default_value_t = 2)]
    pub critical_below: i64,

    /// Quantities below this are low
    #[arg(long, default_value_t = 5)]
    pub low_below: i64,

    /// Report path
    #[arg(long, default_value = "reports/inventory.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct ImagesArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Report path
    #[arg(long, default_value = "reports/images.json")]
    pub output: PathBuf,

    /// Also write one CSV row per image
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Offline rows (JSON array or CSV)
    #[arg(long)]
    pub input: PathBuf,

    /// Column holding offline titles
    #[arg(long, default_value = "Title")]
    pub title_column: String,

    /// Minimum similarity for a confident match (0.0 - 1.0)
    #[arg(long, default_value_t = 0.85)]
    pub min_score: f64,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Report path
    #[arg(long, default_value = "reports/matches.json")]
    pub output: PathBuf,
}

/// Log a line each time another page has been folded.
async fn log_progress(mut progress: watch::Receiver<ProgressSnapshot>) {
    let mut last_page = 0;
    while progress.changed().await.is_ok() {
        let snapshot = *progress.borrow_and_update();
        if snapshot.pages_fetched > last_page && snapshot.processed > 0 {
            last_page = snapshot.pages_fetched;
            info!(
                pages = snapshot.pages_fetched,
                processed = snapshot.processed,
                skipped = snapshot.skipped,
                retries = snapshot.retries,
                "Progress"
            );
        }
    }
}

/// Run a pipeline on a worker task and return its report.
async fn run_report<F, N, Rd, S>(
    ctx: &Context,
    fetcher: F,
    normalizer: N,
    reducer: Rd,
    sink: S,
    output: &Path,
) -> Result<Rd::Report, JobError>
where
    F: PageFetcher + 'static,
    N: Normalizer + 'static,
    Rd: Reducer + 'static,
    Rd::State: 'static,
    Rd::Report: Serialize + 'static,
    S: Sink<Rd::Report> + 'static,
{
    let handle = spawn_pipeline(ctx.driver(), fetcher, normalizer, reducer, sink);
    tokio::spawn(log_progress(handle.progress.clone()));

    let run = handle.wait().await.map_err(|e| JobError::Pipeline {
        kind: FailureKind::Fatal,
        message: format!("pipeline worker failed: {e}"),
    })?;
    finish_run(run, output).await
}

fn online_fetcher(
    ctx: &Context,
    source: &SourceArgs,
    shape: RecordShape,
) -> Result<ShopifyCatalogFetcher, JobError> {
    let scope = catalog_scope(source.collection.as_deref(), source.search.as_deref())?;
    Ok(ShopifyCatalogFetcher::new(
        ctx.client.clone(),
        scope,
        shape,
        ctx.config.pipeline.page_size,
    ))
}

/// Stock risk report.
pub async fn inventory(ctx: &Context, args: InventoryArgs) -> Result<(), JobError> {
    if args.critical_below > args.low_below {
        return Err(JobError::InvalidArgument(
            "--critical-below must not exceed --low-below".to_string(),
        ));
    }
    let reducer = InventoryRiskReducer {
        critical_below: args.critical_below,
        low_below: args.low_below,
    };
    let sink = JsonFileSink::new(&args.output);

    let report = if let Some(input) = &args.input {
        let normalizer = SheetRowNormalizer {
            quantity_column: Some(args.quantity_column.clone()),
            ..SheetRowNormalizer::default()
        };
        let fetcher = StaticFetcher::from_path(input)?;
        run_report(ctx, fetcher, normalizer, reducer, sink, &args.output).await?
    } else if args.variants {
        let fetcher = online_fetcher(ctx, &args.source, RecordShape::Variant)?;
        run_report(ctx, fetcher, VariantNormalizer, reducer, sink, &args.output).await?
    } else {
        let fetcher = online_fetcher(ctx, &args.source, RecordShape::Product)?;
        run_report(ctx, fetcher, ProductNormalizer, reducer, sink, &args.output).await?
    };

    info!(
        records = report.record_count,
        critical = report.critical_count,
        low = report.low_count,
        healthy = report.healthy_count,
        negative = report.negative_count,
        total_quantity = report.total_quantity,
        "Inventory report"
    );
    Ok(())
}

/// Image metadata report.
pub async fn images(ctx: &Context, args: ImagesArgs) -> Result<(), JobError> {
    let mut sinks: Vec<Box<dyn Sink<ImageReport>>> = vec![Box::new(JsonFileSink::new(&args.output))];
    if let Some(csv) = &args.csv {
        sinks.push(Box::new(CsvFileSink::new(csv)));
    }

    let fetcher = online_fetcher(ctx, &args.source, RecordShape::Product)?;
    let report = run_report(
        ctx,
        fetcher,
        ProductNormalizer,
        ImageMetadataReducer,
        FanOutSink::new(sinks),
        &args.output,
    )
    .await?;

    info!(
        images = report.image_count,
        with_images = report.records_with_images,
        without_images = report.records_without_images,
        missing_alt_text = report.missing_alt_text,
        "Image report"
    );
    Ok(())
}

/// Offline-to-online title matching.
pub async fn match_titles(ctx: &Context, args: MatchArgs) -> Result<(), JobError> {
    if !(0.0..=1.0).contains(&args.min_score) {
        return Err(JobError::InvalidArgument(
            "--min-score must be between 0 and 1".to_string(),
        ));
    }

    let rows = StaticFetcher::from_path(&args.input)?.into_records();
    let reducer = FuzzyMatchReducer::from_rows(&rows, &args.title_column).with_min_score(args.min_score);
    if reducer.offline_items().is_empty() {
        return Err(JobError::InvalidArgument(format!(
            "no titles in column {:?} of {}",
            args.title_column,
            args.input.display()
        )));
    }
    info!(offline = reducer.offline_items().len(), "Offline titles loaded");

    let fetcher = online_fetcher(ctx, &args.source, RecordShape::Product)?;
    let report = run_report(
        ctx,
        fetcher,
        ProductNormalizer,
        reducer,
        JsonFileSink::new(&args.output),
        &args.output,
    )
    .await?;

    info!(
        online = report.online_count,
        matched = report.matched,
        unmatched = report.unmatched,
        "Match report"
    );
    Ok(())
}
