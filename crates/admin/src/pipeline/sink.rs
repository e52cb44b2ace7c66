//! Report sinks and per-record write-back sinks.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument};

use catalog_ops_core::{CollectionGid, ProductGid, SeoMetadata};

use crate::shopify::AdminClient;

use super::reducers::{ImageReport, ImageRow};
use super::{RecordSink, RunSummary, Sink, SinkError, WriteOutcome};

/// Write `bytes` to a sibling temp file, then rename it over `path`.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .ok_or_else(|| SinkError::Io(format!("not a file path: {}", path.display())))?;
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

/// Writes the report as pretty-printed JSON.
///
/// When the driver hands over a whole run, the file holds the run id,
/// outcome and counts with the aggregate under `report`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<R: Serialize + Sync> Sink<R> for JsonFileSink {
    #[instrument(skip(self, report), fields(path = %self.path.display()))]
    async fn write(&self, report: &R) -> Result<(), SinkError> {
        self.write_json(report).await
    }

    #[instrument(skip(self, run), fields(path = %self.path.display(), run_id = %run.run_id))]
    async fn write_run(&self, run: &RunSummary<'_, R>) -> Result<(), SinkError>
    where
        R: Sync,
    {
        self.write_json(run).await
    }
}

impl JsonFileSink {
    async fn write_json<T: Serialize + Sync + ?Sized>(&self, value: &T) -> Result<(), SinkError> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        write_atomically(&self.path, &bytes).await?;
        info!("Report written");
        Ok(())
    }
}

/// Reports that flatten into CSV rows.
pub trait CsvRows {
    /// One CSV row.
    type Row: Serialize;

    /// Rows in output order.
    fn csv_rows(&self) -> &[Self::Row];
}

impl CsvRows for ImageReport {
    type Row = ImageRow;

    fn csv_rows(&self) -> &[ImageRow] {
        &self.rows
    }
}

/// Writes a report's rows as CSV with a header.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    /// Sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl<R: CsvRows + Sync> Sink<R> for CsvFileSink {
    #[instrument(skip(self, report), fields(path = %self.path.display()))]
    async fn write(&self, report: &R) -> Result<(), SinkError> {
        let bytes = {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for row in report.csv_rows() {
                writer.serialize(row)?;
            }
            writer
                .into_inner()
                .map_err(|e| SinkError::Io(e.to_string()))?
        };
        write_atomically(&self.path, &bytes).await?;
        info!(rows = report.csv_rows().len(), "CSV written");
        Ok(())
    }
}

/// Writes to every inner sink in order, stopping at the first failure.
pub struct FanOutSink<R> {
    sinks: Vec<Box<dyn Sink<R>>>,
}

impl<R> FanOutSink<R> {
    /// Combine sinks.
    #[must_use]
    pub fn new(sinks: Vec<Box<dyn Sink<R>>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl<R: Sync> Sink<R> for FanOutSink<R> {
    async fn write(&self, report: &R) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.write(report).await?;
        }
        Ok(())
    }

    async fn write_run(&self, run: &RunSummary<'_, R>) -> Result<(), SinkError>
    where
        R: Sync,
    {
        for sink in &self.sinks {
            sink.write_run(run).await?;
        }
        Ok(())
    }
}

/// Accepts any report and writes nothing. For runs whose report is used in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

#[async_trait]
impl<R: Sync> Sink<R> for DiscardSink {
    async fn write(&self, _report: &R) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A proposed SEO change for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoUpdate {
    /// Product to update.
    pub product: ProductGid,
    /// Product title, for reporting.
    pub title: String,
    /// SEO title currently stored.
    pub current_title: Option<String>,
    /// SEO description currently stored.
    pub current_description: Option<String>,
    /// Computed SEO.
    pub seo: SeoMetadata,
}

impl SeoUpdate {
    /// Whether the store already holds the computed values.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.current_title.as_deref() == Some(self.seo.title.as_str())
            && self.current_description.as_deref() == Some(self.seo.description.as_str())
    }
}

/// Writes product SEO with `productUpdate`, skipping products already up to date.
#[derive(Debug, Clone)]
pub struct ProductSeoSink {
    client: AdminClient,
}

impl ProductSeoSink {
    /// Sink using `client`.
    #[must_use]
    pub const fn new(client: AdminClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordSink<SeoUpdate> for ProductSeoSink {
    async fn write_one(&self, update: &SeoUpdate) -> Result<WriteOutcome, SinkError> {
        if update.is_noop() {
            debug!(product_id = %update.product, "SEO already current");
            return Ok(WriteOutcome::Unchanged);
        }
        self.client
            .update_product_seo(&update.product, &update.seo)
            .await?;
        Ok(WriteOutcome::Written)
    }
}

/// A proposed description change for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptionUpdate {
    /// Product to update.
    pub product: ProductGid,
    /// Product title, for reporting.
    pub title: String,
    /// Description currently stored.
    #[serde(skip)]
    pub current_html: String,
    /// New description.
    #[serde(skip)]
    pub new_html: String,
}

/// Writes `descriptionHtml`, skipping products whose description is unchanged.
#[derive(Debug, Clone)]
pub struct DescriptionSink {
    client: AdminClient,
}

impl DescriptionSink {
    /// Sink using `client`.
    #[must_use]
    pub const fn new(client: AdminClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordSink<DescriptionUpdate> for DescriptionSink {
    async fn write_one(&self, update: &DescriptionUpdate) -> Result<WriteOutcome, SinkError> {
        if update.current_html == update.new_html {
            return Ok(WriteOutcome::Unchanged);
        }
        self.client
            .update_product_description(&update.product, &update.new_html)
            .await?;
        Ok(WriteOutcome::Written)
    }
}

/// A collection description bound for a local HTML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptionFile {
    /// Collection handle, for reporting.
    pub handle: String,
    /// Destination file.
    pub path: PathBuf,
    /// File contents.
    #[serde(skip)]
    pub html: String,
}

/// Writes description files, leaving files that already hold the same HTML untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptionFileSink;

#[async_trait]
impl RecordSink<DescriptionFile> for DescriptionFileSink {
    async fn write_one(&self, file: &DescriptionFile) -> Result<WriteOutcome, SinkError> {
        match tokio::fs::read_to_string(&file.path).await {
            Ok(current) if current == file.html => {
                debug!(handle = %file.handle, "Description file already current");
                return Ok(WriteOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        write_atomically(&file.path, file.html.as_bytes()).await?;
        Ok(WriteOutcome::Written)
    }
}

/// A new description for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionDescriptionUpdate {
    /// Collection to update.
    pub collection: CollectionGid,
    /// New description.
    #[serde(skip)]
    pub html: String,
}

/// Writes a collection's `descriptionHtml`, reading it first so identical
/// descriptions are not rewritten.
#[derive(Debug, Clone)]
pub struct CollectionDescriptionSink {
    client: AdminClient,
}

impl CollectionDescriptionSink {
    /// Sink using `client`.
    #[must_use]
    pub const fn new(client: AdminClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordSink<CollectionDescriptionUpdate> for CollectionDescriptionSink {
    async fn write_one(
        &self,
        update: &CollectionDescriptionUpdate,
    ) -> Result<WriteOutcome, SinkError> {
        let current = self
            .client
            .get_collection_description(&update.collection)
            .await?;
        if current.description_html.as_deref().unwrap_or_default() == update.html {
            debug!(collection_id = %update.collection, "Description already current");
            return Ok(WriteOutcome::Unchanged);
        }
        self.client
            .update_collection_description(&update.collection, &update.html)
            .await?;
        Ok(WriteOutcome::Written)
    }
}
