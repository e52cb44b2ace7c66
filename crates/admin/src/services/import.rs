//! Bulk product import from a spreadsheet export.
//!
//! Rows are grouped into products: a row with a value in the group column
//! starts a new product and the rows after it become its variants.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use catalog_ops_core::{Price, RawRecord};

use crate::error::Result;
use crate::pipeline::fetcher::StaticFetcher;
use crate::pipeline::normalize::{cell_text, parse_quantity};
use crate::pipeline::{ItemResult, PipelineDriver, RecordSink, SinkError, WriteOutcome};
use crate::shopify::{
    AdminClient, NewImage, NewMetafield, NewOption, NewProduct, NewVariant,
};

/// Sheet columns read by the importer.
pub mod columns {
    /// Product title.
    pub const TITLE: &str = "Title";
    /// Default group column.
    pub const GEMSTONE_NAME: &str = "Gemstone Name";
    /// Material shown in the description.
    pub const MATERIAL: &str = "Material";
    /// Joined into `custom.length`.
    pub const LENGTH: &str = "Length";
    /// Joined into `custom.width`.
    pub const WIDTH: &str = "Width";
    /// Variant option value.
    pub const STONE_COLOUR: &str = "Stone Colour";
    /// Variant price.
    pub const PRICE: &str = "Price";
    /// Variant starting quantity.
    pub const QUANTITY: &str = "Quantity";
    /// Image folder under the image root.
    pub const PHOTO_FOLDER: &str = "Photo Folder";
    /// Collection to add the product to.
    pub const MAIN_COLLECTION: &str = "Main Collection";
}

const DEFAULT_TITLE: &str = "Untitled Product";
const DEFAULT_MATERIAL: &str = "Sterling Silver";
const PRODUCT_TYPE: &str = "Findings";
const OPTION_NAME: &str = "Stone Colour";
const DEFAULT_OPTION_VALUE: &str = "Default";
const METAFIELD_NAMESPACE: &str = "custom";
const METAFIELD_TYPE: &str = "single_line_text_field";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

fn cell(row: &RawRecord, column: &str) -> Option<String> {
    row.value().get(column).and_then(cell_text)
}

/// Split rows into product groups.
///
/// Rows before the first group start form a group of their own.
#[must_use]
pub fn group_rows(rows: Vec<RawRecord>, group_column: &str) -> Vec<Vec<RawRecord>> {
    let mut groups: Vec<Vec<RawRecord>> = Vec::new();
    for row in rows {
        let starts_group = cell(&row, group_column).is_some();
        match groups.last_mut() {
            Some(group) if !starts_group => group.push(row),
            _ => groups.push(vec![row]),
        }
    }
    groups
}

/// A product assembled from one row group, before images are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDraft {
    /// Payload without images.
    pub product: NewProduct,
    /// Image folder named by the first row.
    pub photo_folder: Option<String>,
    /// Collection named by the first row.
    pub collection_id: Option<u64>,
}

fn joined(group: &[RawRecord], column: &str) -> Option<String> {
    let values: Vec<String> = group.iter().filter_map(|row| cell(row, column)).collect();
    (!values.is_empty()).then(|| values.join(", "))
}

/// Build the product payload for one group.
#[must_use]
pub fn build_draft(group: &[RawRecord]) -> ProductDraft {
    let first = group.first();
    let first_cell = |column: &str| first.and_then(|row| cell(row, column));

    let title = first_cell(columns::TITLE).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let material = first_cell(columns::MATERIAL).unwrap_or_else(|| DEFAULT_MATERIAL.to_string());

    let metafields = [("length", columns::LENGTH), ("width", columns::WIDTH)]
        .into_iter()
        .filter_map(|(key, column)| {
            joined(group, column).map(|value| NewMetafield {
                namespace: METAFIELD_NAMESPACE.to_string(),
                key: key.to_string(),
                value,
                kind: METAFIELD_TYPE.to_string(),
            })
        })
        .collect();

    let has_colour = group
        .iter()
        .any(|row| cell(row, columns::STONE_COLOUR).is_some());

    let variants = group
        .iter()
        .map(|row| {
            let price = cell(row, columns::PRICE)
                .and_then(|p| Price::parse(&p).ok())
                .unwrap_or(Price::ZERO);
            let quantity = cell(row, columns::QUANTITY)
                .and_then(|q| parse_quantity(&q))
                .unwrap_or(0);
            NewVariant {
                price: price.to_string(),
                inventory_management: "shopify".to_string(),
                inventory_quantity: quantity,
                option1: has_colour.then(|| {
                    cell(row, columns::STONE_COLOUR)
                        .unwrap_or_else(|| DEFAULT_OPTION_VALUE.to_string())
                }),
            }
        })
        .collect();

    let options = if has_colour {
        vec![NewOption {
            name: OPTION_NAME.to_string(),
        }]
    } else {
        Vec::new()
    };

    let collection_id = first_cell(columns::MAIN_COLLECTION).and_then(|id| {
        let parsed = id.parse::<u64>().ok();
        if parsed.is_none() {
            warn!(%title, collection = %id, "Ignoring non-numeric collection id");
        }
        parsed
    });

    ProductDraft {
        product: NewProduct {
            body_html: format!("<strong>Material:</strong> {material}<br>"),
            product_type: PRODUCT_TYPE.to_string(),
            variants,
            options,
            metafields,
            images: Vec::new(),
            title,
        },
        photo_folder: first_cell(columns::PHOTO_FOLDER),
        collection_id,
    }
}

/// Image files in `dir`, sorted by name. A missing directory has none.
async fn image_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "Image folder not found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)));
        if is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read a folder's images as base64 attachments.
///
/// # Errors
///
/// Returns an error if the folder or an image cannot be read.
pub async fn load_images(dir: &Path) -> std::io::Result<Vec<NewImage>> {
    let mut images = Vec::new();
    for path in image_files(dir).await? {
        let bytes = tokio::fs::read(&path).await?;
        images.push(NewImage {
            attachment: BASE64.encode(bytes),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        });
    }
    debug!(dir = %dir.display(), count = images.len(), "Images loaded");
    Ok(images)
}

/// Creates products that do not already exist by exact title.
#[derive(Debug, Clone)]
pub struct ProductImportSink {
    client: AdminClient,
    image_root: Option<PathBuf>,
}

impl ProductImportSink {
    /// Sink creating products; images come from `image_root/<Photo Folder>`.
    #[must_use]
    pub const fn new(client: AdminClient, image_root: Option<PathBuf>) -> Self {
        Self { client, image_root }
    }
}

#[async_trait]
impl RecordSink<ProductDraft> for ProductImportSink {
    async fn write_one(&self, draft: &ProductDraft) -> std::result::Result<WriteOutcome, SinkError> {
        let title = &draft.product.title;
        if !self.client.find_products_by_title(title).await?.is_empty() {
            info!(%title, "Product already exists");
            return Ok(WriteOutcome::Unchanged);
        }

        let mut product = draft.product.clone();
        if let (Some(root), Some(folder)) = (&self.image_root, &draft.photo_folder) {
            product.images = load_images(&root.join(folder)).await?;
        }

        let created = self.client.create_product(&product).await?;

        if let Some(collection_id) = draft.collection_id
            && let Err(error) = self
                .client
                .add_product_to_collection(created.id, collection_id)
                .await
        {
            warn!(product_id = created.id, collection_id, %error, "Failed to add product to collection");
        }

        Ok(WriteOutcome::Written)
    }
}

/// One product's import result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    /// Product title.
    pub title: String,
    /// Number of variants.
    pub variants: usize,
    /// Full payload (dry run only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ProductDraft>,
    /// Write result; absent in a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ItemResult>,
}

/// Results of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Rows read.
    pub rows: usize,
    /// Products created.
    pub created: usize,
    /// Products skipped because the title exists.
    pub skipped: usize,
    /// Products that failed.
    pub failed: usize,
    /// Per-product entries in sheet order.
    pub products: Vec<ImportEntry>,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Whether the run stopped early.
    pub cancelled: bool,
}

/// Options for [`ImportService::run`].
#[derive(Debug, Clone)]
pub struct ImportJobOptions {
    /// JSON or CSV input.
    pub input: PathBuf,
    /// Directory holding one image folder per product.
    pub image_root: Option<PathBuf>,
    /// Column whose non-empty value starts a new product.
    pub group_column: String,
    /// Build payloads without writing.
    pub dry_run: bool,
}

/// Imports grouped sheet rows as products.
#[derive(Debug, Clone)]
pub struct ImportService {
    client: AdminClient,
}

impl ImportService {
    /// Create the service.
    #[must_use]
    pub const fn new(client: AdminClient) -> Self {
        Self { client }
    }

    /// Import every product group in the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be loaded.
    #[instrument(skip(self, driver, options), fields(input = %options.input.display()))]
    pub async fn run(
        &self,
        driver: &PipelineDriver,
        options: &ImportJobOptions,
    ) -> Result<ImportReport> {
        let rows = StaticFetcher::from_path(&options.input)?.into_records();
        let row_count = rows.len();
        let drafts: Vec<ProductDraft> = group_rows(rows, &options.group_column)
            .iter()
            .map(|group| build_draft(group))
            .collect();
        info!(rows = row_count, products = drafts.len(), "Input grouped");

        let mut report = ImportReport {
            rows: row_count,
            dry_run: options.dry_run,
            ..ImportReport::default()
        };

        if options.dry_run {
            report.products = drafts
                .into_iter()
                .map(|draft| ImportEntry {
                    title: draft.product.title.clone(),
                    variants: draft.product.variants.len(),
                    payload: Some(draft),
                    result: None,
                })
                .collect();
            return Ok(report);
        }

        let sink = ProductImportSink::new(self.client.clone(), options.image_root.clone());
        let applied = driver.apply_each(&drafts, &sink).await;
        let summary = applied.summary();
        report.created = summary.written;
        report.skipped = summary.unchanged;
        report.failed = summary.failed;
        report.cancelled = applied.cancelled;
        report.products = drafts
            .iter()
            .zip(applied.results)
            .map(|(draft, result)| ImportEntry {
                title: draft.product.title.clone(),
                variants: draft.product.variants.len(),
                payload: None,
                result: Some(result),
            })
            .collect();

        info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }
}
