//! Page fetchers: the Shopify catalog, the store's collections and static file input.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use catalog_ops_core::{CollectionGid, Cursor, Page, RawRecord};

use crate::shopify::AdminClient;

use super::{FetchError, PageFetcher};

/// Field stamped onto every static record with its 1-based input position.
pub const ROW_NUMBER_FIELD: &str = "_row";

/// Which products to page through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogScope {
    /// Every product in the store.
    All,
    /// Products in one collection.
    Collection(CollectionGid),
    /// Products matching a Shopify search query.
    Search(String),
}

/// One raw record per product, or one per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordShape {
    /// Product nodes as returned by the API.
    #[default]
    Product,
    /// Variant nodes, each carrying a `product` object with its parent's context.
    Variant,
}

/// Pages through the Admin API product connection.
#[derive(Debug, Clone)]
pub struct ShopifyCatalogFetcher {
    client: AdminClient,
    scope: CatalogScope,
    shape: RecordShape,
    page_size: u32,
}

impl ShopifyCatalogFetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(client: AdminClient, scope: CatalogScope, shape: RecordShape, page_size: u32) -> Self {
        Self {
            client,
            scope,
            shape,
            page_size,
        }
    }
}

#[async_trait]
impl PageFetcher for ShopifyCatalogFetcher {
    #[instrument(skip(self, cursor), fields(scope = ?self.scope, shape = ?self.shape))]
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
        let after = cursor.map(|c| c.as_str().to_string());
        let with_variants = self.shape == RecordShape::Variant;

        let connection = match &self.scope {
            CatalogScope::All => {
                self.client
                    .products_page(self.page_size, after, None, with_variants)
                    .await?
            }
            CatalogScope::Search(query) => {
                self.client
                    .products_page(self.page_size, after, Some(query.clone()), with_variants)
                    .await?
            }
            CatalogScope::Collection(id) => {
                self.client
                    .collection_products_page(id, self.page_size, after, with_variants)
                    .await?
            }
        };

        let next_cursor = connection.next_cursor().map(Cursor::new);
        let records: Vec<RawRecord> = match self.shape {
            RecordShape::Product => connection.nodes.into_iter().map(RawRecord::new).collect(),
            RecordShape::Variant => connection
                .nodes
                .into_iter()
                .flat_map(explode_variants)
                .collect(),
        };

        debug!(records = records.len(), has_next = next_cursor.is_some(), "Fetched page");
        Ok(Page {
            records,
            next_cursor,
        })
    }
}

/// Pages through the store's collections, one raw record per collection.
#[derive(Debug, Clone)]
pub struct CollectionListFetcher {
    client: AdminClient,
    page_size: u32,
}

impl CollectionListFetcher {
    /// Create a fetcher.
    #[must_use]
    pub const fn new(client: AdminClient, page_size: u32) -> Self {
        Self { client, page_size }
    }
}

#[async_trait]
impl PageFetcher for CollectionListFetcher {
    #[instrument(skip(self, cursor))]
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
        let after = cursor.map(|c| c.as_str().to_string());
        let connection = self.client.collections_page(self.page_size, after).await?;

        let next_cursor = connection.next_cursor().map(Cursor::new);
        let records: Vec<RawRecord> = connection.nodes.into_iter().map(RawRecord::new).collect();

        debug!(records = records.len(), has_next = next_cursor.is_some(), "Fetched collections");
        Ok(Page {
            records,
            next_cursor,
        })
    }
}

/// Product context copied onto each variant.
const PRODUCT_CONTEXT_FIELDS: [&str; 5] = ["id", "title", "handle", "vendor", "productType"];

/// Split a product node into variant records with a `product` context object.
fn explode_variants(product: Value) -> Vec<RawRecord> {
    let mut context = Map::new();
    for field in PRODUCT_CONTEXT_FIELDS {
        if let Some(value) = product.get(field) {
            context.insert(field.to_string(), value.clone());
        }
    }

    nested_nodes(&product, "variants")
        .into_iter()
        .filter_map(|variant| match variant.clone() {
            Value::Object(mut object) => {
                object.insert("product".to_string(), Value::Object(context.clone()));
                Some(RawRecord::new(Value::Object(object)))
            }
            _ => None,
        })
        .collect()
}

/// Nodes of a nested connection, accepting both `nodes` and `edges[].node`.
pub(crate) fn nested_nodes<'a>(value: &'a Value, field: &str) -> Vec<&'a Value> {
    let Some(connection) = value.get(field) else {
        return Vec::new();
    };

    if let Some(nodes) = connection.get("nodes").and_then(Value::as_array) {
        return nodes.iter().collect();
    }
    connection
        .get("edges")
        .and_then(Value::as_array)
        .map(|edges| edges.iter().filter_map(|edge| edge.get("node")).collect())
        .unwrap_or_default()
}

/// Failure loading static input.
#[derive(Debug, Error)]
pub enum InputError {
    /// The file could not be read.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON could not be parsed.
    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// The CSV could not be parsed.
    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),

    /// The JSON was not an array of objects.
    #[error("JSON input must be an array of objects")]
    NotAnArray,
}

/// Zero-pagination fetcher over rows loaded up front.
///
/// Every fetch returns the full set of rows as a single last page.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    records: Vec<RawRecord>,
}

impl StaticFetcher {
    /// Parse a JSON array of objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid JSON or not an array of objects.
    pub fn from_json_str(input: &str) -> Result<Self, InputError> {
        let value: Value = serde_json::from_str(input)?;
        let Value::Array(items) = value else {
            return Err(InputError::NotAnArray);
        };

        let records = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(object) => Ok(stamp_row(object, index)),
                _ => Err(InputError::NotAnArray),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { records })
    }

    /// Parse CSV with a header row; every cell becomes a string field.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV is malformed.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, InputError> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let mut records = Vec::new();
        for (index, row) in csv_reader.records().enumerate() {
            let row = row?;
            let mut object = Map::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                object.insert(header.trim().to_string(), Value::String(cell.to_string()));
            }
            records.push(stamp_row(object, index));
        }

        Ok(Self { records })
    }

    /// Load a `.csv` file as CSV and anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

        if is_csv {
            Self::from_csv_reader(std::fs::File::open(path)?)
        } else {
            Self::from_json_str(&std::fs::read_to_string(path)?)
        }
    }

    /// The loaded rows.
    #[must_use]
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Take the loaded rows.
    #[must_use]
    pub fn into_records(self) -> Vec<RawRecord> {
        self.records
    }
}

fn stamp_row(mut object: Map<String, Value>, index: usize) -> RawRecord {
    object.insert(ROW_NUMBER_FIELD.to_string(), Value::from(index + 1));
    RawRecord::new(Value::Object(object))
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&mut self, _cursor: Option<&Cursor>) -> Result<Page, FetchError> {
        Ok(Page::last(self.records.clone()))
    }
}
