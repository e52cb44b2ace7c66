//! Integration tests for Catalog Ops.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p catalog-ops-integration-tests
//! ```
//!
//! No store is needed: Shopify is replaced by `wiremock` servers and
//! scripted page fetchers.
//!
//! # Test Categories
//!
//! - `pipeline_scenarios` - driver runs over scripted pages
//! - `shopify_paging` - full runs against a mocked Admin API
//! - `file_reports` - sheet input and report files on disk

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_ops_admin::config::ShopifyAdminConfig;
use catalog_ops_admin::pipeline::{CancelFlag, FetchError, PageFetcher, Sink, SinkError};
use catalog_ops_admin::shopify::AdminClient;
use catalog_ops_core::{Cursor, Page, RawRecord};

/// API version the mocked Admin API answers on.
pub const API_VERSION: &str = "2025-01";

/// A product node the way the Admin API returns it.
#[must_use]
pub fn product_node(id: u64, title: &str, quantity: i64) -> Value {
    json!({
        "id": format!("gid://shopify/Product/{id}"),
        "title": title,
        "handle": title.to_lowercase().replace(' ', "-"),
        "vendor": "Gem House",
        "productType": "Beads",
        "totalInventory": quantity,
        "seo": { "title": null, "description": null },
        "images": { "nodes": [] }
    })
}

/// Split `nodes` into pages of the given sizes.
///
/// Page `n` (1-based) carries cursor `cursor-n` unless it is the last.
#[must_use]
pub fn paginate(nodes: Vec<Value>, sizes: &[usize]) -> Vec<Page> {
    let mut remaining = nodes.into_iter();
    let count = sizes.len();
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| Page {
            records: remaining.by_ref().take(*size).map(RawRecord::new).collect(),
            next_cursor: (i + 1 < count).then(|| Cursor::new(format!("cursor-{}", i + 1))),
        })
        .collect()
}

/// Serves a fixed list of pages and records the cursors it was asked for.
///
/// Optionally cancels a flag once a given number of pages has been served,
/// the way a user pressing Ctrl-C mid-run would.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: VecDeque<Page>,
    /// Cursors passed to `fetch`, in call order.
    pub cursors: Vec<Option<String>>,
    cancel_after: Option<(usize, CancelFlag)>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages: pages.into(),
            ..Self::default()
        }
    }

    /// Cancel `flag` right after page `pages` has been served.
    #[must_use]
    pub fn cancel_after(mut self, pages: usize, flag: CancelFlag) -> Self {
        self.cancel_after = Some((pages, flag));
        self
    }

    /// Number of pages served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.cursors.len()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&mut self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
        self.cursors.push(cursor.map(|c| c.as_str().to_string()));
        let page = self
            .pages
            .pop_front()
            .ok_or_else(|| FetchError::Fatal("no more scripted pages".to_string()))?;

        if let Some((after, flag)) = &self.cancel_after
            && self.cursors.len() == *after
        {
            flag.cancel();
        }
        Ok(page)
    }
}

/// Keeps every report it is given.
#[derive(Debug)]
pub struct MemorySink<R> {
    reports: Mutex<Vec<R>>,
}

impl<R> Default for MemorySink<R> {
    fn default() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
        }
    }
}

impl<R: Clone> MemorySink<R> {
    /// Reports written so far.
    #[must_use]
    pub fn reports(&self) -> Vec<R> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> Sink<R> for MemorySink<R> {
    async fn write(&self, report: &R) -> Result<(), SinkError> {
        self.reports
            .lock()
            .map_err(|e| SinkError::Io(e.to_string()))?
            .push(report.clone());
        Ok(())
    }
}

/// Admin client pointed at a mock server.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn admin_client(server: &MockServer) -> AdminClient {
    let config = ShopifyAdminConfig {
        store: "gem-house.myshopify.com".to_string(),
        api_version: API_VERSION.to_string(),
        access_token: SecretString::from("shpat_integration"),
    };
    AdminClient::with_base_url(&config, &server.uri()).expect("client builds")
}

/// Serve `pages` as consecutive `ProductsPage` responses.
///
/// Each page is matched on the `after` cursor the fetcher must send, so a
/// fetcher that repeats or skips a cursor gets no response.
pub async fn mount_product_pages(server: &MockServer, pages: &[Vec<Value>]) {
    let count = pages.len();
    for (i, nodes) in pages.iter().enumerate() {
        let after = (i > 0).then(|| format!("cursor-{i}"));
        let has_next = i + 1 < count;
        let end_cursor = has_next.then(|| format!("cursor-{}", i + 1));

        Mock::given(method("POST"))
            .and(path(format!("/admin/api/{API_VERSION}/graphql.json")))
            .and(body_partial_json(json!({
                "operationName": "ProductsPage",
                "variables": { "after": after }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "products": {
                    "nodes": nodes,
                    "pageInfo": { "hasNextPage": has_next, "endCursor": end_cursor }
                }}
            })))
            .expect(1)
            .mount(server)
            .await;
    }
}
