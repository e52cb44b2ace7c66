//! Collection catalog sync and collection description files.
//!
//! The catalog is a JSON array of `{id, title, handle}` kept in step with the
//! store. Descriptions are pulled into `<dir>/<handle>/description.html` and
//! pushed back one collection at a time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use catalog_ops_core::{CollectionGid, RunCounts};

use crate::error::{JobError, Result};
use crate::pipeline::fetcher::{CollectionListFetcher, InputError};
use crate::pipeline::normalize::CollectionNormalizer;
use crate::pipeline::reducers::{CollectionCatalogReducer, CollectionEntry};
use crate::pipeline::sink::{
    CollectionDescriptionSink, CollectionDescriptionUpdate, DescriptionFile, DescriptionFileSink,
    DiscardSink, JsonFileSink,
};
use crate::pipeline::{ItemResult, PipelineDriver, Sink};
use crate::shopify::AdminClient;

use super::completed_report;

/// File name of a pulled description inside its handle directory.
pub const DESCRIPTION_FILE: &str = "description.html";

/// Read a catalog file, `None` when it does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a catalog array.
pub async fn read_catalog(path: &Path) -> Result<Option<Vec<CollectionEntry>>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let entries = serde_json::from_str(&text).map_err(InputError::from)?;
    Ok(Some(entries))
}

/// Append fetched entries whose handle is not in `catalog`; returns the appended ones.
pub fn merge_new(
    catalog: &mut Vec<CollectionEntry>,
    fetched: Vec<CollectionEntry>,
) -> Vec<CollectionEntry> {
    let mut known: HashSet<String> = catalog.iter().map(|e| e.handle.clone()).collect();
    let added: Vec<CollectionEntry> = fetched
        .into_iter()
        .filter(|entry| known.insert(entry.handle.clone()))
        .collect();
    catalog.extend(added.iter().cloned());
    added
}

/// Whether a handle can be used as a single directory name.
fn is_safe_segment(handle: &str) -> bool {
    !handle.is_empty() && handle != "." && handle != ".." && !handle.contains(['/', '\\'])
}

/// Options for [`CollectionService::sync`].
#[derive(Debug, Clone)]
pub struct CollectionSyncOptions {
    /// Catalog file.
    pub catalog: PathBuf,
    /// Replace the catalog with the fetched list instead of appending new handles.
    pub replace: bool,
}

/// Report for one catalog sync.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSyncReport {
    /// Catalog file.
    pub catalog: String,
    /// Collections fetched from the store.
    pub fetched: usize,
    /// Entries whose handle was not in the catalog before.
    pub added: Vec<CollectionEntry>,
    /// Entries dropped by a replace.
    pub removed: usize,
    /// Entries in the catalog afterwards.
    pub total: usize,
    /// Fetched collections ignored because their handle repeated.
    pub duplicate_handles: usize,
    /// Whether the catalog was replaced.
    pub replaced: bool,
    /// Whether the catalog file was written.
    pub written: bool,
    /// Scan counts.
    pub counts: RunCounts,
}

/// Where a pulled description ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionStatus {
    /// Written to a file that did not exist.
    New,
    /// Written over a file with different contents.
    Updated,
    /// The file already held this description.
    Unchanged,
    /// The collection has no description.
    Empty,
    /// Reading or writing failed.
    Failed,
    /// Not attempted because the job was interrupted.
    Cancelled,
}

/// Outcome for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptionEntry {
    /// Collection handle.
    pub handle: String,
    /// Collection title.
    pub title: String,
    /// What happened.
    pub status: DescriptionStatus,
    /// Description file, when one was due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Cause of a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report for one description pull.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DescriptionPullReport {
    /// Directory holding the description files.
    pub dir: String,
    /// Per-collection outcomes in catalog order.
    pub collections: Vec<DescriptionEntry>,
    /// Files created.
    pub new: usize,
    /// Files rewritten.
    pub updated: usize,
    /// Files already current.
    pub unchanged: usize,
    /// Collections without a description.
    pub empty: usize,
    /// Collections that could not be read or written.
    pub failed: usize,
    /// Whether the job stopped early.
    pub cancelled: bool,
}

impl DescriptionPullReport {
    fn tally(&mut self) {
        for entry in &self.collections {
            match entry.status {
                DescriptionStatus::New => self.new += 1,
                DescriptionStatus::Updated => self.updated += 1,
                DescriptionStatus::Unchanged => self.unchanged += 1,
                DescriptionStatus::Empty => self.empty += 1,
                DescriptionStatus::Failed => self.failed += 1,
                DescriptionStatus::Cancelled => {}
            }
        }
    }
}

/// Options for [`CollectionService::pull_descriptions`].
#[derive(Debug, Clone)]
pub struct DescriptionPullOptions {
    /// Catalog file listing the collections.
    pub catalog: PathBuf,
    /// Directory receiving one folder per handle.
    pub dir: PathBuf,
}

/// Options for [`CollectionService::push_description`].
#[derive(Debug, Clone)]
pub struct DescriptionPushOptions {
    /// Collection to update.
    pub collection: CollectionGid,
    /// HTML file to upload.
    pub file: PathBuf,
    /// Read and check the file without writing.
    pub dry_run: bool,
}

/// Report for one description push.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptionPushReport {
    /// Collection updated.
    pub collection_id: String,
    /// Source file.
    pub file: String,
    /// Size of the uploaded HTML in bytes.
    pub bytes: usize,
    /// Write result; absent in a dry run or when interrupted first.
    pub result: Option<ItemResult>,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Whether the job stopped before writing.
    pub cancelled: bool,
}

/// Keeps the collection catalog and description files in step with the store.
#[derive(Debug, Clone)]
pub struct CollectionService {
    client: AdminClient,
    page_size: u32,
}

impl CollectionService {
    /// Create the service.
    #[must_use]
    pub const fn new(client: AdminClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    /// Fetch every collection and update the catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan aborts or the catalog cannot be read or written.
    #[instrument(skip(self, driver, options), fields(catalog = %options.catalog.display()))]
    pub async fn sync(
        &self,
        driver: &PipelineDriver,
        options: &CollectionSyncOptions,
    ) -> Result<CollectionSyncReport> {
        let mut fetcher = CollectionListFetcher::new(self.client.clone(), self.page_size);
        let (fetched, counts) = completed_report(
            driver
                .run(&mut fetcher, &CollectionNormalizer, &CollectionCatalogReducer, &DiscardSink)
                .await,
        )?;
        let fetched_count = fetched.entries.len();
        info!(fetched = fetched_count, "Collections fetched");

        let existing = read_catalog(&options.catalog).await?;
        let file_exists = existing.is_some();
        let mut catalog = existing.unwrap_or_default();

        let (added, removed) = if options.replace {
            let previous: HashSet<String> = catalog.iter().map(|e| e.handle.clone()).collect();
            let fetched_handles: HashSet<&str> =
                fetched.entries.iter().map(|e| e.handle.as_str()).collect();
            let removed = previous
                .iter()
                .filter(|handle| !fetched_handles.contains(handle.as_str()))
                .count();
            let added: Vec<CollectionEntry> = fetched
                .entries
                .iter()
                .filter(|e| !previous.contains(&e.handle))
                .cloned()
                .collect();
            catalog = fetched.entries;
            (added, removed)
        } else {
            (merge_new(&mut catalog, fetched.entries), 0)
        };

        let written = options.replace || !added.is_empty() || !file_exists;
        if written {
            JsonFileSink::new(&options.catalog).write(&catalog).await?;
        } else {
            info!("No new collections, catalog left as is");
        }

        Ok(CollectionSyncReport {
            catalog: options.catalog.display().to_string(),
            fetched: fetched_count,
            total: catalog.len(),
            added,
            removed,
            duplicate_handles: fetched.duplicate_handles,
            replaced: options.replace,
            written,
            counts,
        })
    }

    /// Save each catalog collection's description as an HTML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is missing or unreadable. Per-collection
    /// failures are reported in the result.
    #[instrument(skip(self, driver, options), fields(dir = %options.dir.display()))]
    pub async fn pull_descriptions(
        &self,
        driver: &PipelineDriver,
        options: &DescriptionPullOptions,
    ) -> Result<DescriptionPullReport> {
        let catalog = read_catalog(&options.catalog).await?.ok_or_else(|| {
            JobError::InvalidArgument(format!(
                "catalog {} not found, run sync-collections first",
                options.catalog.display()
            ))
        })?;

        let cancel = driver.cancel_flag();
        let mut report = DescriptionPullReport {
            dir: options.dir.display().to_string(),
            ..DescriptionPullReport::default()
        };
        let mut files = Vec::new();
        let mut pending = Vec::new();

        for entry in &catalog {
            let mut outcome = DescriptionEntry {
                handle: entry.handle.clone(),
                title: entry.title.clone(),
                status: DescriptionStatus::Failed,
                path: None,
                error: None,
            };
            if cancel.is_cancelled() {
                report.cancelled = true;
                outcome.status = DescriptionStatus::Cancelled;
                report.collections.push(outcome);
                continue;
            }

            match self.fetch_description(entry).await {
                Ok(Some(html)) => {
                    let path = options.dir.join(&entry.handle).join(DESCRIPTION_FILE);
                    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
                    outcome.path = Some(path.display().to_string());
                    outcome.status = DescriptionStatus::Cancelled;
                    pending.push((report.collections.len(), existed));
                    files.push(DescriptionFile {
                        handle: entry.handle.clone(),
                        path,
                        html,
                    });
                }
                Ok(None) => outcome.status = DescriptionStatus::Empty,
                Err(error) => {
                    warn!(handle = %entry.handle, %error, "Description not read");
                    outcome.error = Some(error);
                }
            }
            report.collections.push(outcome);
        }

        let applied = driver.apply_each(&files, &DescriptionFileSink).await;
        report.cancelled |= applied.cancelled;
        for ((index, existed), result) in pending.into_iter().zip(applied.results) {
            let Some(outcome) = report.collections.get_mut(index) else {
                continue;
            };
            outcome.status = match result {
                ItemResult::Written if existed => DescriptionStatus::Updated,
                ItemResult::Written => DescriptionStatus::New,
                ItemResult::Unchanged => DescriptionStatus::Unchanged,
                ItemResult::Failed(error) => {
                    outcome.error = Some(error);
                    DescriptionStatus::Failed
                }
            };
        }

        report.tally();
        info!(
            new = report.new,
            updated = report.updated,
            unchanged = report.unchanged,
            empty = report.empty,
            failed = report.failed,
            "Descriptions pulled"
        );
        Ok(report)
    }

    /// Description HTML of one catalog entry, `None` when it is blank.
    async fn fetch_description(
        &self,
        entry: &CollectionEntry,
    ) -> std::result::Result<Option<String>, String> {
        if !is_safe_segment(&entry.handle) {
            return Err(format!("handle {:?} cannot name a directory", entry.handle));
        }
        let id = CollectionGid::parse(&entry.id).map_err(|e| e.to_string())?;
        let collection = self
            .client
            .get_collection_description(&id)
            .await
            .map_err(|e| e.to_string())?;
        Ok(collection
            .description_html
            .filter(|html| !html.trim().is_empty()))
    }

    /// Upload an HTML file as a collection's description.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is empty. A rejected
    /// write is reported in the result.
    #[instrument(skip(self, driver, options), fields(collection_id = %options.collection))]
    pub async fn push_description(
        &self,
        driver: &PipelineDriver,
        options: &DescriptionPushOptions,
    ) -> Result<DescriptionPushReport> {
        let html = tokio::fs::read_to_string(&options.file).await?;
        if html.trim().is_empty() {
            return Err(JobError::InvalidArgument(format!(
                "{} is empty",
                options.file.display()
            )));
        }

        let mut report = DescriptionPushReport {
            collection_id: options.collection.to_string(),
            file: options.file.display().to_string(),
            bytes: html.len(),
            result: None,
            dry_run: options.dry_run,
            cancelled: false,
        };
        if options.dry_run {
            info!(bytes = report.bytes, "Dry run, nothing written");
            return Ok(report);
        }

        let update = CollectionDescriptionUpdate {
            collection: options.collection.clone(),
            html,
        };
        let applied = driver
            .apply_each(
                std::slice::from_ref(&update),
                &CollectionDescriptionSink::new(self.client.clone()),
            )
            .await;
        report.cancelled = applied.cancelled;
        report.result = applied.results.into_iter().next();
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::pipeline::RetryPolicy;
    use crate::shopify::admin::tests::test_client;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(id: u64, title: &str, handle: &str) -> CollectionEntry {
        CollectionEntry {
            id: format!("gid://shopify/Collection/{id}"),
            title: title.to_string(),
            handle: handle.to_string(),
        }
    }

    fn driver() -> PipelineDriver {
        PipelineDriver::new(RetryPolicy::immediate(1))
    }

    async fn mount_collections(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "operationName": "CollectionsPage" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "collections": {
                    "nodes": [
                        { "id": "gid://shopify/Collection/1", "title": "Beads (renamed)", "handle": "beads" },
                        { "id": "gid://shopify/Collection/2", "title": "Findings", "handle": "findings" }
                    ],
                    "pageInfo": { "hasNextPage": false, "endCursor": null }
                }}
            })))
            .mount(server)
            .await;
    }

    async fn mount_description(server: &MockServer, id: u64, html: Option<&str>) {
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "operationName": "CollectionDescription",
                "variables": { "id": format!("gid://shopify/Collection/{id}") }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "collection": {
                    "id": format!("gid://shopify/Collection/{id}"),
                    "title": "Any",
                    "handle": "any",
                    "descriptionHtml": html
                }}
            })))
            .mount(server)
            .await;
    }

    fn write_catalog(path: &Path, entries: &[CollectionEntry]) {
        std::fs::write(path, serde_json::to_string(entries).unwrap()).unwrap();
    }

    #[test]
    fn test_merge_new_keeps_existing_entries() {
        let mut catalog = vec![entry(1, "Beads", "beads")];
        let added = merge_new(
            &mut catalog,
            vec![entry(1, "Beads (renamed)", "beads"), entry(2, "Findings", "findings")],
        );
        assert_eq!(added, vec![entry(2, "Findings", "findings")]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].title, "Beads");
    }

    #[tokio::test]
    async fn test_sync_appends_only_new_handles() {
        let server = MockServer::start().await;
        mount_collections(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections.json");
        write_catalog(&path, &[entry(1, "Beads", "beads")]);

        let service = CollectionService::new(test_client(&server), 250);
        let options = CollectionSyncOptions {
            catalog: path.clone(),
            replace: false,
        };
        let report = service.sync(&driver(), &options).await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.total, 2);
        assert!(report.written);
        assert_eq!(report.counts.processed, 2);

        let saved: Vec<CollectionEntry> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved[0].title, "Beads");
        assert_eq!(saved[1].handle, "findings");

        let again = service.sync(&driver(), &options).await.unwrap();
        assert!(again.added.is_empty());
        assert!(!again.written);
    }

    #[tokio::test]
    async fn test_sync_replace_drops_missing_handles() {
        let server = MockServer::start().await;
        mount_collections(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections.json");
        write_catalog(&path, &[entry(1, "Beads", "beads"), entry(9, "Retired", "retired")]);

        let report = CollectionService::new(test_client(&server), 250)
            .sync(
                &driver(),
                &CollectionSyncOptions {
                    catalog: path.clone(),
                    replace: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.added, vec![entry(2, "Findings", "findings")]);
        let saved: Vec<CollectionEntry> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, vec![entry(1, "Beads (renamed)", "beads"), entry(2, "Findings", "findings")]);
    }

    #[tokio::test]
    async fn test_pull_classifies_each_collection() {
        let server = MockServer::start().await;
        mount_description(&server, 1, Some("<p>Beads.</p>")).await;
        mount_description(&server, 2, Some("<p>Findings.</p>")).await;
        mount_description(&server, 3, Some("<p>New clasps.</p>")).await;
        mount_description(&server, 4, None).await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "variables": { "id": "gid://shopify/Collection/5" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "collection": null }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("collections.json");
        write_catalog(
            &catalog,
            &[
                entry(1, "Beads", "beads"),
                entry(2, "Findings", "findings"),
                entry(3, "Clasps", "clasps"),
                entry(4, "Chain", "chain"),
                entry(5, "Gone", "gone"),
            ],
        );
        let out = dir.path().join("descriptions");
        std::fs::create_dir_all(out.join("beads")).unwrap();
        std::fs::write(out.join("beads").join(DESCRIPTION_FILE), "<p>Beads.</p>").unwrap();
        std::fs::create_dir_all(out.join("clasps")).unwrap();
        std::fs::write(out.join("clasps").join(DESCRIPTION_FILE), "<p>Old clasps.</p>").unwrap();

        let report = CollectionService::new(test_client(&server), 250)
            .pull_descriptions(
                &driver(),
                &DescriptionPullOptions {
                    catalog,
                    dir: out.clone(),
                },
            )
            .await
            .unwrap();

        let statuses: Vec<DescriptionStatus> =
            report.collections.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                DescriptionStatus::Unchanged,
                DescriptionStatus::New,
                DescriptionStatus::Updated,
                DescriptionStatus::Empty,
                DescriptionStatus::Failed,
            ]
        );
        assert_eq!(
            (report.new, report.updated, report.unchanged, report.empty, report.failed),
            (1, 1, 1, 1, 1)
        );
        assert!(report.collections[4].error.as_deref().unwrap().starts_with("Not found"));
        assert_eq!(
            std::fs::read_to_string(out.join("findings").join(DESCRIPTION_FILE)).unwrap(),
            "<p>Findings.</p>"
        );
        assert!(!out.join("chain").exists());
    }

    #[tokio::test]
    async fn test_pull_without_catalog_is_an_argument_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = CollectionService::new(test_client(&server), 250)
            .pull_descriptions(
                &driver(),
                &DescriptionPullOptions {
                    catalog: dir.path().join("missing.json"),
                    dir: dir.path().join("descriptions"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidArgument(_)));
    }

    #[test]
    fn test_handles_that_escape_the_directory_are_unsafe() {
        assert!(is_safe_segment("gemstone-beads"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment(""));
    }

    #[tokio::test]
    async fn test_push_writes_once_and_reports_unchanged_after() {
        let server = MockServer::start().await;
        mount_description(&server, 7, Some("<p>Sterling chain.</p>")).await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "operationName": "UpdateCollectionDescription" })))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("description.html");
        std::fs::write(&file, "<p>Sterling chain.</p>").unwrap();

        let service = CollectionService::new(test_client(&server), 250);
        let report = service
            .push_description(
                &driver(),
                &DescriptionPushOptions {
                    collection: CollectionGid::new(7),
                    file: file.clone(),
                    dry_run: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(report.result, Some(ItemResult::Unchanged));

        let dry = service
            .push_description(
                &driver(),
                &DescriptionPushOptions {
                    collection: CollectionGid::new(7),
                    file,
                    dry_run: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(dry.result, None);
        assert_eq!(dry.bytes, "<p>Sterling chain.</p>".len());
    }

    #[tokio::test]
    async fn test_push_surfaces_user_errors_as_failed() {
        let server = MockServer::start().await;
        mount_description(&server, 7, None).await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "operationName": "UpdateCollectionDescription" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "collectionUpdate": {
                    "collection": null,
                    "userErrors": [{ "field": ["input", "descriptionHtml"], "message": "is invalid" }]
                }}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chain.html");
        std::fs::write(&file, "<p>Chain</p>").unwrap();

        let report = CollectionService::new(test_client(&server), 250)
            .push_description(
                &driver(),
                &DescriptionPushOptions {
                    collection: CollectionGid::new(7),
                    file,
                    dry_run: false,
                },
            )
            .await
            .unwrap();
        assert!(matches!(report.result, Some(ItemResult::Failed(ref e)) if e.contains("is invalid")));
    }
}
