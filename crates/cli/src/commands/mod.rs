//! CLI commands.
//!
//! - `reports` - Read-only catalog reports (`inventory`, `images`, `match`)
//! - `jobs` - Jobs that write to the store (`seo`, `blog`, `import`, `link`)

pub mod jobs;
pub mod reports;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use catalog_ops_admin::config::CatalogConfig;
use catalog_ops_admin::error::JobError;
use catalog_ops_admin::pipeline::fetcher::CatalogScope;
use catalog_ops_admin::pipeline::sink::JsonFileSink;
use catalog_ops_admin::pipeline::{CancelFlag, PipelineDriver, RunReport, Sink};
use catalog_ops_admin::shopify::AdminClient;
use catalog_ops_core::{CollectionGid, FailureKind, RunOutcome};

/// Shared state for one CLI invocation.
pub struct Context {
    pub config: CatalogConfig,
    pub client: AdminClient,
    pub cancel: CancelFlag,
}

impl Context {
    /// Build the Admin client from configuration.
    pub fn new(config: CatalogConfig) -> Result<Self, JobError> {
        let client = AdminClient::new(&config.shopify)?;
        Ok(Self {
            config,
            client,
            cancel: CancelFlag::new(),
        })
    }

    /// Request cancellation when Ctrl-C is pressed.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping at the next page boundary");
                cancel.cancel();
            }
        });
    }

    /// A driver configured from the environment and observing Ctrl-C.
    pub fn driver(&self) -> PipelineDriver {
        PipelineDriver::from_config(&self.config.pipeline).with_cancel_flag(self.cancel.clone())
    }
}

/// Accept a numeric collection id or a full GID.
pub fn parse_collection(raw: &str) -> Result<CollectionGid, JobError> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<u64>() {
        return Ok(CollectionGid::new(id));
    }
    CollectionGid::parse(raw).map_err(|e| JobError::InvalidArgument(format!("collection {raw}: {e}")))
}

/// Which part of the catalog to read.
pub fn catalog_scope(collection: Option<&str>, search: Option<&str>) -> Result<CatalogScope, JobError> {
    match (collection, search) {
        (Some(_), Some(_)) => Err(JobError::InvalidArgument(
            "--collection and --search are mutually exclusive".to_string(),
        )),
        (Some(collection), None) => Ok(CatalogScope::Collection(parse_collection(collection)?)),
        (None, Some(query)) => Ok(CatalogScope::Search(query.to_string())),
        (None, None) => Ok(CatalogScope::All),
    }
}

/// `reports/inventory.json` → `reports/inventory.partial.json`.
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "report".into(), |s| s.to_string_lossy().into_owned());
    let name = match path.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    path.with_file_name(name)
}

/// Write a report as JSON.
pub async fn write_json<R: Serialize + Sync>(path: &Path, report: &R) -> Result<(), JobError> {
    JsonFileSink::new(path).write(report).await?;
    Ok(())
}

/// Turn a finished run into its report.
///
/// An aborted run with a partial report is written next to `output`
/// together with its counts and failure before the failure is returned.
pub async fn finish_run<R: Serialize + Sync>(
    run: RunReport<R>,
    output: &Path,
) -> Result<R, JobError> {
    info!(
        run_id = %run.run_id,
        processed = run.counts.processed,
        skipped = run.counts.skipped,
        failed = run.counts.failed,
        pages = run.counts.pages,
        "Run finished"
    );

    let (kind, message) = match &run.outcome {
        RunOutcome::Completed => {
            info!(path = %output.display(), "Report written");
            return run.report.ok_or_else(|| JobError::Pipeline {
                kind: FailureKind::Fatal,
                message: "run completed without a report".to_string(),
            });
        }
        RunOutcome::Aborted { kind, message } => (*kind, message.clone()),
    };

    if run.report.is_some() {
        let path = partial_path(output);
        match write_json(&path, &run).await {
            Ok(()) => warn!(path = %path.display(), "Run aborted, partial report written"),
            Err(e) => warn!(error = %e, "Run aborted and the partial report could not be written"),
        }
    }
    Err(JobError::Pipeline { kind, message })
}

/// Fail the command when a write pass stopped early.
pub fn ensure_not_cancelled(cancelled: bool) -> Result<(), JobError> {
    if cancelled {
        return Err(JobError::Pipeline {
            kind: FailureKind::Cancelled,
            message: "interrupted before every item was written".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection() {
        assert_eq!(parse_collection(" 42 ").unwrap(), CollectionGid::new(42));
        assert_eq!(
            parse_collection("gid://shopify/Collection/42").unwrap(),
            CollectionGid::new(42)
        );
        assert!(matches!(
            parse_collection("gid://shopify/Product/42"),
            Err(JobError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_catalog_scope() {
        assert_eq!(catalog_scope(None, None).unwrap(), CatalogScope::All);
        assert_eq!(
            catalog_scope(None, Some("vendor:Acme")).unwrap(),
            CatalogScope::Search("vendor:Acme".to_string())
        );
        assert!(catalog_scope(Some("1"), Some("x")).is_err());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("reports/inventory.json")),
            PathBuf::from("reports/inventory.partial.json")
        );
        assert_eq!(partial_path(Path::new("out")), PathBuf::from("out.partial"));
    }

    #[tokio::test]
    async fn test_aborted_run_writes_partial_with_counts() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("inventory.json");
        let run = RunReport {
            run_id: uuid::Uuid::new_v4(),
            outcome: RunOutcome::Aborted {
                kind: FailureKind::Transient,
                message: "HTTP 503 after 3 attempts".to_string(),
            },
            counts: catalog_ops_core::RunCounts {
                processed: 40,
                skipped: 2,
                failed: 0,
                pages: 2,
            },
            report: Some(serde_json::json!({ "record_count": 40 })),
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
        };

        let err = finish_run(run, &output).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::Pipeline {
                kind: FailureKind::Transient,
                ..
            }
        ));
        assert!(!output.exists());

        let partial: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("inventory.partial.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(partial["outcome"]["status"], "aborted");
        assert_eq!(partial["outcome"]["kind"], "transient");
        assert_eq!(partial["outcome"]["message"], "HTTP 503 after 3 attempts");
        assert_eq!(partial["counts"]["processed"], 40);
        assert_eq!(partial["counts"]["skipped"], 2);
        assert_eq!(partial["report"]["record_count"], 40);
    }
}
