//! Batch jobs built on the pipeline.
//!
//! # Services
//!
//! - `seo` - Collection and product SEO generation and write-back
//! - `blog` - Publish a directory of HTML files as blog articles
//! - `import` - Create products from grouped spreadsheet rows
//! - `links` - Add internal links to product descriptions
//! - `collections` - Collection catalog sync and description files
//! - `html` - Text helpers shared by the jobs above

pub mod blog;
pub mod collections;
pub mod html;
pub mod import;
pub mod links;
pub mod seo;

pub use blog::{BlogJobOptions, BlogMigrationReport, BlogService};
pub use collections::{
    CollectionService, CollectionSyncOptions, CollectionSyncReport, DescriptionPullOptions,
    DescriptionPullReport, DescriptionPushOptions, DescriptionPushReport,
};
pub use import::{ImportJobOptions, ImportReport, ImportService};
pub use links::{LinkJobOptions, LinkReport, LinkService};
pub use seo::{SeoJobOptions, SeoJobReport, SeoService};

use catalog_ops_core::{FailureKind, RunCounts, RunOutcome};

use crate::error::JobError;
use crate::pipeline::RunReport;

/// The report and counts of a completed run, or the reason it aborted.
///
/// Jobs that act on a scan need the whole scan, so partial reports are dropped.
pub(crate) fn completed_report<R>(run: RunReport<R>) -> Result<(R, RunCounts), JobError> {
    match (run.outcome, run.report) {
        (RunOutcome::Completed, Some(report)) => Ok((report, run.counts)),
        (RunOutcome::Completed, None) => Err(JobError::Pipeline {
            kind: FailureKind::Fatal,
            message: "run completed without a report".to_string(),
        }),
        (RunOutcome::Aborted { kind, message }, _) => Err(JobError::Pipeline { kind, message }),
    }
}
