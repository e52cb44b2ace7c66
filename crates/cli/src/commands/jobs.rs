//! Jobs that write to the store or keep local copies of it.
//!
//! Each job writes its results file even when some items failed, then exits
//! non-zero if it was interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::{info, warn};

use catalog_ops_admin::claude::ClaudeClient;
use catalog_ops_admin::error::JobError;
use catalog_ops_admin::pipeline::ItemResult;
use catalog_ops_admin::services::import::columns;
use catalog_ops_admin::services::{
    BlogJobOptions, BlogService, CollectionService, CollectionSyncOptions, DescriptionPullOptions,
    DescriptionPushOptions, ImportJobOptions, ImportService, LinkJobOptions, LinkService,
    SeoJobOptions, SeoService,
};

use super::{Context, ensure_not_cancelled, parse_collection, write_json};

#[derive(Debug, Args)]
pub struct SeoArgs {
    /// Collection to process (numeric id or GID)
    pub collection: String,

    /// Maximum products to update
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Generate metadata without writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Results path
    #[arg(long, default_value = "reports/seo.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct BlogArgs {
    /// Directory of HTML files
    #[arg(long, default_value = "htmls")]
    pub dir: PathBuf,

    /// Blog title; created when missing
    #[arg(long, default_value = "Blog")]
    pub blog: String,

    /// Article author (defaults to BRAND_NAME)
    #[arg(long)]
    pub author: Option<String>,

    /// Create articles even when the handle already exists
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Results path
    #[arg(long, default_value = "reports/blog_results.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Sheet export (JSON array or CSV)
    #[arg(long)]
    pub input: PathBuf,

    /// Directory holding one image folder per product
    #[arg(long)]
    pub image_root: Option<PathBuf>,

    /// Column whose value starts a new product
    #[arg(long, default_value = columns::GEMSTONE_NAME)]
    pub group_column: String,

    /// Print payloads without creating anything
    #[arg(long)]
    pub dry_run: bool,

    /// Results path
    #[arg(long, default_value = "reports/import.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    /// Collection to process (numeric id or GID)
    #[arg(long)]
    pub collection: String,

    /// Word to link; repeat for several
    #[arg(long = "word", required = true)]
    pub words: Vec<String>,

    /// Link target
    #[arg(long)]
    pub url: String,

    /// Compute changes without writing them
    #[arg(long)]
    pub dry_run: bool,

    /// Results path
    #[arg(long, default_value = "reports/links.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct SyncCollectionsArgs {
    /// Catalog file
    #[arg(long, default_value = "collections.json")]
    pub catalog: PathBuf,

    /// Replace the catalog instead of adding new collections only
    #[arg(long)]
    pub replace: bool,

    /// Results path
    #[arg(long, default_value = "reports/collections.json")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct CollectionDescriptionArgs {
    #[command(subcommand)]
    pub action: DescriptionAction,
}

#[derive(Debug, Subcommand)]
pub enum DescriptionAction {
    /// Save every catalog collection's description under <dir>/<handle>/description.html
    Pull {
        /// Catalog file
        #[arg(long, default_value = "collections.json")]
        catalog: PathBuf,

        /// Directory receiving the description files
        #[arg(long, default_value = "descriptions")]
        dir: PathBuf,

        /// Results path
        #[arg(long, default_value = "reports/descriptions.json")]
        output: PathBuf,
    },
    /// Upload an HTML file as a collection's description
    Push {
        /// Collection to update (numeric id or GID)
        #[arg(long)]
        collection: String,

        /// HTML file
        #[arg(long)]
        file: PathBuf,

        /// Check the file without writing
        #[arg(long)]
        dry_run: bool,

        /// Results path
        #[arg(long, default_value = "reports/description_push.json")]
        output: PathBuf,
    },
}

/// Fill in missing collection and product SEO.
pub async fn seo(ctx: &Context, args: SeoArgs) -> Result<(), JobError> {
    let claude = ClaudeClient::new(ctx.config.require_claude()?)?;
    let service = SeoService::new(
        ctx.client.clone(),
        Arc::new(claude),
        ctx.config.brand_name.clone(),
        ctx.config.pipeline.page_size,
    );
    let options = SeoJobOptions {
        collection: parse_collection(&args.collection)?,
        limit: args.limit,
        dry_run: args.dry_run,
    };

    let report = service.run(&ctx.driver(), &options).await?;
    write_json(&args.output, &report).await?;

    if report.summary.failed > 0 {
        warn!(failed = report.summary.failed, "Some products were not updated");
    }
    info!(
        path = %args.output.display(),
        updated = report.summary.written,
        unchanged = report.summary.unchanged,
        failed = report.summary.failed,
        "SEO job finished"
    );
    ensure_not_cancelled(report.cancelled)
}

/// Publish HTML files as articles.
pub async fn blog(ctx: &Context, args: BlogArgs) -> Result<(), JobError> {
    let author = args
        .author
        .unwrap_or_else(|| ctx.config.brand_name.clone());
    let service = BlogService::new(ctx.client.clone(), author);
    let options = BlogJobOptions {
        dir: args.dir,
        blog_title: args.blog,
        skip_existing: !args.no_skip_existing,
    };

    let report = service.run(&ctx.driver(), &options).await?;
    write_json(&args.output, &report).await?;

    for entry in &report.failed {
        warn!(file = %entry.file, reason = entry.reason.as_deref().unwrap_or("unknown"), "Article failed");
    }
    info!(path = %args.output.display(), "Results saved");
    ensure_not_cancelled(report.cancelled)
}

/// Create products from a sheet.
pub async fn import(ctx: &Context, args: ImportArgs) -> Result<(), JobError> {
    let service = ImportService::new(ctx.client.clone());
    let options = ImportJobOptions {
        input: args.input,
        image_root: args.image_root,
        group_column: args.group_column,
        dry_run: args.dry_run,
    };

    let report = service.run(&ctx.driver(), &options).await?;

    if report.dry_run {
        #[allow(clippy::print_stdout)]
        for entry in &report.products {
            if let Some(payload) = &entry.payload {
                println!("{}", serde_json::to_string_pretty(payload).unwrap_or_default());
            }
        }
    }

    write_json(&args.output, &report).await?;
    info!(path = %args.output.display(), "Results saved");
    ensure_not_cancelled(report.cancelled)
}

/// Link words across a collection.
pub async fn link(ctx: &Context, args: LinkArgs) -> Result<(), JobError> {
    let service = LinkService::new(ctx.client.clone(), ctx.config.pipeline.page_size);
    let options = LinkJobOptions {
        collection: parse_collection(&args.collection)?,
        words: args.words,
        url: args.url,
        dry_run: args.dry_run,
    };

    let report = service.run(&ctx.driver(), &options).await?;
    write_json(&args.output, &report).await?;

    info!(
        path = %args.output.display(),
        updated = report.summary.written,
        failed = report.summary.failed,
        "Link job finished"
    );
    ensure_not_cancelled(report.cancelled)
}

/// Bring the collection catalog up to date.
pub async fn sync_collections(ctx: &Context, args: SyncCollectionsArgs) -> Result<(), JobError> {
    let service = CollectionService::new(ctx.client.clone(), ctx.config.pipeline.page_size);
    let options = CollectionSyncOptions {
        catalog: args.catalog,
        replace: args.replace,
    };

    let report = service.sync(&ctx.driver(), &options).await?;
    write_json(&args.output, &report).await?;

    info!(
        path = %args.output.display(),
        fetched = report.fetched,
        added = report.added.len(),
        removed = report.removed,
        total = report.total,
        "Collection catalog synced"
    );
    Ok(())
}

/// Pull or push collection descriptions.
pub async fn collection_description(
    ctx: &Context,
    args: CollectionDescriptionArgs,
) -> Result<(), JobError> {
    let service = CollectionService::new(ctx.client.clone(), ctx.config.pipeline.page_size);

    match args.action {
        DescriptionAction::Pull {
            catalog,
            dir,
            output,
        } => {
            let report = service
                .pull_descriptions(&ctx.driver(), &DescriptionPullOptions { catalog, dir })
                .await?;
            write_json(&output, &report).await?;

            if report.failed > 0 {
                warn!(failed = report.failed, "Some descriptions were not saved");
            }
            info!(path = %output.display(), "Results saved");
            ensure_not_cancelled(report.cancelled)
        }
        DescriptionAction::Push {
            collection,
            file,
            dry_run,
            output,
        } => {
            let options = DescriptionPushOptions {
                collection: parse_collection(&collection)?,
                file,
                dry_run,
            };
            let report = service.push_description(&ctx.driver(), &options).await?;
            write_json(&output, &report).await?;

            match &report.result {
                Some(ItemResult::Written) => info!(bytes = report.bytes, "Description updated"),
                Some(ItemResult::Unchanged) => info!("Description already current"),
                Some(ItemResult::Failed(error)) => {
                    warn!(%error, "Description not updated");
                }
                None => {}
            }
            ensure_not_cancelled(report.cancelled)
        }
    }
}
