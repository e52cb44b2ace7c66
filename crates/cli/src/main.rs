//! Catalog Ops CLI - batch jobs against a Shopify catalog.
//!
//! # Usage
//!
//! ```bash
//! # Stock risk report for the whole store
//! catalog-cli inventory --output reports/inventory.json
//!
//! # Image metadata for one collection, as JSON and CSV
//! catalog-cli images --collection 286924505178 --csv reports/images.csv
//!
//! # Match offline sheet titles to online products
//! catalog-cli match --input offline.csv --min-score 0.9
//!
//! # Fill in missing SEO for up to 20 products of a collection
//! catalog-cli seo 286924505178 --limit 20
//!
//! # Publish HTML files as blog articles
//! catalog-cli blog --dir htmls --blog "Journal"
//!
//! # Create products from a sheet export without writing
//! catalog-cli import --input products.json --image-root photos --dry-run
//!
//! # Link a keyword across a collection's descriptions
//! catalog-cli link --collection 286924505178 --word amethyst --url /collections/amethyst
//!
//! # Add new store collections to collections.json
//! catalog-cli sync-collections --catalog collections.json
//!
//! # Save collection descriptions, then upload one edited file
//! catalog-cli collection-description pull --dir descriptions
//! catalog-cli collection-description push --collection 286924505178 --file descriptions/beads/description.html
//! ```
//!
//! Ctrl-C stops a run at the next page boundary; partial reports are written
//! next to the requested output with a `.partial` suffix where the report
//! allows it.
//!
//! # Environment Variables
//!
//! See `catalog_ops_admin::config`. `RUST_LOG` controls verbosity and
//! `LOG_FORMAT=json` switches to JSON logs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_ops_admin::config::CatalogConfig;
use catalog_ops_admin::error::JobError;

mod commands;

use commands::Context;
use commands::jobs::{
    BlogArgs, CollectionDescriptionArgs, ImportArgs, LinkArgs, SeoArgs, SyncCollectionsArgs,
};
use commands::reports::{ImagesArgs, InventoryArgs, MatchArgs};

#[derive(Parser)]
#[command(name = "catalog-cli")]
#[command(author, version, about = "Catalog Ops batch jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report stock risk buckets and quantity statistics
    Inventory(InventoryArgs),
    /// Export image metadata and list products without images
    Images(ImagesArgs),
    /// Match offline titles to online products
    Match(MatchArgs),
    /// Generate and write missing SEO metadata for a collection
    Seo(SeoArgs),
    /// Publish a directory of HTML files as blog articles
    Blog(BlogArgs),
    /// Create products from grouped spreadsheet rows
    Import(ImportArgs),
    /// Add internal links to a collection's product descriptions
    Link(LinkArgs),
    /// Save the store's collections to a catalog file
    SyncCollections(SyncCollectionsArgs),
    /// Pull collection descriptions to files or push one back
    CollectionDescription(CollectionDescriptionArgs),
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CatalogConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "catalog_ops_admin=info,catalog_ops_cli=info".into());

    let is_json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let json_layer = is_json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = CatalogConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(JobError::from(e)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.capture();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: CatalogConfig) -> Result<(), JobError> {
    let ctx = Context::new(config)?;
    ctx.cancel_on_ctrl_c();

    match cli.command {
        Commands::Inventory(args) => commands::reports::inventory(&ctx, args).await,
        Commands::Images(args) => commands::reports::images(&ctx, args).await,
        Commands::Match(args) => commands::reports::match_titles(&ctx, args).await,
        Commands::Seo(args) => commands::jobs::seo(&ctx, args).await,
        Commands::Blog(args) => commands::jobs::blog(&ctx, args).await,
        Commands::Import(args) => commands::jobs::import(&ctx, args).await,
        Commands::Link(args) => commands::jobs::link(&ctx, args).await,
        Commands::SyncCollections(args) => commands::jobs::sync_collections(&ctx, args).await,
        Commands::CollectionDescription(args) => {
            commands::jobs::collection_description(&ctx, args).await
        }
    }
}
