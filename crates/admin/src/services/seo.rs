//! SEO metadata automation for a collection and its products.
//!
//! The job fills in collection SEO when it is incomplete, scans the
//! collection's products for missing SEO with [`SeoGapReducer`], generates
//! metadata for each gap and writes it back through [`ProductSeoSink`].
//! When generation fails the product gets deterministic fallback metadata.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use catalog_ops_core::{CollectionGid, ProductGid, RunCounts, SeoMetadata};

use crate::claude::{ClaudeError, TextGenerator};
use crate::error::{JobError, Result};
use crate::pipeline::fetcher::{CatalogScope, RecordShape, ShopifyCatalogFetcher};
use crate::pipeline::normalize::ProductNormalizer;
use crate::pipeline::reducers::{SeoCandidate, SeoGapReducer};
use crate::pipeline::sink::{DiscardSink, ProductSeoSink, SeoUpdate};
use crate::pipeline::{ApplySummary, ItemResult, PipelineDriver};
use crate::shopify::{AdminClient, CollectionSeo};

use super::completed_report;
use super::html::text_content;

/// Characters of existing description included in a prompt.
const PROMPT_DESCRIPTION_CHARS: usize = 500;

const REQUIREMENTS: &str = "\
1. Title tag: 50-60 characters, compelling and keyword-rich
2. Meta description: 150-160 characters, persuasive and includes call-to-action
3. CRITICAL: Write ONLY complete sentences that end with proper punctuation (. ! ?)
4. NEVER cut off words or sentences mid-way
5. If you cannot fit a complete sentence within 160 characters, write a shorter but complete sentence
6. Ensure the description ends with a period, exclamation mark, or question mark";

const OUTPUT_FORMAT: &str = "\
Return ONLY a JSON object with this exact format:
{\"title\": \"your title here\", \"description\": \"your description here\"}";

/// Where a piece of metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeoSource {
    /// Text generator output.
    Generated,
    /// Deterministic fallback after a generation failure.
    Fallback,
}

#[derive(Debug, Deserialize)]
struct GeneratedSeo {
    title: String,
    description: String,
}

fn first_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Prompt asking for product SEO.
#[must_use]
pub fn product_prompt(candidate: &SeoCandidate, brand_name: &str) -> String {
    let description = candidate
        .description_html
        .as_deref()
        .map(text_content)
        .filter(|d| !d.is_empty())
        .map_or_else(|| "N/A".to_string(), |d| first_chars(&d, PROMPT_DESCRIPTION_CHARS));

    format!(
        "Generate SEO-optimized metadata for this Shopify product:\n\n\
         Product Title: {title}\n\
         Product Type: {product_type}\n\
         Vendor: {vendor}\n\
         Tags: {tags}\n\
         Description: {description}\n\n\
         Requirements:\n{REQUIREMENTS}\n\
         7. Include the \"{brand_name}\" brand name when appropriate\n\n\
         {OUTPUT_FORMAT}",
        title = candidate.title,
        product_type = candidate.product_type.as_deref().unwrap_or("N/A"),
        vendor = candidate.vendor.as_deref().unwrap_or(brand_name),
        tags = candidate.tags.as_deref().unwrap_or(""),
    )
}

/// Prompt asking for collection SEO.
#[must_use]
pub fn collection_prompt(collection: &CollectionSeo, brand_name: &str) -> String {
    let description = Some(text_content(&collection.description))
        .filter(|d| !d.is_empty())
        .map_or_else(|| "N/A".to_string(), |d| first_chars(&d, PROMPT_DESCRIPTION_CHARS));

    format!(
        "Generate SEO-optimized metadata for this Shopify collection:\n\n\
         Collection Title: {title}\n\
         Collection Handle: {handle}\n\
         Description: {description}\n\n\
         Requirements:\n{REQUIREMENTS}\n\
         7. Focus on collection-specific keywords\n\
         8. Include the \"{brand_name}\" brand name when appropriate\n\n\
         {OUTPUT_FORMAT}",
        title = collection.title,
        handle = collection.handle,
    )
}

/// Body of the first markdown code fence, or the whole reply.
fn strip_code_fence(reply: &str) -> &str {
    let reply = reply.trim();
    let (marker, start) = if let Some(i) = reply.find("```json") {
        ("```json", i)
    } else if let Some(i) = reply.find("```") {
        ("```", i)
    } else {
        return reply;
    };

    let body_start = start + marker.len();
    let body = reply.get(body_start..).unwrap_or_default();
    body.find("```")
        .and_then(|end| body.get(..end))
        .unwrap_or(body)
        .trim()
}

/// Parse a generator reply into clamped metadata.
///
/// # Errors
///
/// Returns `ClaudeError::UnusableText` when the reply holds no `{title, description}` object.
pub fn parse_generated(reply: &str) -> std::result::Result<SeoMetadata, ClaudeError> {
    let body = strip_code_fence(reply);
    let parsed: GeneratedSeo = serde_json::from_str(body)
        .or_else(|first_err| {
            // Replies sometimes wrap the object in prose.
            let start = body.find('{');
            let end = body.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if start < end => body
                    .get(start..=end)
                    .map_or(Err(first_err), serde_json::from_str),
                _ => Err(first_err),
            }
        })
        .map_err(|e| ClaudeError::UnusableText(e.to_string()))?;

    Ok(SeoMetadata::clamped(&parsed.title, &parsed.description))
}

/// Deterministic collection metadata.
#[must_use]
pub fn collection_fallback(title: &str, description: &str, brand_name: &str) -> SeoMetadata {
    let mut text = format!("Shop {title} online. High-quality products from {brand_name}. ");
    let snippet = first_chars(&text_content(description), 80);
    text.push_str(snippet.trim());
    text.push_str(" Order now!");

    SeoMetadata::clamped(&format!("{title} | {brand_name}"), &text)
}

/// What happened to the collection's own SEO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionSeoAction {
    /// Title and description were already set.
    AlreadyComplete,
    /// New metadata was computed and written (or would be, in a dry run).
    Updated {
        /// Computed metadata.
        seo: SeoMetadata,
        /// Where it came from.
        source: SeoSource,
    },
    /// Writing failed.
    Failed {
        /// Cause.
        error: String,
    },
}

/// Outcome for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSeoOutcome {
    /// Product id.
    pub id: String,
    /// Product title.
    pub title: String,
    /// Computed metadata.
    pub seo: SeoMetadata,
    /// Where it came from.
    pub source: SeoSource,
    /// Quality issues that remain after clamping.
    pub issues: Vec<String>,
    /// Write result; absent in a dry run or when the pass was cancelled first.
    pub result: Option<ItemResult>,
}

/// Report for one SEO job.
#[derive(Debug, Clone, Serialize)]
pub struct SeoJobReport {
    /// Collection processed.
    pub collection_id: String,
    /// Collection title.
    pub collection_title: String,
    /// What happened to the collection's SEO.
    pub collection: CollectionSeoAction,
    /// Products scanned.
    pub scanned: usize,
    /// Products missing SEO, including those past the limit.
    pub missing: usize,
    /// Per-product outcomes.
    pub products: Vec<ProductSeoOutcome>,
    /// Write tally.
    pub summary: ApplySummary,
    /// Scan counts; `failed` counts products whose write failed.
    pub counts: RunCounts,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Whether the write pass stopped early.
    pub cancelled: bool,
}

/// Options for [`SeoService::run`].
#[derive(Debug, Clone)]
pub struct SeoJobOptions {
    /// Collection to process.
    pub collection: CollectionGid,
    /// Maximum products to update.
    pub limit: usize,
    /// Compute without writing.
    pub dry_run: bool,
}

/// Generates and writes SEO metadata.
pub struct SeoService {
    client: AdminClient,
    generator: Arc<dyn TextGenerator>,
    brand_name: String,
    page_size: u32,
}

impl SeoService {
    /// Create the service.
    #[must_use]
    pub fn new(
        client: AdminClient,
        generator: Arc<dyn TextGenerator>,
        brand_name: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            generator,
            brand_name: brand_name.into(),
            page_size,
        }
    }

    /// Metadata for one product, falling back when generation fails.
    pub async fn product_seo(&self, candidate: &SeoCandidate) -> (SeoMetadata, SeoSource) {
        let prompt = product_prompt(candidate, &self.brand_name);
        match self.generate(&prompt).await {
            Ok(seo) => (seo, SeoSource::Generated),
            Err(error) => {
                warn!(
                    product_id = %candidate.id,
                    %error,
                    retryable = error.is_retryable(),
                    "SEO generation failed, using fallback"
                );
                let body = candidate.description_html.as_deref().map(text_content);
                let seo = SeoMetadata::fallback(
                    &candidate.title,
                    candidate.product_type.as_deref(),
                    candidate.vendor.as_deref().unwrap_or(&self.brand_name),
                    body.as_deref().filter(|b| !b.is_empty()),
                );
                (seo, SeoSource::Fallback)
            }
        }
    }

    /// Metadata for a collection, falling back when generation fails.
    pub async fn collection_seo(&self, collection: &CollectionSeo) -> (SeoMetadata, SeoSource) {
        let prompt = collection_prompt(collection, &self.brand_name);
        match self.generate(&prompt).await {
            Ok(seo) => (seo, SeoSource::Generated),
            Err(error) => {
                warn!(
                    collection_id = %collection.id,
                    %error,
                    retryable = error.is_retryable(),
                    "SEO generation failed, using fallback"
                );
                let seo = collection_fallback(
                    &collection.title,
                    &collection.description,
                    &self.brand_name,
                );
                (seo, SeoSource::Fallback)
            }
        }
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<SeoMetadata, ClaudeError> {
        let reply = self.generator.generate(prompt).await?;
        parse_generated(&reply)
    }

    /// Run the job for one collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or the product scan aborts.
    #[instrument(skip(self, driver, options), fields(collection_id = %options.collection))]
    pub async fn run(
        &self,
        driver: &PipelineDriver,
        options: &SeoJobOptions,
    ) -> Result<SeoJobReport> {
        let collection = self.client.get_collection_seo(&options.collection).await?;
        info!(
            title = %collection.title,
            has_title = collection.seo.title.is_some(),
            has_description = collection.seo.description.is_some(),
            "Collection loaded"
        );

        let collection_action = self
            .ensure_collection_seo(&options.collection, &collection, options.dry_run)
            .await;

        let mut fetcher = ShopifyCatalogFetcher::new(
            self.client.clone(),
            CatalogScope::Collection(options.collection.clone()),
            RecordShape::Product,
            self.page_size,
        );
        let reducer = SeoGapReducer {
            limit: options.limit,
        };
        let (scan, mut counts) = completed_report(
            driver
                .run(&mut fetcher, &ProductNormalizer, &reducer, &DiscardSink)
                .await,
        )?;
        info!(
            scanned = scan.scanned,
            missing = scan.missing,
            selected = scan.candidates.len(),
            "SEO gap scan finished"
        );

        let mut products = Vec::with_capacity(scan.candidates.len());
        let mut updates = Vec::with_capacity(scan.candidates.len());
        for (index, candidate) in scan.candidates.iter().enumerate() {
            info!(
                position = index + 1,
                total = scan.candidates.len(),
                title = %candidate.title,
                "Generating SEO"
            );
            let (seo, source) = self.product_seo(candidate).await;
            let issues: Vec<String> = seo.issues().iter().map(ToString::to_string).collect();
            if !issues.is_empty() {
                warn!(product_id = %candidate.id, issues = %issues.join("; "), "Metadata has quality issues");
            }

            match ProductGid::parse(&candidate.id) {
                Ok(product) => updates.push(SeoUpdate {
                    product,
                    title: candidate.title.clone(),
                    current_title: candidate.seo_title.clone(),
                    current_description: candidate.seo_description.clone(),
                    seo: seo.clone(),
                }),
                Err(error) => {
                    return Err(JobError::InvalidArgument(format!(
                        "product id {}: {error}",
                        candidate.id
                    )));
                }
            }

            products.push(ProductSeoOutcome {
                id: candidate.id.clone(),
                title: candidate.title.clone(),
                seo,
                source,
                issues,
                result: None,
            });
        }

        let (summary, cancelled) = if options.dry_run {
            info!(products = updates.len(), "Dry run, nothing written");
            (ApplySummary::default(), false)
        } else {
            let applied = driver
                .apply_each(&updates, &ProductSeoSink::new(self.client.clone()))
                .await;
            for (outcome, result) in products.iter_mut().zip(applied.results.iter()) {
                outcome.result = Some(result.clone());
            }
            (applied.summary(), applied.cancelled)
        };
        counts.failed = summary.failed;

        Ok(SeoJobReport {
            collection_id: collection.id,
            collection_title: collection.title,
            collection: collection_action,
            scanned: scan.scanned,
            missing: scan.missing,
            products,
            summary,
            counts,
            dry_run: options.dry_run,
            cancelled,
        })
    }

    async fn ensure_collection_seo(
        &self,
        id: &CollectionGid,
        collection: &CollectionSeo,
        dry_run: bool,
    ) -> CollectionSeoAction {
        if !collection.seo.is_incomplete() {
            info!("Collection SEO already complete");
            return CollectionSeoAction::AlreadyComplete;
        }

        let (seo, source) = self.collection_seo(collection).await;
        if dry_run {
            return CollectionSeoAction::Updated { seo, source };
        }

        match self.client.update_collection_seo(id, &seo).await {
            Ok(()) => {
                info!(title = %seo.title, "Collection SEO updated");
                CollectionSeoAction::Updated { seo, source }
            }
            Err(error) => {
                warn!(%error, "Collection SEO update failed");
                CollectionSeoAction::Failed {
                    error: error.to_string(),
                }
            }
        }
    }
}
