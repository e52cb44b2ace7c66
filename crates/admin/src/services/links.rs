//! Internal link builder for product descriptions.
//!
//! Links the first whole-word occurrence of a keyword in the paragraphs of a
//! description's "Product Description" section.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument};

use catalog_ops_core::{CanonicalRecord, CollectionGid, ProductGid, RunCounts};

use crate::error::{JobError, Result};
use crate::pipeline::fetcher::{CatalogScope, RecordShape, ShopifyCatalogFetcher};
use crate::pipeline::normalize::{ProductNormalizer, attr};
use crate::pipeline::sink::{DescriptionSink, DescriptionUpdate, DiscardSink};
use crate::pipeline::{ApplySummary, ItemResult, PipelineDriver, Reducer};
use crate::shopify::AdminClient;

use super::completed_report;
use super::html::text_content;

/// Heading text that marks the linkable section.
const SECTION_HEADING: &str = "Product Description";

static H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h2\b[^>]*>(.*?)</h2\s*>").expect("Invalid regex"));
static H2_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h2\b").expect("Invalid regex"));
static P_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p\b[^>]*>.*?</p\s*>").expect("Invalid regex"));
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("Invalid regex"));
static ANCHOR_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<a\b").expect("Invalid regex"));
static ANCHOR_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</a\s*>").expect("Invalid regex"));
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#).expect("Invalid regex")
});

/// Result of linking one word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    /// The updated HTML.
    Linked(String),
    /// A paragraph already links the word to the URL.
    AlreadyLinked,
    /// No unlinked whole-word occurrence was found.
    NoMatch,
}

/// Byte range of the content between the section heading and the next `<h2>`.
fn section_range(html: &str) -> Option<Range<usize>> {
    let heading = H2_RE
        .captures_iter(html)
        .find(|caps| caps.get(1).is_some_and(|m| text_content(m.as_str()).contains(SECTION_HEADING)))?
        .get(0)?;

    let start = heading.end();
    let rest = html.get(start..)?;
    let end = H2_OPEN_RE.find(rest).map_or(html.len(), |m| start + m.start());
    Some(start..end)
}

/// Paragraph ranges inside the section, in document order.
fn section_paragraphs(html: &str) -> Vec<Range<usize>> {
    let Some(section) = section_range(html) else {
        return Vec::new();
    };
    let Some(body) = html.get(section.clone()) else {
        return Vec::new();
    };
    P_RE.find_iter(body)
        .map(|m| section.start + m.start()..section.start + m.end())
        .collect()
}

fn links_word(paragraph: &str, word: &str, url: &str) -> bool {
    let word = word.to_lowercase();
    ANCHOR_RE.captures_iter(paragraph).any(|caps| {
        let href_matches = caps
            .get(1)
            .and_then(|attrs| HREF_RE.captures(attrs.as_str()))
            .and_then(|href| href.get(1))
            .is_some_and(|href| href.as_str().contains(url));
        href_matches
            && caps
                .get(2)
                .is_some_and(|text| text_content(text.as_str()).to_lowercase().contains(&word))
    })
}

/// Whether the text before a match leaves us inside a tag or an anchor.
fn inside_tag_or_anchor(before: &str) -> bool {
    if before.rfind('<') > before.rfind('>') {
        return true;
    }
    ANCHOR_OPEN_RE.find_iter(before).count() > ANCHOR_CLOSE_RE.find_iter(before).count()
}

fn link_in_paragraph(paragraph: &str, word: &str, url: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"(?i)\b({})\b", regex::escape(word))).ok()?;
    let found = pattern
        .find_iter(paragraph)
        .find(|m| !inside_tag_or_anchor(paragraph.get(..m.start()).unwrap_or_default()))?;

    Some(format!(
        "{}<a href=\"{url}\">{}</a>{}",
        paragraph.get(..found.start())?,
        found.as_str(),
        paragraph.get(found.end()..)?,
    ))
}

/// Link the first unlinked whole-word occurrence of `word`.
#[must_use]
pub fn add_link(html: &str, word: &str, url: &str) -> LinkResult {
    let word = word.trim();
    if word.is_empty() {
        return LinkResult::NoMatch;
    }
    let needle = word.to_lowercase();

    for range in section_paragraphs(html) {
        let Some(paragraph) = html.get(range.clone()) else {
            continue;
        };
        if !text_content(paragraph).to_lowercase().contains(&needle) {
            continue;
        }
        if links_word(paragraph, word, url) {
            return LinkResult::AlreadyLinked;
        }
        if let Some(linked) = link_in_paragraph(paragraph, word, url) {
            let mut updated = String::with_capacity(html.len() + url.len() + 15);
            updated.push_str(html.get(..range.start).unwrap_or_default());
            updated.push_str(&linked);
            updated.push_str(html.get(range.end..).unwrap_or_default());
            return LinkResult::Linked(updated);
        }
    }
    LinkResult::NoMatch
}

/// Result of linking a list of words into one description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// At least one word was linked.
    Linked {
        /// Updated HTML.
        html: String,
        /// Words linked.
        count: usize,
    },
    /// The section already links this word to the URL; nothing changed.
    AlreadyLinked(String),
    /// No word could be linked.
    NoMatch,
}

/// Link each word in turn, unless any of them is already linked.
#[must_use]
pub fn link_words(html: &str, words: &[String], url: &str) -> LinkOutcome {
    let paragraphs = section_paragraphs(html);
    if let Some(word) = words.iter().find(|word| {
        paragraphs
            .iter()
            .filter_map(|range| html.get(range.clone()))
            .any(|p| links_word(p, word.trim(), url))
    }) {
        return LinkOutcome::AlreadyLinked(word.clone());
    }

    let mut current = html.to_string();
    let mut count = 0;
    for word in words {
        if let LinkResult::Linked(updated) = add_link(&current, word, url) {
            current = updated;
            count += 1;
        }
    }

    if count == 0 {
        LinkOutcome::NoMatch
    } else {
        LinkOutcome::Linked {
            html: current,
            count,
        }
    }
}

/// A product's description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductText {
    /// Product id.
    pub id: String,
    /// Product title.
    pub title: String,
    /// Description HTML, when present.
    pub description_html: Option<String>,
}

/// Collects every product's description.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptionCollector;

impl Reducer for DescriptionCollector {
    type State = Vec<ProductText>;
    type Report = Vec<ProductText>;

    fn init(&self) -> Vec<ProductText> {
        Vec::new()
    }

    fn fold(&self, mut state: Vec<ProductText>, record: CanonicalRecord) -> Vec<ProductText> {
        state.push(ProductText {
            description_html: record.attribute(attr::DESCRIPTION_HTML).map(str::to_string),
            id: record.id,
            title: record.title,
        });
        state
    }

    fn finalize(&self, state: Vec<ProductText>) -> Vec<ProductText> {
        state
    }

    fn supports_partial_report(&self) -> bool {
        false
    }
}

/// What happened to one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkStatus {
    /// Words were linked.
    Linked {
        /// Words linked.
        count: usize,
        /// Write result; absent in a dry run.
        result: Option<ItemResult>,
    },
    /// A word was already linked.
    AlreadyLinked {
        /// The linked word.
        word: String,
    },
    /// Nothing to link.
    NoMatch,
    /// The product has no description.
    NoDescription,
}

/// One product's entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkEntry {
    /// Product id.
    pub id: String,
    /// Product title.
    pub title: String,
    /// Outcome.
    #[serde(flatten)]
    pub status: LinkStatus,
}

/// Results of a link run.
#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    /// Link target.
    pub url: String,
    /// Words linked.
    pub words: Vec<String>,
    /// Per-product entries.
    pub products: Vec<LinkEntry>,
    /// Write tally.
    pub summary: ApplySummary,
    /// Scan counts; `failed` counts products whose write failed.
    pub counts: RunCounts,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Whether the write pass stopped early.
    pub cancelled: bool,
}

/// Options for [`LinkService::run`].
#[derive(Debug, Clone)]
pub struct LinkJobOptions {
    /// Collection whose products are processed.
    pub collection: CollectionGid,
    /// Words to link, in order.
    pub words: Vec<String>,
    /// Link target.
    pub url: String,
    /// Compute without writing.
    pub dry_run: bool,
}

/// Adds internal links across a collection.
#[derive(Debug, Clone)]
pub struct LinkService {
    client: AdminClient,
    page_size: u32,
}

impl LinkService {
    /// Create the service.
    #[must_use]
    pub const fn new(client: AdminClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    /// Link words in every product of the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the product scan aborts or an id is malformed.
    #[instrument(skip(self, driver, options), fields(collection_id = %options.collection, url = %options.url))]
    pub async fn run(&self, driver: &PipelineDriver, options: &LinkJobOptions) -> Result<LinkReport> {
        if options.words.iter().all(|w| w.trim().is_empty()) {
            return Err(JobError::InvalidArgument("no words to link".to_string()));
        }

        let mut fetcher = ShopifyCatalogFetcher::new(
            self.client.clone(),
            CatalogScope::Collection(options.collection.clone()),
            RecordShape::Product,
            self.page_size,
        );
        let (products, mut counts) = completed_report(
            driver
                .run(&mut fetcher, &ProductNormalizer, &DescriptionCollector, &DiscardSink)
                .await,
        )?;
        info!(products = products.len(), "Collection products loaded");

        let mut entries = Vec::with_capacity(products.len());
        let mut updates = Vec::new();
        let mut update_entries = Vec::new();

        for product in products {
            let Some(html) = product.description_html else {
                entries.push(LinkEntry {
                    id: product.id,
                    title: product.title,
                    status: LinkStatus::NoDescription,
                });
                continue;
            };

            let status = match link_words(&html, &options.words, &options.url) {
                LinkOutcome::Linked { html: new_html, count } => {
                    let gid = ProductGid::parse(&product.id).map_err(|e| {
                        JobError::InvalidArgument(format!("product id {}: {e}", product.id))
                    })?;
                    debug!(product_id = %gid, count, "Words linked");
                    update_entries.push(entries.len());
                    updates.push(DescriptionUpdate {
                        product: gid,
                        title: product.title.clone(),
                        current_html: html,
                        new_html,
                    });
                    LinkStatus::Linked { count, result: None }
                }
                LinkOutcome::AlreadyLinked(word) => LinkStatus::AlreadyLinked { word },
                LinkOutcome::NoMatch => LinkStatus::NoMatch,
            };
            entries.push(LinkEntry {
                id: product.id,
                title: product.title,
                status,
            });
        }

        let (summary, cancelled) = if options.dry_run {
            info!(updates = updates.len(), "Dry run, nothing written");
            (ApplySummary::default(), false)
        } else {
            let applied = driver
                .apply_each(&updates, &DescriptionSink::new(self.client.clone()))
                .await;
            for (index, outcome) in update_entries.iter().zip(applied.results.iter()) {
                if let Some(LinkEntry {
                    status: LinkStatus::Linked { result, .. },
                    ..
                }) = entries.get_mut(*index)
                {
                    *result = Some(outcome.clone());
                }
            }
            (applied.summary(), applied.cancelled)
        };
        counts.failed = summary.failed;

        Ok(LinkReport {
            url: options.url.clone(),
            words: options.words.clone(),
            products: entries,
            summary,
            counts,
            dry_run: options.dry_run,
            cancelled,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::pipeline::RetryPolicy;
    use crate::shopify::admin::tests::test_client;

    const URL: &str = "/collections/amethyst";

    fn description(section: &str) -> String {
        format!("<p>Amethyst intro.</p><h2>Product Description</h2>{section}<h2>Care</h2><p>Amethyst care.</p>")
    }

    #[test]
    fn test_links_first_occurrence_in_section_only() {
        let html = description("<p>Our amethyst beads are amethyst.</p>");
        let LinkResult::Linked(updated) = add_link(&html, "Amethyst", URL) else {
            panic!("expected a link");
        };
        assert_eq!(
            updated,
            description("<p>Our <a href=\"/collections/amethyst\">amethyst</a> beads are amethyst.</p>")
        );
    }

    #[test]
    fn test_whole_words_only() {
        let html = description("<p>Amethystine is not it.</p>");
        assert_eq!(add_link(&html, "amethyst", URL), LinkResult::NoMatch);
    }

    #[test]
    fn test_skips_text_inside_other_anchors_and_tags() {
        let html = description(
            "<p><a href=\"/x\">amethyst guide</a> <span class=\"amethyst\">and</span> amethyst beads</p>",
        );
        let LinkResult::Linked(updated) = add_link(&html, "amethyst", URL) else {
            panic!("expected a link");
        };
        assert!(updated.contains("</span> <a href=\"/collections/amethyst\">amethyst</a> beads"));
        assert!(updated.contains("<a href=\"/x\">amethyst guide</a>"));
    }

    #[test]
    fn test_skips_anchors_with_whitespace_after_the_tag_name() {
        let html = description(
            "<p><a\nhref=\"/x\">amethyst</a> <A\thref=\"/y\">amethyst</A > <abbr>amethyst</abbr></p>",
        );
        let LinkResult::Linked(updated) = add_link(&html, "amethyst", URL) else {
            panic!("expected a link");
        };
        assert!(updated.contains("<a\nhref=\"/x\">amethyst</a>"));
        assert!(updated.contains("<A\thref=\"/y\">amethyst</A >"));
        assert!(updated.contains("<abbr><a href=\"/collections/amethyst\">amethyst</a></abbr>"));
    }

    #[test]
    fn test_already_linked() {
        let html = description("<p>See <a href=\"https://shop.example/collections/amethyst\">Amethyst</a>.</p>");
        assert_eq!(add_link(&html, "amethyst", URL), LinkResult::AlreadyLinked);
        assert_eq!(
            link_words(&html, &["quartz".to_string(), "amethyst".to_string()], URL),
            LinkOutcome::AlreadyLinked("amethyst".to_string())
        );
    }

    #[test]
    fn test_no_section() {
        assert_eq!(add_link("<p>amethyst</p>", "amethyst", URL), LinkResult::NoMatch);
    }

    #[test]
    fn test_link_words_counts() {
        let html = description("<p>Amethyst and quartz.</p>");
        let outcome = link_words(
            &html,
            &["amethyst".to_string(), "quartz".to_string(), "onyx".to_string()],
            URL,
        );
        let LinkOutcome::Linked { html, count } = outcome else {
            panic!("expected links");
        };
        assert_eq!(count, 2);
        assert_eq!(html.matches("<a href").count(), 2);
    }

    #[tokio::test]
    async fn test_run_writes_changed_descriptions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "operationName": "CollectionProductsPage" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "collection": { "products": {
                    "nodes": [
                        { "id": "gid://shopify/Product/1", "title": "A", "descriptionHtml": description("<p>amethyst</p>") },
                        { "id": "gid://shopify/Product/2", "title": "B", "descriptionHtml": description("<p>quartz</p>") },
                        { "id": "gid://shopify/Product/3", "title": "C" }
                    ],
                    "pageInfo": { "hasNextPage": false, "endCursor": null }
                } } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "operationName": "UpdateProductDescription" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "productUpdate": { "product": { "id": "gid://shopify/Product/1" }, "userErrors": [] } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = LinkJobOptions {
            collection: CollectionGid::new(4),
            words: vec!["amethyst".to_string()],
            url: URL.to_string(),
            dry_run: false,
        };
        let report = LinkService::new(test_client(&server), 50)
            .run(&PipelineDriver::new(RetryPolicy::immediate(1)), &options)
            .await
            .unwrap();

        assert_eq!(
            report.products[0].status,
            LinkStatus::Linked { count: 1, result: Some(ItemResult::Written) }
        );
        assert_eq!(report.products[1].status, LinkStatus::NoMatch);
        assert_eq!(report.products[2].status, LinkStatus::NoDescription);
        assert_eq!(report.summary.written, 1);
        assert_eq!(report.counts.processed, 3);
        assert_eq!(report.counts.failed, 0);
    }
}
