//! Blog migration: publish a directory of HTML files as articles.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use catalog_ops_core::Handle;

use crate::error::Result;
use crate::pipeline::{ItemResult, PipelineDriver, RecordSink, SinkError, WriteOutcome};
use crate::shopify::{AdminClient, NewArticle};

use super::html::text_content;

static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").expect("Invalid regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("Invalid regex"));
static HTML_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(?:<!doctype[^>]*>\s*)?<html\b[^>]*>").expect("Invalid regex")
});
static HTML_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)</html\s*>\s*$").expect("Invalid regex"));

/// Title and body extracted from an HTML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArticle {
    /// Article title.
    pub title: String,
    /// Body HTML without the title heading or document wrappers.
    pub body_html: String,
}

/// `my-first_post` → `My First_Post`.
fn title_from_stem(stem: &str) -> String {
    let mut title = String::with_capacity(stem.len());
    let mut previous_alpha = false;
    for c in stem.replace('-', " ").chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                title.extend(c.to_lowercase());
            } else {
                title.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            title.push(c);
            previous_alpha = false;
        }
    }
    title.trim().to_string()
}

/// Extract the title and body of an HTML article.
///
/// The title is the text of the first `<h1>`, which is removed from the
/// body. Without a usable `<h1>` the title comes from the file stem.
#[must_use]
pub fn parse_html_article(file_stem: &str, html: &str) -> ParsedArticle {
    let heading = H1_RE.captures(html).and_then(|caps| {
        let whole = caps.get(0)?;
        let text = text_content(caps.get(1)?.as_str());
        Some((whole.range(), text))
    });

    let (title, without_heading) = match heading {
        Some((range, text)) if !text.is_empty() => {
            let mut rest = String::with_capacity(html.len());
            rest.push_str(html.get(..range.start).unwrap_or_default());
            rest.push_str(html.get(range.end..).unwrap_or_default());
            (text, rest)
        }
        _ => (title_from_stem(file_stem), html.to_string()),
    };

    let body_html = match BODY_RE.captures(&without_heading) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
        None => {
            let opened = HTML_OPEN_RE.replace(&without_heading, "");
            HTML_CLOSE_RE.replace(&opened, "").trim().to_string()
        }
    };

    ParsedArticle { title, body_html }
}

/// An article ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogPost {
    /// Source file name.
    pub file: String,
    /// Article title.
    pub title: String,
    /// URL handle derived from the title.
    pub handle: Handle,
    /// Body HTML.
    pub body_html: String,
}

/// Creates articles, skipping handles the blog already has.
pub struct ArticleSink {
    client: AdminClient,
    blog_id: u64,
    author: String,
    existing: Mutex<HashSet<String>>,
}

impl ArticleSink {
    /// Sink creating articles in `blog_id`; `existing` holds handles to skip.
    #[must_use]
    pub fn new(
        client: AdminClient,
        blog_id: u64,
        author: impl Into<String>,
        existing: HashSet<String>,
    ) -> Self {
        Self {
            client,
            blog_id,
            author: author.into(),
            existing: Mutex::new(existing),
        }
    }
}

#[async_trait]
impl RecordSink<BlogPost> for ArticleSink {
    async fn write_one(&self, post: &BlogPost) -> std::result::Result<WriteOutcome, SinkError> {
        let mut existing = self.existing.lock().await;
        if existing.contains(post.handle.as_str()) {
            debug!(handle = %post.handle, "Article already exists");
            return Ok(WriteOutcome::Unchanged);
        }

        let article = NewArticle {
            title: post.title.clone(),
            body_html: post.body_html.clone(),
            author: self.author.clone(),
            handle: post.handle.to_string(),
        };
        let created = self.client.create_article(self.blog_id, &article).await?;
        info!(article_id = created.id, handle = %post.handle, "Article created");

        existing.insert(post.handle.to_string());
        Ok(WriteOutcome::Written)
    }
}

/// One file's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogEntry {
    /// Source file name.
    pub file: String,
    /// Article title, when the file could be parsed.
    pub title: Option<String>,
    /// Why the file was skipped or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Results of a blog migration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlogMigrationReport {
    /// Target blog id.
    pub blog_id: u64,
    /// Target blog title.
    pub blog_title: String,
    /// Articles created.
    pub success: Vec<BlogEntry>,
    /// Articles that already existed.
    pub skipped: Vec<BlogEntry>,
    /// Files that could not be read or published.
    pub failed: Vec<BlogEntry>,
    /// Whether the run stopped early.
    pub cancelled: bool,
}

/// Options for [`BlogService::run`].
#[derive(Debug, Clone)]
pub struct BlogJobOptions {
    /// Directory holding `*.html` files.
    pub dir: PathBuf,
    /// Blog to publish into, created when missing.
    pub blog_title: String,
    /// Skip articles whose handle already exists.
    pub skip_existing: bool,
}

/// `*.html` files in `dir`, sorted by name.
async fn html_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html"));
        if is_html && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Publishes HTML files as blog articles.
#[derive(Debug, Clone)]
pub struct BlogService {
    client: AdminClient,
    author: String,
}

impl BlogService {
    /// Create the service; `author` is credited on every article.
    #[must_use]
    pub fn new(client: AdminClient, author: impl Into<String>) -> Self {
        Self {
            client,
            author: author.into(),
        }
    }

    /// Publish every HTML file in the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or the blog cannot
    /// be loaded. Per-file failures are reported, not returned.
    #[instrument(skip(self, driver, options), fields(dir = %options.dir.display()))]
    pub async fn run(
        &self,
        driver: &PipelineDriver,
        options: &BlogJobOptions,
    ) -> Result<BlogMigrationReport> {
        let files = html_files(&options.dir).await?;
        info!(files = files.len(), "HTML files found");

        let blog = self.client.get_or_create_blog(&options.blog_title).await?;
        let existing: HashSet<String> = if options.skip_existing {
            self.client
                .list_articles(blog.id)
                .await?
                .into_iter()
                .map(|a| a.handle)
                .collect()
        } else {
            HashSet::new()
        };
        debug!(existing = existing.len(), "Existing article handles loaded");

        let mut report = BlogMigrationReport {
            blog_id: blog.id,
            blog_title: blog.title,
            ..BlogMigrationReport::default()
        };

        let mut posts = Vec::with_capacity(files.len());
        for path in &files {
            let file = file_name(path);
            let html = match tokio::fs::read_to_string(path).await {
                Ok(html) => html,
                Err(error) => {
                    warn!(%file, %error, "Could not read file");
                    report.failed.push(BlogEntry {
                        file,
                        title: None,
                        reason: Some(error.to_string()),
                    });
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed = parse_html_article(&stem, &html);
            match Handle::from_title(&parsed.title) {
                Ok(handle) => posts.push(BlogPost {
                    file,
                    title: parsed.title,
                    handle,
                    body_html: parsed.body_html,
                }),
                Err(error) => report.failed.push(BlogEntry {
                    file,
                    title: Some(parsed.title),
                    reason: Some(error.to_string()),
                }),
            }
        }

        let sink = ArticleSink::new(self.client.clone(), report.blog_id, &self.author, existing);
        let applied = driver.apply_each(&posts, &sink).await;
        report.cancelled = applied.cancelled;

        for (post, result) in posts.into_iter().zip(applied.results) {
            let entry = |reason: Option<String>| BlogEntry {
                file: post.file.clone(),
                title: Some(post.title.clone()),
                reason,
            };
            match result {
                ItemResult::Written => report.success.push(entry(None)),
                ItemResult::Unchanged => report.skipped.push(entry(Some("Already exists".to_string()))),
                ItemResult::Failed(error) => report.failed.push(entry(Some(error))),
            }
        }

        info!(
            success = report.success.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Blog migration finished"
        );
        Ok(report)
    }
}
