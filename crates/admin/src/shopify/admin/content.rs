//! Blogs and articles (REST).

use serde::Deserialize;
use tracing::instrument;

use super::{AdminClient, AdminShopifyError};
use crate::shopify::types::{Article, Blog, NewArticle};

/// Articles requested per REST page (the REST maximum).
const ARTICLE_PAGE_LIMIT: u32 = 250;

#[derive(Debug, Deserialize)]
struct BlogsResponse {
    blogs: Vec<Blog>,
}

#[derive(Debug, Deserialize)]
struct BlogResponse {
    blog: Blog,
}

#[derive(Debug, Deserialize)]
struct ArticlesResponse {
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct ArticleResponse {
    article: Article,
}

#[derive(Debug, serde::Serialize)]
struct BlogBody<'a> {
    blog: NewBlog<'a>,
}

#[derive(Debug, serde::Serialize)]
struct NewBlog<'a> {
    title: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct ArticleBody<'a> {
    article: &'a NewArticle,
}

impl AdminClient {
    /// List every blog in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_blogs(&self) -> Result<Vec<Blog>, AdminShopifyError> {
        let response: BlogsResponse = self.rest_get("blogs.json", &[]).await?;
        Ok(response.blogs)
    }

    /// Find a blog by case-insensitive title, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or creating fails.
    #[instrument(skip(self))]
    pub async fn get_or_create_blog(&self, title: &str) -> Result<Blog, AdminShopifyError> {
        let wanted = title.trim().to_lowercase();
        if let Some(blog) = self
            .list_blogs()
            .await?
            .into_iter()
            .find(|b| b.title.trim().to_lowercase() == wanted)
        {
            tracing::debug!(blog_id = blog.id, "Using existing blog");
            return Ok(blog);
        }

        let response: BlogResponse = self
            .rest_post("blogs.json", &BlogBody {
                blog: NewBlog { title: title.trim() },
            })
            .await?;
        tracing::info!(blog_id = response.blog.id, "Blog created");
        Ok(response.blog)
    }

    /// List every article of a blog, following `since_id` pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_articles(&self, blog_id: u64) -> Result<Vec<Article>, AdminShopifyError> {
        let path = format!("blogs/{blog_id}/articles.json");
        let mut articles: Vec<Article> = Vec::new();
        let mut since_id: u64 = 0;

        loop {
            let query = [
                ("limit", ARTICLE_PAGE_LIMIT.to_string()),
                ("since_id", since_id.to_string()),
                ("fields", "id,title,handle".to_string()),
            ];
            let page: ArticlesResponse = self.rest_get(&path, &query).await?;
            let count = page.articles.len();

            match page.articles.iter().map(|a| a.id).max() {
                Some(max_id) => since_id = max_id,
                None => break,
            }
            articles.extend(page.articles);

            if count < ARTICLE_PAGE_LIMIT as usize {
                break;
            }
        }

        Ok(articles)
    }

    /// Create an article in a blog.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the article.
    #[instrument(skip(self, article), fields(handle = %article.handle))]
    pub async fn create_article(
        &self,
        blog_id: u64,
        article: &NewArticle,
    ) -> Result<Article, AdminShopifyError> {
        let response: ArticleResponse = self
            .rest_post(&format!("blogs/{blog_id}/articles.json"), &ArticleBody { article })
            .await?;
        Ok(response.article)
    }
}
