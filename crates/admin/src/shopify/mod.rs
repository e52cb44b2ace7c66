//! Shopify Admin API client.
//!
//! # Security
//!
//! The Admin API access token has write access to products, collections and
//! content. Keep it out of logs; config types redact it in `Debug`.
//!
//! # Architecture
//!
//! - GraphQL for catalog reads and SEO/description updates, with
//!   `graphql_client` request/response envelopes around plain query documents
//! - REST for blogs, articles, product creation and collects
//! - No retries here: errors are classified with
//!   [`AdminShopifyError::is_transient`] and retried by the pipeline driver
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_ops_admin::shopify::AdminClient;
//!
//! let client = AdminClient::new(&config.shopify)?;
//! let page = client.products_page(50, None, None, false).await?;
//! ```

pub(crate) mod admin;
pub mod types;

use std::time::Duration;

pub use admin::AdminClient;
pub use admin::queries;
pub use types::*;

use thiserror::Error;

/// Errors that can occur when interacting with Shopify Admin API.
#[derive(Debug, Error)]
pub enum AdminShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// GraphQL cost budget exhausted (`THROTTLED`).
    #[error("Throttled: query cost exceeds the available budget")]
    Throttled,

    /// Shopify returned a 5xx status.
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Authentication failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Token lacks the required access scope.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Any other non-success status.
    #[error("Unexpected status {0}: {1}")]
    UnexpectedStatus(u16, String),

    /// User error from mutation (e.g., invalid input).
    #[error("User error: {0}")]
    UserError(String),
}

impl AdminShopifyError {
    /// Whether retrying the same request may succeed.
    ///
    /// Network failures, 429, 5xx and GraphQL throttling are transient;
    /// auth, schema, decode and user errors are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_builder(),
            Self::RateLimited(_) | Self::Throttled | Self::ServerError(_) => true,
            Self::GraphQL(_)
            | Self::Parse(_)
            | Self::NotFound(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::UnexpectedStatus(_, _)
            | Self::UserError(_) => false,
        }
    }

    /// Server-requested wait before retrying.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
    /// `extensions.code` (e.g. `THROTTLED`, `ACCESS_DENIED`).
    pub code: Option<String>,
}

impl GraphQLError {
    /// An error with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: vec![],
            path: vec![],
            code: None,
        }
    }
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i32,
    /// Column number (1-indexed).
    pub column: i32,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}
