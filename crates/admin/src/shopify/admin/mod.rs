//! Shopify Admin API client authenticated with a static access token.
//!
//! GraphQL calls go through [`AdminClient::execute`]; REST calls through
//! [`AdminClient::rest_get`] and [`AdminClient::rest_post`]. Both map HTTP
//! status codes to [`AdminShopifyError`] the same way.

use std::sync::Arc;
use std::time::Duration;

use graphql_client::{QueryBody, Response};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use tracing::instrument;

use crate::config::ShopifyAdminConfig;

use super::{AdminShopifyError, GraphQLError, GraphQLErrorLocation};

mod collections;
mod content;
mod products;
pub mod queries;

use queries::Operation;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;
const THROTTLED_CODE: &str = "THROTTLED";

/// Shopify Admin API client.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    client: reqwest::Client,
    base_url: String,
    store: String,
    api_version: String,
    access_token: SecretString,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("store", &self.inner.store)
            .field("api_version", &self.inner.api_version)
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    /// Create a client for `https://{store}`.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShopifyAdminConfig) -> Result<Self, AdminShopifyError> {
        Self::with_base_url(config, &format!("https://{}", config.store))
    }

    /// Create a client that talks to `base_url` instead of the store domain.
    ///
    /// Used against mock servers.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::Http` if the HTTP client cannot be built.
    pub fn with_base_url(
        config: &ShopifyAdminConfig,
        base_url: &str,
    ) -> Result<Self, AdminShopifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(AdminClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                store: config.store.clone(),
                api_version: config.api_version.clone(),
                access_token: config.access_token.clone(),
            }),
        })
    }

    /// Get the store domain.
    #[must_use]
    pub fn store(&self) -> &str {
        &self.inner.store
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/admin/api/{}/{}",
            self.inner.base_url,
            self.inner.api_version,
            path.trim_start_matches('/')
        )
    }

    // =========================================================================
    // GraphQL Execution
    // =========================================================================

    /// Execute a GraphQL operation and decode its `data`.
    #[instrument(skip(self, operation, variables), fields(operation = operation.name))]
    pub(crate) async fn execute<V, T>(
        &self,
        operation: Operation,
        variables: V,
    ) -> Result<T, AdminShopifyError>
    where
        V: Serialize + Send,
        T: DeserializeOwned,
    {
        let body = QueryBody {
            variables,
            query: operation.document,
            operation_name: operation.name,
        };

        let response = self
            .inner
            .client
            .post(self.api_url("graphql.json"))
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let graphql_response: Response<T> = response.json().await?;

        if let Some(errors) = graphql_response.errors
            && !errors.is_empty()
        {
            let converted_errors: Vec<GraphQLError> =
                errors.into_iter().map(convert_graphql_error).collect();

            if converted_errors
                .iter()
                .any(|e| e.code.as_deref() == Some(THROTTLED_CODE))
            {
                tracing::warn!("GraphQL query throttled");
                return Err(AdminShopifyError::Throttled);
            }
            return Err(AdminShopifyError::GraphQL(converted_errors));
        }

        graphql_response
            .data
            .ok_or_else(|| AdminShopifyError::GraphQL(vec![GraphQLError::message("No data in response")]))
    }

    // =========================================================================
    // REST Execution
    // =========================================================================

    /// GET a REST resource.
    #[instrument(skip(self, query))]
    pub(crate) async fn rest_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdminShopifyError> {
        let response = self
            .inner
            .client
            .get(self.api_url(path))
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .query(query)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// POST a REST resource.
    #[instrument(skip(self, body))]
    pub(crate) async fn rest_post<B, T>(&self, path: &str, body: &B) -> Result<T, AdminShopifyError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .inner
            .client
            .post(self.api_url(path))
            .header("X-Shopify-Access-Token", self.inner.access_token.expose_secret())
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Map non-success statuses to errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AdminShopifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        // Shopify sends fractional seconds ("2.0")
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map_or(DEFAULT_RETRY_AFTER_SECS, |secs| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let whole = secs.ceil() as u64;
                whole
            });
        return Err(AdminShopifyError::RateLimited(retry_after));
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(AdminShopifyError::Unauthorized(
            "Invalid or expired access token".to_string(),
        ));
    }

    if status == StatusCode::FORBIDDEN {
        return Err(AdminShopifyError::Forbidden(
            "Access token is missing a required scope".to_string(),
        ));
    }

    if status.is_server_error() {
        return Err(AdminShopifyError::ServerError(status.as_u16()));
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
        return Err(AdminShopifyError::NotFound(url));
    }
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        return Err(AdminShopifyError::UserError(body));
    }

    Err(AdminShopifyError::UnexpectedStatus(status.as_u16(), body))
}

fn convert_graphql_error(error: graphql_client::Error) -> GraphQLError {
    let code = error
        .extensions
        .as_ref()
        .and_then(|ext| ext.get("code"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    GraphQLError {
        message: error.message,
        locations: error
            .locations
            .unwrap_or_default()
            .into_iter()
            .map(|l| GraphQLErrorLocation {
                line: l.line,
                column: l.column,
            })
            .collect(),
        path: error
            .path
            .unwrap_or_default()
            .into_iter()
            .map(|fragment| match fragment {
                graphql_client::PathFragment::Key(key) => serde_json::Value::String(key),
                graphql_client::PathFragment::Index(index) => serde_json::Value::from(index),
            })
            .collect(),
        code,
    }
}
