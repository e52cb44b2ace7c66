//! Collection reads plus SEO and description updates for the Admin API.

use serde::Deserialize;
use tracing::instrument;

use catalog_ops_core::{CollectionGid, SeoMetadata};

use super::{
    AdminClient, AdminShopifyError,
    queries::{self, CollectionProductsVariables, IdVariables, InputVariables, PageVariables},
};
use crate::shopify::{
    GraphQLError,
    types::{
        CollectionDescription, CollectionSeo, Connection, SeoInput, UserError, format_user_errors,
    },
};

#[derive(Debug, Deserialize)]
struct CollectionsData {
    collections: Connection<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescriptionData {
    collection: Option<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionProductsData {
    collection: Option<CollectionProducts>,
}

#[derive(Debug, Deserialize)]
struct CollectionProducts {
    products: Connection<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CollectionSeoData {
    collection: Option<CollectionSeo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionUpdateData {
    collection_update: Option<CollectionUpdatePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionUpdatePayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, serde::Serialize)]
struct CollectionSeoInput<'a> {
    id: String,
    seo: SeoInput<'a>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionDescriptionInput<'a> {
    id: String,
    description_html: &'a str,
}

impl AdminClient {
    /// Get one page of the store's collections (`id`, `title`, `handle`) as raw JSON nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or returns an error response.
    #[instrument(skip(self))]
    pub async fn collections_page(
        &self,
        first: u32,
        after: Option<String>,
    ) -> Result<Connection<serde_json::Value>, AdminShopifyError> {
        let data: CollectionsData = self
            .execute(queries::COLLECTIONS_PAGE, PageVariables { first, after })
            .await?;
        Ok(data.collections)
    }

    /// Get one page of a collection's products as raw JSON nodes.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::NotFound` if the collection does not exist.
    #[instrument(skip(self), fields(collection_id = %id))]
    pub async fn collection_products_page(
        &self,
        id: &CollectionGid,
        first: u32,
        after: Option<String>,
        with_variants: bool,
    ) -> Result<Connection<serde_json::Value>, AdminShopifyError> {
        let operation = if with_variants {
            queries::COLLECTION_PRODUCTS_WITH_VARIANTS_PAGE
        } else {
            queries::COLLECTION_PRODUCTS_PAGE
        };
        let variables = CollectionProductsVariables {
            id: id.to_string(),
            first,
            after,
        };

        let data: CollectionProductsData = self.execute(operation, variables).await?;

        data.collection
            .map(|c| c.products)
            .ok_or_else(|| AdminShopifyError::NotFound(format!("collection {id}")))
    }

    /// Get a collection's title, handle and SEO fields.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::NotFound` if the collection does not exist.
    #[instrument(skip(self), fields(collection_id = %id))]
    pub async fn get_collection_seo(
        &self,
        id: &CollectionGid,
    ) -> Result<CollectionSeo, AdminShopifyError> {
        let data: CollectionSeoData = self
            .execute(queries::COLLECTION_SEO, IdVariables { id: id.to_string() })
            .await?;

        data.collection
            .ok_or_else(|| AdminShopifyError::NotFound(format!("collection {id}")))
    }

    /// Set a collection's SEO title and description.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the input.
    #[instrument(skip(self, seo), fields(collection_id = %id))]
    pub async fn update_collection_seo(
        &self,
        id: &CollectionGid,
        seo: &SeoMetadata,
    ) -> Result<(), AdminShopifyError> {
        let variables = InputVariables {
            input: CollectionSeoInput {
                id: id.to_string(),
                seo: SeoInput::from(seo),
            },
        };

        let data: CollectionUpdateData = self
            .execute(queries::UPDATE_COLLECTION_SEO, variables)
            .await?;
        check_collection_update(data)
    }

    /// Get a collection's description HTML.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::NotFound` if the collection does not exist.
    #[instrument(skip(self), fields(collection_id = %id))]
    pub async fn get_collection_description(
        &self,
        id: &CollectionGid,
    ) -> Result<CollectionDescription, AdminShopifyError> {
        let data: CollectionDescriptionData = self
            .execute(
                queries::COLLECTION_DESCRIPTION,
                IdVariables { id: id.to_string() },
            )
            .await?;

        data.collection
            .ok_or_else(|| AdminShopifyError::NotFound(format!("collection {id}")))
    }

    /// Replace a collection's description HTML.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the input.
    #[instrument(skip(self, description_html), fields(collection_id = %id))]
    pub async fn update_collection_description(
        &self,
        id: &CollectionGid,
        description_html: &str,
    ) -> Result<(), AdminShopifyError> {
        let variables = InputVariables {
            input: CollectionDescriptionInput {
                id: id.to_string(),
                description_html,
            },
        };

        let data: CollectionUpdateData = self
            .execute(queries::UPDATE_COLLECTION_DESCRIPTION, variables)
            .await?;
        check_collection_update(data)
    }
}

fn check_collection_update(data: CollectionUpdateData) -> Result<(), AdminShopifyError> {
    let payload = data.collection_update.ok_or_else(|| {
        AdminShopifyError::GraphQL(vec![GraphQLError::message(
            "No payload returned from collectionUpdate",
        )])
    })?;

    if !payload.user_errors.is_empty() {
        return Err(AdminShopifyError::UserError(format_user_errors(
            &payload.user_errors,
        )));
    }
    Ok(())
}
