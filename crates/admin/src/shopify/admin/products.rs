//! Product reads and updates for the Admin API.

use serde::Deserialize;
use tracing::instrument;

use catalog_ops_core::{ProductGid, SeoMetadata};

use super::{
    AdminClient, AdminShopifyError,
    queries::{self, FindProductsVariables, InputVariables, ProductsPageVariables},
};
use crate::shopify::{
    GraphQLError,
    types::{
        Connection, CreatedProduct, NewProduct, Nodes, ProductSummary, SeoInput, UserError,
        format_user_errors,
    },
};

#[derive(Debug, Deserialize)]
struct ProductsData<T> {
    products: Connection<T>,
}

#[derive(Debug, Deserialize)]
struct FoundProducts {
    products: Nodes<ProductSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductUpdateData {
    product_update: Option<MutationPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, serde::Serialize)]
struct ProductSeoInput<'a> {
    id: String,
    seo: SeoInput<'a>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductDescriptionInput<'a> {
    id: String,
    description_html: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct CreateProductBody<'a> {
    product: &'a NewProduct,
}

#[derive(Debug, Deserialize)]
struct CreateProductResponse {
    product: CreatedProduct,
}

#[derive(Debug, serde::Serialize)]
struct CollectBody {
    collect: Collect,
}

#[derive(Debug, serde::Serialize)]
struct Collect {
    product_id: u64,
    collection_id: u64,
}

impl AdminClient {
    /// Get one page of products as raw JSON nodes.
    ///
    /// # Arguments
    ///
    /// * `first` - Number of products to return (max 250)
    /// * `after` - Cursor for pagination
    /// * `query` - Optional search query
    /// * `with_variants` - Whether to select variants and inventory
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or returns an error response.
    #[instrument(skip(self))]
    pub async fn products_page(
        &self,
        first: u32,
        after: Option<String>,
        query: Option<String>,
        with_variants: bool,
    ) -> Result<Connection<serde_json::Value>, AdminShopifyError> {
        let operation = if with_variants {
            queries::PRODUCTS_WITH_VARIANTS_PAGE
        } else {
            queries::PRODUCTS_PAGE
        };
        let variables = ProductsPageVariables { first, after, query };

        let data: ProductsData<serde_json::Value> = self.execute(operation, variables).await?;
        Ok(data.products)
    }

    /// Find products whose title matches exactly, newest first.
    ///
    /// Shopify's search is case-insensitive and tokenized, so results are
    /// filtered again for exact equality.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn find_products_by_title(
        &self,
        title: &str,
    ) -> Result<Vec<ProductSummary>, AdminShopifyError> {
        let variables = FindProductsVariables {
            first: 5,
            query: queries::exact_title_query(title),
        };

        let data: FoundProducts = self.execute(queries::FIND_PRODUCTS, variables).await?;

        Ok(data
            .products
            .nodes
            .into_iter()
            .filter(|p| p.title.trim() == title.trim())
            .collect())
    }

    /// Set a product's SEO title and description.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the input.
    #[instrument(skip(self, seo), fields(product_id = %id))]
    pub async fn update_product_seo(
        &self,
        id: &ProductGid,
        seo: &SeoMetadata,
    ) -> Result<(), AdminShopifyError> {
        let variables = InputVariables {
            input: ProductSeoInput {
                id: id.to_string(),
                seo: SeoInput::from(seo),
            },
        };

        let data: ProductUpdateData = self.execute(queries::UPDATE_PRODUCT_SEO, variables).await?;
        check_product_update(data)
    }

    /// Replace a product's description HTML.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the input.
    #[instrument(skip(self, description_html), fields(product_id = %id))]
    pub async fn update_product_description(
        &self,
        id: &ProductGid,
        description_html: &str,
    ) -> Result<(), AdminShopifyError> {
        let variables = InputVariables {
            input: ProductDescriptionInput {
                id: id.to_string(),
                description_html,
            },
        };

        let data: ProductUpdateData = self
            .execute(queries::UPDATE_PRODUCT_DESCRIPTION, variables)
            .await?;
        check_product_update(data)
    }

    /// Create a product through REST `products.json`.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::UserError` if Shopify rejects the payload.
    #[instrument(skip(self, product), fields(title = %product.title))]
    pub async fn create_product(
        &self,
        product: &NewProduct,
    ) -> Result<CreatedProduct, AdminShopifyError> {
        let response: CreateProductResponse = self
            .rest_post("products.json", &CreateProductBody { product })
            .await?;

        tracing::info!(product_id = response.product.id, "Product created");
        Ok(response.product)
    }

    /// Add a product to a custom collection through REST `collects.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn add_product_to_collection(
        &self,
        product_id: u64,
        collection_id: u64,
    ) -> Result<(), AdminShopifyError> {
        let body = CollectBody {
            collect: Collect {
                product_id,
                collection_id,
            },
        };
        let _: serde_json::Value = self.rest_post("collects.json", &body).await?;
        Ok(())
    }
}

fn check_product_update(data: ProductUpdateData) -> Result<(), AdminShopifyError> {
    let payload = data.product_update.ok_or_else(|| {
        AdminShopifyError::GraphQL(vec![GraphQLError::message(
            "No payload returned from productUpdate",
        )])
    })?;

    if !payload.user_errors.is_empty() {
        return Err(AdminShopifyError::UserError(format_user_errors(
            &payload.user_errors,
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shopify::admin::tests::test_client;
    use crate::shopify::types::{NewOption, NewVariant};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_products_page_returns_nodes_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "operationName": "ProductsPage",
                "variables": { "first": 2, "after": "cursor-1" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "products": {
                    "nodes": [
                        { "id": "gid://shopify/Product/1", "title": "Onyx" },
                        { "id": "gid://shopify/Product/2", "title": "Jade" }
                    ],
                    "pageInfo": { "hasNextPage": true, "endCursor": "cursor-2" }
                }}
            })))
            .mount(&server)
            .await;

        let page = test_client(&server)
            .products_page(2, Some("cursor-1".to_string()), None, false)
            .await
            .unwrap();
        assert_eq!(page.nodes.len(), 2);
        assert_eq!(page.next_cursor(), Some("cursor-2"));
    }

    #[tokio::test]
    async fn test_find_products_by_title_filters_exact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "variables": { "query": "title:\"Ruby Drop\"" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "products": {
                    "nodes": [
                        { "id": "gid://shopify/Product/9", "title": "Ruby Drop Earrings" },
                        { "id": "gid://shopify/Product/3", "title": "Ruby Drop" }
                    ]
                }}
            })))
            .mount(&server)
            .await;

        let found = test_client(&server)
            .find_products_by_title("Ruby Drop")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "gid://shopify/Product/3");
    }

    #[tokio::test]
    async fn test_update_product_seo_surfaces_user_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "variables": { "input": {
                    "id": "gid://shopify/Product/5",
                    "seo": { "title": "T", "description": "D." }
                }}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "productUpdate": {
                    "product": null,
                    "userErrors": [{ "field": ["input", "seo", "title"], "message": "is too long" }]
                }}
            })))
            .mount(&server)
            .await;

        let seo = SeoMetadata {
            title: "T".to_string(),
            description: "D.".to_string(),
        };
        let err = test_client(&server)
            .update_product_seo(&ProductGid::new(5), &seo)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User error: input.seo.title: is too long");
    }

    #[tokio::test]
    async fn test_create_product_and_collect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/api/2025-01/products.json"))
            .and(body_partial_json(serde_json::json!({
                "product": { "title": "Moonstone Bail", "product_type": "Findings" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "product": { "id": 42, "title": "Moonstone Bail" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/api/2025-01/collects.json"))
            .and(body_partial_json(serde_json::json!({
                "collect": { "product_id": 42, "collection_id": 7 }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "collect": { "id": 1 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let product = NewProduct {
            title: "Moonstone Bail".to_string(),
            body_html: "<strong>Material:</strong> Sterling Silver<br>".to_string(),
            product_type: "Findings".to_string(),
            variants: vec![NewVariant {
                price: "4.50".to_string(),
                inventory_management: "shopify".to_string(),
                inventory_quantity: 3,
                option1: Some("Blue".to_string()),
            }],
            options: vec![NewOption {
                name: "Stone Colour".to_string(),
            }],
            metafields: vec![],
            images: vec![],
        };

        let client = test_client(&server);
        let created = client.create_product(&product).await.unwrap();
        assert_eq!(created.id, 42);
        client.add_product_to_collection(created.id, 7).await.unwrap();
    }
}
