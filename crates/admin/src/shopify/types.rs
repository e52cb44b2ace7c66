//! Response and payload types for the Shopify Admin API.
//!
//! GraphQL responses use camelCase, REST payloads snake_case.

use serde::{Deserialize, Serialize};

use catalog_ops_core::SeoMetadata;

// =============================================================================
// GraphQL connections
// =============================================================================

/// Relay-style pagination info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether another page follows.
    pub has_next_page: bool,
    /// Cursor of the last node on this page.
    pub end_cursor: Option<String>,
}

/// A connection page. Queries in this crate select `nodes` rather than `edges`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    /// Nodes in cursor order.
    pub nodes: Vec<T>,
    /// Pagination info.
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Cursor for the next page, `None` when exhausted.
    ///
    /// A page claiming more results without a cursor is treated as the last.
    #[must_use]
    pub fn next_cursor(&self) -> Option<&str> {
        if self.page_info.has_next_page {
            self.page_info.end_cursor.as_deref()
        } else {
            None
        }
    }
}

/// A connection selected without `pageInfo`, for single-page lookups.
#[derive(Debug, Clone, Deserialize)]
pub struct Nodes<T> {
    /// Nodes in cursor order.
    pub nodes: Vec<T>,
}

/// A mutation user error.
#[derive(Debug, Clone, Deserialize)]
pub struct UserError {
    /// Path to the offending input field.
    pub field: Option<Vec<String>>,
    /// Human-readable message.
    pub message: String,
}

/// Join user errors as `field: message` pairs separated by `; `.
#[must_use]
pub fn format_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(|e| {
            let field = e.field.as_ref().map_or_else(String::new, |f| f.join("."));
            format!("{}: {}", field, e.message)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Products & collections
// =============================================================================

/// Minimal product identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductSummary {
    /// Product gid.
    pub id: String,
    /// Product title.
    pub title: String,
}

/// SEO fields as returned by the API (either may be null).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeoFields {
    /// SEO title.
    pub title: Option<String>,
    /// Meta description.
    pub description: Option<String>,
}

impl SeoFields {
    /// Whether the title or description is missing or blank.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.title) || blank(&self.description)
    }
}

/// A collection with the fields the SEO job needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSeo {
    /// Collection gid.
    pub id: String,
    /// Collection title.
    pub title: String,
    /// URL handle.
    pub handle: String,
    /// Plain-text description.
    #[serde(default)]
    pub description: String,
    /// Current SEO fields.
    #[serde(default)]
    pub seo: SeoFields,
}

/// A collection's identity and description HTML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescription {
    /// Collection gid.
    pub id: String,
    /// Collection title.
    pub title: String,
    /// URL handle.
    pub handle: String,
    /// Description HTML; null or empty when the collection has none.
    pub description_html: Option<String>,
}

/// `seo` input object for `productUpdate` / `collectionUpdate`.
#[derive(Debug, Clone, Serialize)]
pub struct SeoInput<'a> {
    /// New SEO title.
    pub title: &'a str,
    /// New meta description.
    pub description: &'a str,
}

impl<'a> From<&'a SeoMetadata> for SeoInput<'a> {
    fn from(seo: &'a SeoMetadata) -> Self {
        Self {
            title: &seo.title,
            description: &seo.description,
        }
    }
}

// =============================================================================
// REST: blogs & articles
// =============================================================================

/// A blog (REST).
#[derive(Debug, Clone, Deserialize)]
pub struct Blog {
    /// Numeric id.
    pub id: u64,
    /// Blog title.
    pub title: String,
    /// URL handle.
    #[serde(default)]
    pub handle: String,
}

/// An article (REST), only the fields used for de-duplication.
#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    /// Numeric id.
    pub id: u64,
    /// Article title.
    pub title: String,
    /// URL handle.
    pub handle: String,
}

/// Payload for creating an article.
#[derive(Debug, Clone, Serialize)]
pub struct NewArticle {
    /// Article title.
    pub title: String,
    /// Article HTML body.
    pub body_html: String,
    /// Author name.
    pub author: String,
    /// URL handle.
    pub handle: String,
}

// =============================================================================
// REST: product import
// =============================================================================

/// Payload for creating a product through `products.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    /// Product title.
    pub title: String,
    /// Description HTML.
    pub body_html: String,
    /// Product type.
    pub product_type: String,
    /// Variants, one per sheet row.
    pub variants: Vec<NewVariant>,
    /// Option names; empty when the product has a single default option.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<NewOption>,
    /// Metafields to attach.
    pub metafields: Vec<NewMetafield>,
    /// Images as base64 attachments.
    pub images: Vec<NewImage>,
}

/// Variant payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewVariant {
    /// Price as a decimal string.
    pub price: String,
    /// Always `shopify` so the quantity is tracked.
    pub inventory_management: String,
    /// Starting quantity.
    pub inventory_quantity: i64,
    /// First option value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option1: Option<String>,
}

/// Option payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOption {
    /// Option name.
    pub name: String,
}

/// Metafield payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMetafield {
    /// Metafield namespace.
    pub namespace: String,
    /// Metafield key.
    pub key: String,
    /// Value.
    pub value: String,
    /// Metafield type.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Image attachment payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewImage {
    /// Base64 image bytes.
    pub attachment: String,
    /// Original file name.
    pub filename: String,
}

/// A product created through REST.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedProduct {
    /// Numeric id.
    pub id: u64,
    /// Title as stored.
    pub title: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_next_cursor() {
        let page: Connection<ProductSummary> = serde_json::from_value(serde_json::json!({
            "nodes": [{ "id": "gid://shopify/Product/1", "title": "Onyx" }],
            "pageInfo": { "hasNextPage": true, "endCursor": "abc" }
        }))
        .unwrap();
        assert_eq!(page.next_cursor(), Some("abc"));

        let last: Connection<ProductSummary> = serde_json::from_value(serde_json::json!({
            "nodes": [],
            "pageInfo": { "hasNextPage": false, "endCursor": "abc" }
        }))
        .unwrap();
        assert_eq!(last.next_cursor(), None);
    }

    #[test]
    fn test_format_user_errors() {
        let errors = vec![
            UserError {
                field: Some(vec!["input".to_string(), "seo".to_string()]),
                message: "is invalid".to_string(),
            },
            UserError {
                field: None,
                message: "Product not found".to_string(),
            },
        ];
        assert_eq!(
            format_user_errors(&errors),
            "input.seo: is invalid; : Product not found"
        );
    }

    #[test]
    fn test_seo_fields_incomplete() {
        let complete = SeoFields {
            title: Some("Title".to_string()),
            description: Some("Description.".to_string()),
        };
        assert!(!complete.is_incomplete());

        let blank = SeoFields {
            title: Some("Title".to_string()),
            description: Some("  ".to_string()),
        };
        assert!(blank.is_incomplete());
        assert!(SeoFields::default().is_incomplete());
    }

    #[test]
    fn test_new_variant_omits_missing_option() {
        let variant = NewVariant {
            price: "12.00".to_string(),
            inventory_management: "shopify".to_string(),
            inventory_quantity: 3,
            option1: None,
        };
        let json = serde_json::to_value(&variant).unwrap();
        assert!(json.get("option1").is_none());
    }
}
