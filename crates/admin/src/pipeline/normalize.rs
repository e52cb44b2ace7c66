//! Normalizers from source-shaped records to [`CanonicalRecord`].

use serde_json::Value;

use catalog_ops_core::{CanonicalRecord, RawRecord, RecordImage};

use super::fetcher::{ROW_NUMBER_FIELD, nested_nodes};
use super::{MalformedRecord, Normalizer};

/// Attribute keys set by [`ProductNormalizer`].
pub mod attr {
    /// URL handle.
    pub const HANDLE: &str = "handle";
    /// Vendor name.
    pub const VENDOR: &str = "vendor";
    /// Product type.
    pub const PRODUCT_TYPE: &str = "productType";
    /// Comma-separated tags.
    pub const TAGS: &str = "tags";
    /// Current SEO title.
    pub const SEO_TITLE: &str = "seoTitle";
    /// Current SEO description.
    pub const SEO_DESCRIPTION: &str = "seoDescription";
    /// Description HTML.
    pub const DESCRIPTION_HTML: &str = "descriptionHtml";
    /// Variant SKU.
    pub const SKU: &str = "sku";
    /// Variant price.
    pub const PRICE: &str = "price";
    /// Parent product id of a variant.
    pub const PRODUCT_ID: &str = "productId";
    /// Parent product handle of a variant.
    pub const PRODUCT_HANDLE: &str = "productHandle";
    /// Prefix for selected variant options.
    pub const OPTION_PREFIX: &str = "option:";
}

fn string_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Product nodes from the Admin API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductNormalizer;

impl Normalizer for ProductNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord, MalformedRecord> {
        let value = raw.value();
        let id = raw.str_field("id").ok_or(MalformedRecord::MissingField("id"))?;
        let title = raw
            .str_field("title")
            .ok_or(MalformedRecord::MissingField("title"))?;

        let quantity = value
            .get("totalInventory")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| {
                nested_nodes(value, "variants")
                    .into_iter()
                    .filter_map(|v| v.get("inventoryQuantity").and_then(Value::as_i64))
                    .sum()
            });

        let mut record = CanonicalRecord::new(id, title, quantity);

        let fields = [
            (attr::HANDLE, "/handle"),
            (attr::VENDOR, "/vendor"),
            (attr::PRODUCT_TYPE, "/productType"),
            (attr::SEO_TITLE, "/seo/title"),
            (attr::SEO_DESCRIPTION, "/seo/description"),
            (attr::DESCRIPTION_HTML, "/descriptionHtml"),
        ];
        for (key, pointer) in fields {
            if let Some(found) = string_at(value, pointer) {
                record.attributes.insert(key.to_string(), found.to_string());
            }
        }

        if let Some(tags) = value.get("tags").and_then(Value::as_array) {
            let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
            if !tags.is_empty() {
                record
                    .attributes
                    .insert(attr::TAGS.to_string(), tags.join(", "));
            }
        }

        record.images = nested_nodes(value, "images")
            .into_iter()
            .filter_map(image_from_node)
            .collect();

        Ok(record)
    }
}

fn image_from_node(node: &Value) -> Option<RecordImage> {
    let url = string_at(node, "/url").or_else(|| string_at(node, "/src"))?;
    Some(RecordImage {
        id: string_at(node, "/id").map(str::to_string),
        url: url.to_string(),
        alt_text: string_at(node, "/altText").map(str::to_string),
        width: node.get("width").and_then(Value::as_i64),
        height: node.get("height").and_then(Value::as_i64),
    })
}

/// Collection nodes from [`CollectionListFetcher`](super::fetcher::CollectionListFetcher).
///
/// Quantity is always 0; the handle is required because it keys the catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionNormalizer;

impl Normalizer for CollectionNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord, MalformedRecord> {
        let id = raw.str_field("id").ok_or(MalformedRecord::MissingField("id"))?;
        let title = raw
            .str_field("title")
            .ok_or(MalformedRecord::MissingField("title"))?;
        let handle = raw
            .str_field("handle")
            .ok_or(MalformedRecord::MissingField("handle"))?;

        Ok(CanonicalRecord::new(id, title, 0).with_attribute(attr::HANDLE, handle))
    }
}

/// Variant records produced by [`RecordShape::Variant`](super::fetcher::RecordShape::Variant).
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantNormalizer;

impl Normalizer for VariantNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord, MalformedRecord> {
        let value = raw.value();
        let id = raw.str_field("id").ok_or(MalformedRecord::MissingField("id"))?;

        let quantity = match value.get("inventoryQuantity") {
            None | Some(Value::Null) => {
                return Err(MalformedRecord::MissingField("inventoryQuantity"));
            }
            Some(found) => found.as_i64().ok_or_else(|| MalformedRecord::InvalidField {
                field: "inventoryQuantity",
                reason: format!("expected an integer, got {found}"),
            })?,
        };

        let variant_title = raw.str_field("title");
        let title = match (string_at(value, "/product/title"), variant_title) {
            (Some(product), Some(variant)) => format!("{product} / {variant}"),
            (Some(product), None) => product.to_string(),
            (None, Some(variant)) => variant.to_string(),
            (None, None) => id.to_string(),
        };

        let mut record = CanonicalRecord::new(id, title, quantity);

        let fields = [
            (attr::SKU, "/sku"),
            (attr::PRICE, "/price"),
            (attr::PRODUCT_ID, "/product/id"),
            (attr::PRODUCT_HANDLE, "/product/handle"),
        ];
        for (key, pointer) in fields {
            if let Some(found) = string_at(value, pointer) {
                record.attributes.insert(key.to_string(), found.to_string());
            }
        }

        if let Some(options) = value.get("selectedOptions").and_then(Value::as_array) {
            for option in options {
                if let (Some(name), Some(option_value)) =
                    (string_at(option, "/name"), string_at(option, "/value"))
                {
                    record
                        .attributes
                        .insert(format!("{}{name}", attr::OPTION_PREFIX), option_value.to_string());
                }
            }
        }

        Ok(record)
    }
}

/// Spreadsheet rows loaded by [`StaticFetcher`](super::fetcher::StaticFetcher).
///
/// Every non-empty cell becomes an attribute keyed by its column header.
#[derive(Debug, Clone)]
pub struct SheetRowNormalizer {
    /// Column holding the title.
    pub title_column: String,
    /// Column holding the id; the row number when unset.
    pub id_column: Option<String>,
    /// Column holding a stock quantity; 0 when unset.
    pub quantity_column: Option<String>,
}

impl Default for SheetRowNormalizer {
    fn default() -> Self {
        Self {
            title_column: "Title".to_string(),
            id_column: None,
            quantity_column: None,
        }
    }
}

pub(crate) fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl Normalizer for SheetRowNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<CanonicalRecord, MalformedRecord> {
        let value = raw.value();
        let cell = |column: &str| value.get(column).and_then(cell_text);

        let title = cell(&self.title_column).ok_or(MalformedRecord::MissingField("title"))?;

        let id = match &self.id_column {
            Some(column) => cell(column).ok_or(MalformedRecord::MissingField("id"))?,
            None => cell(ROW_NUMBER_FIELD).ok_or(MalformedRecord::MissingField("id"))?,
        };

        let quantity = match self.quantity_column.as_deref().and_then(cell) {
            None => 0,
            Some(text) => parse_quantity(&text).ok_or_else(|| MalformedRecord::InvalidField {
                field: "quantity",
                reason: format!("not a whole number: {text}"),
            })?,
        };

        let mut record = CanonicalRecord::new(id, title, quantity);
        if let Some(object) = value.as_object() {
            for (key, cell_value) in object {
                if key == ROW_NUMBER_FIELD {
                    continue;
                }
                if let Some(text) = cell_text(cell_value) {
                    record.attributes.insert(key.clone(), text);
                }
            }
        }

        Ok(record)
    }
}

/// Parse `"12"` or `"12.0"` as 12.
pub(crate) fn parse_quantity(text: &str) -> Option<i64> {
    let text = text.trim().replace(',', "");
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let float = text.parse::<f64>().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    (float.fract() == 0.0 && float.is_finite()).then_some(float as i64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_normalizer_full_node() {
        let raw = RawRecord::new(json!({
            "id": "gid://shopify/Product/1",
            "title": "Moss Agate Rounds",
            "handle": "moss-agate-rounds",
            "vendor": "Gem House",
            "productType": "Beads",
            "tags": ["green", "agate"],
            "descriptionHtml": "<p>Lovely</p>",
            "totalInventory": 12,
            "seo": { "title": null, "description": "Existing" },
            "images": { "nodes": [
                { "id": "gid://shopify/ProductImage/5", "url": "https://cdn/x.jpg", "altText": "", "width": 800, "height": 600 },
                { "id": "gid://shopify/ProductImage/6" }
            ]}
        }));

        let record = ProductNormalizer.normalize(&raw).unwrap();
        assert_eq!(record.quantity, 12);
        assert_eq!(record.attribute(attr::HANDLE), Some("moss-agate-rounds"));
        assert_eq!(record.attribute(attr::TAGS), Some("green, agate"));
        assert_eq!(record.attribute(attr::SEO_TITLE), None);
        assert_eq!(record.attribute(attr::SEO_DESCRIPTION), Some("Existing"));
        assert_eq!(record.images.len(), 1);
        assert_eq!(record.images[0].alt_text, None);
        assert_eq!(record.images[0].width, Some(800));
    }

    #[test]
    fn test_product_normalizer_sums_variants_without_total() {
        let raw = RawRecord::new(json!({
            "id": "gid://shopify/Product/1",
            "title": "Pearl",
            "variants": { "edges": [
                { "node": { "inventoryQuantity": 3 } },
                { "node": { "inventoryQuantity": -1 } }
            ]}
        }));
        assert_eq!(ProductNormalizer.normalize(&raw).unwrap().quantity, 2);
    }

    #[test]
    fn test_product_normalizer_requires_title() {
        let raw = RawRecord::new(json!({ "id": "gid://shopify/Product/1", "title": "" }));
        assert_eq!(
            ProductNormalizer.normalize(&raw),
            Err(MalformedRecord::MissingField("title"))
        );
    }

    #[test]
    fn test_collection_normalizer_requires_handle() {
        let raw = RawRecord::new(json!({
            "id": "gid://shopify/Collection/2",
            "title": "Findings",
            "handle": "findings"
        }));
        let record = CollectionNormalizer.normalize(&raw).unwrap();
        assert_eq!(record.title, "Findings");
        assert_eq!(record.attribute(attr::HANDLE), Some("findings"));

        let raw = RawRecord::new(json!({ "id": "gid://shopify/Collection/2", "title": "Findings" }));
        assert_eq!(
            CollectionNormalizer.normalize(&raw),
            Err(MalformedRecord::MissingField("handle"))
        );
    }

    #[test]
    fn test_variant_normalizer() {
        let raw = RawRecord::new(json!({
            "id": "gid://shopify/ProductVariant/11",
            "title": "6mm",
            "sku": "CIT-6",
            "price": "3.20",
            "inventoryQuantity": -2,
            "selectedOptions": [{ "name": "Size", "value": "6mm" }],
            "product": { "id": "gid://shopify/Product/1", "title": "Citrine", "handle": "citrine" }
        }));

        let record = VariantNormalizer.normalize(&raw).unwrap();
        assert_eq!(record.title, "Citrine / 6mm");
        assert_eq!(record.quantity, -2);
        assert_eq!(record.attribute(attr::SKU), Some("CIT-6"));
        assert_eq!(record.attribute(attr::PRODUCT_HANDLE), Some("citrine"));
        assert_eq!(record.attribute("option:Size"), Some("6mm"));
    }

    #[test]
    fn test_variant_normalizer_requires_quantity() {
        let raw = RawRecord::new(json!({ "id": "v1", "inventoryQuantity": null }));
        assert_eq!(
            VariantNormalizer.normalize(&raw),
            Err(MalformedRecord::MissingField("inventoryQuantity"))
        );
        let raw = RawRecord::new(json!({ "id": "v1", "inventoryQuantity": "many" }));
        assert!(matches!(
            VariantNormalizer.normalize(&raw),
            Err(MalformedRecord::InvalidField { field: "inventoryQuantity", .. })
        ));
    }

    #[test]
    fn test_sheet_row_normalizer_defaults() {
        let raw = RawRecord::new(json!({
            "Title": "Ruby Drop",
            "Photo Folder": "ruby",
            "Gemstone Name": "",
            "_row": 4
        }));
        let record = SheetRowNormalizer::default().normalize(&raw).unwrap();
        assert_eq!(record.id, "4");
        assert_eq!(record.quantity, 0);
        assert_eq!(record.attribute("Photo Folder"), Some("ruby"));
        assert_eq!(record.attribute("Gemstone Name"), None);
        assert_eq!(record.attribute("_row"), None);
    }

    #[test]
    fn test_sheet_row_normalizer_custom_columns() {
        let normalizer = SheetRowNormalizer {
            title_column: "Name".to_string(),
            id_column: Some("SKU".to_string()),
            quantity_column: Some("Stock".to_string()),
        };
        let raw = RawRecord::new(json!({ "Name": "Opal", "SKU": "OP-1", "Stock": "7.0" }));
        let record = normalizer.normalize(&raw).unwrap();
        assert_eq!((record.id.as_str(), record.quantity), ("OP-1", 7));

        let raw = RawRecord::new(json!({ "Name": "Opal", "SKU": "OP-1", "Stock": "lots" }));
        assert!(normalizer.normalize(&raw).is_err());
    }
}
