//! Records flowing through the fetch-reduce pipeline.
//!
//! A fetcher produces [`Page`]s of [`RawRecord`]s (whatever JSON shape the
//! source speaks); a normalizer turns each raw record into exactly one
//! [`CanonicalRecord`], which is moved into the reducer and dropped there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque continuation token returned by a paginated source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Cursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record in the source's own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(serde_json::Value);

impl RawRecord {
    /// Wrap a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON.
    #[must_use]
    pub const fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Look up a top-level string field, treating blank strings as absent.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl From<serde_json::Value> for RawRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One page of a paginated source.
///
/// `next_cursor == None` means the stream is exhausted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Records in source order.
    pub records: Vec<RawRecord>,
    /// Token for the following page.
    pub next_cursor: Option<Cursor>,
}

impl Page {
    /// A page with no successor.
    #[must_use]
    pub const fn last(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    /// Whether this is the final page.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// An image attached to a catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordImage {
    /// Image id (gid when it came from the Admin API).
    pub id: Option<String>,
    /// Image URL.
    pub url: String,
    /// Alt text.
    pub alt_text: Option<String>,
    /// Width in pixels.
    pub width: Option<i64>,
    /// Height in pixels.
    pub height: Option<i64>,
}

/// The normalized form every reducer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Unique within one catalog.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Stock quantity. Negative values come from oversold stock and are a risk signal.
    pub quantity: i64,
    /// Source-specific extras (handle, sku, seo fields, ...).
    pub attributes: BTreeMap<String, String>,
    /// Nested images, empty for shapes that carry none.
    pub images: Vec<RecordImage>,
}

impl CanonicalRecord {
    /// Create a record with no attributes or images.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            quantity,
            attributes: BTreeMap::new(),
            images: Vec::new(),
        }
    }

    /// Builder-style attribute insert.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_field_ignores_blank() {
        let raw = RawRecord::new(serde_json::json!({
            "title": "  ",
            "handle": "amethyst-beads",
            "count": 3
        }));
        assert_eq!(raw.str_field("title"), None);
        assert_eq!(raw.str_field("handle"), Some("amethyst-beads"));
        assert_eq!(raw.str_field("count"), None);
        assert_eq!(raw.str_field("missing"), None);
    }

    #[test]
    fn test_page_is_last() {
        assert!(Page::last(vec![]).is_last());
        let page = Page {
            records: vec![],
            next_cursor: Some(Cursor::new("abc")),
        };
        assert!(!page.is_last());
    }

    #[test]
    fn test_canonical_record_attributes() {
        let record = CanonicalRecord::new("1", "Garnet Rondelle", 4).with_attribute("sku", "GR-4");
        assert_eq!(record.attribute("sku"), Some("GR-4"));
        assert_eq!(record.attribute("handle"), None);
    }
}
