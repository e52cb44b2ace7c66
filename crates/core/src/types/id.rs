//! Shopify global ids.
//!
//! The Admin GraphQL API addresses everything by global id
//! (`gid://shopify/Product/123`) while the REST API and spreadsheets use the
//! bare numeric part. [`ShopifyGid`] converts between the two, and the
//! `define_gid!` macro creates resource-specific wrappers that prevent mixing
//! ids of different resources.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

const GID_PREFIX: &str = "gid://shopify/";

/// Errors that can occur when parsing a [`ShopifyGid`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GidError {
    /// The input string is empty.
    #[error("global id cannot be empty")]
    Empty,
    /// The input is neither a `gid://shopify/...` string nor a number.
    #[error("not a Shopify global id: {0}")]
    Malformed(String),
    /// The gid names a different resource than expected.
    #[error("expected a {expected} id, got {actual}")]
    WrongResource {
        /// Resource the caller asked for.
        expected: &'static str,
        /// Resource found in the input.
        actual: String,
    },
}

/// A parsed Shopify global id.
///
/// Query-string suffixes (`?foo=bar`) that Shopify sometimes appends are
/// dropped during parsing.
///
/// ```
/// use catalog_ops_core::ShopifyGid;
///
/// let gid: ShopifyGid = "gid://shopify/Product/8123".parse().unwrap();
/// assert_eq!(gid.resource(), "Product");
/// assert_eq!(gid.numeric_id(), 8123);
/// assert_eq!(gid.to_string(), "gid://shopify/Product/8123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShopifyGid {
    resource: String,
    id: u64,
}

impl ShopifyGid {
    /// Build a gid from a resource name and numeric id.
    #[must_use]
    pub fn new(resource: impl Into<String>, id: u64) -> Self {
        Self {
            resource: resource.into(),
            id,
        }
    }

    /// Parse a full gid string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not of the form
    /// `gid://shopify/<Resource>/<number>`.
    pub fn parse(s: &str) -> Result<Self, GidError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GidError::Empty);
        }

        let rest = s
            .strip_prefix(GID_PREFIX)
            .ok_or_else(|| GidError::Malformed(s.to_owned()))?;
        let rest = rest.split('?').next().unwrap_or(rest);
        let (resource, id) = rest
            .split_once('/')
            .ok_or_else(|| GidError::Malformed(s.to_owned()))?;

        if resource.is_empty() {
            return Err(GidError::Malformed(s.to_owned()));
        }
        let id = id
            .parse::<u64>()
            .map_err(|_| GidError::Malformed(s.to_owned()))?;

        Ok(Self::new(resource, id))
    }

    /// Parse either a full gid or a bare numeric id for the given resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed or names another resource.
    pub fn parse_for(resource: &'static str, s: &str) -> Result<Self, GidError> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<u64>() {
            return Ok(Self::new(resource, id));
        }

        let gid = Self::parse(trimmed)?;
        if gid.resource != resource {
            return Err(GidError::WrongResource {
                expected: resource,
                actual: gid.resource,
            });
        }
        Ok(gid)
    }

    /// The resource name (e.g. `Product`).
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The numeric id used by the REST API.
    #[must_use]
    pub const fn numeric_id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for ShopifyGid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{GID_PREFIX}{}/{}", self.resource, self.id)
    }
}

impl FromStr for ShopifyGid {
    type Err = GidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShopifyGid {
    type Error = GidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopifyGid> for String {
    fn from(gid: ShopifyGid) -> Self {
        gid.to_string()
    }
}

/// Macro to define a resource-specific gid wrapper.
///
/// Creates a newtype wrapper around [`ShopifyGid`] with:
/// - `Serialize`/`Deserialize` as the full gid string
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()` accepting either the gid or the bare numeric id
/// - `numeric_id()` and `Display` as the full gid
///
/// # Example
///
/// ```rust
/// # use catalog_ops_core::define_gid;
/// define_gid!(ThemeGid, "OnlineStoreTheme");
///
/// let theme = ThemeGid::parse("42").unwrap();
/// assert_eq!(theme.to_string(), "gid://shopify/OnlineStoreTheme/42");
/// ```
#[macro_export]
macro_rules! define_gid {
    ($name:ident, $resource:literal) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name($crate::ShopifyGid);

        impl $name {
            /// Build from a numeric id.
            #[must_use]
            pub fn new(id: u64) -> Self {
                Self($crate::ShopifyGid::new($resource, id))
            }

            /// Parse a full gid or a bare numeric id.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is malformed or names another resource.
            pub fn parse(s: &str) -> ::core::result::Result<Self, $crate::GidError> {
                $crate::ShopifyGid::parse_for($resource, s).map(Self)
            }

            /// The numeric id used by the REST API.
            #[must_use]
            pub const fn numeric_id(&self) -> u64 {
                self.0.numeric_id()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::GidError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::GidError;

            fn try_from(value: String) -> ::core::result::Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

define_gid!(ProductGid, "Product");
define_gid!(CollectionGid, "Collection");
