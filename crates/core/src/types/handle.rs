//! URL handles.
//!
//! Shopify addresses products, collections and articles by a lowercase,
//! hyphen-separated handle derived from the title.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Longest handle Shopify accepts.
pub const MAX_HANDLE_LEN: usize = 255;

/// Errors that can occur when building a [`Handle`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// Nothing alphanumeric was left after slugging.
    #[error("cannot derive a handle from {0:?}")]
    Empty(String),
}

/// A validated URL handle (`[a-z0-9]+(-[a-z0-9]+)*`, at most 255 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Slug a title: lowercase, collapse runs of non `[a-z0-9]` into one
    /// hyphen, trim hyphens from both ends, cap at [`MAX_HANDLE_LEN`].
    ///
    /// ```
    /// use catalog_ops_core::Handle;
    ///
    /// let handle = Handle::from_title("  Rose Quartz -- 8mm Rounds! ").unwrap();
    /// assert_eq!(handle.as_str(), "rose-quartz-8mm-rounds");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Empty`] if the title has no ASCII alphanumerics.
    pub fn from_title(title: &str) -> Result<Self, HandleError> {
        let mut slug = String::with_capacity(title.len());
        let mut pending_hyphen = false;

        for c in title.chars().flat_map(char::to_lowercase) {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c);
            } else {
                pending_hyphen = true;
            }
        }

        if slug.is_empty() {
            return Err(HandleError::Empty(title.to_owned()));
        }

        slug.truncate(MAX_HANDLE_LEN);
        let trimmed_len = slug.trim_end_matches('-').len();
        slug.truncate(trimmed_len);

        Ok(Self(slug))
    }

    /// The handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
