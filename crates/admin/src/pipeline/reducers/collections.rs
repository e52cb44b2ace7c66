//! The store's collection catalog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use catalog_ops_core::CanonicalRecord;

use crate::pipeline::Reducer;
use crate::pipeline::normalize::attr;

/// One collection as stored in the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    /// Collection gid.
    pub id: String,
    /// Collection title.
    pub title: String,
    /// URL handle; unique within a catalog.
    pub handle: String,
}

/// Folds collection records into a catalog keyed by handle.
///
/// The first record seen for a handle wins. A catalog built from a partial
/// scan would drop collections on replace, so aborted runs release nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionCatalogReducer;

/// Running catalog.
#[derive(Debug, Clone, Default)]
pub struct CollectionCatalogState {
    seen: HashSet<String>,
    entries: Vec<CollectionEntry>,
    duplicates: usize,
}

/// Every collection in cursor order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionCatalog {
    /// Entries, unique by handle.
    pub entries: Vec<CollectionEntry>,
    /// Records dropped because their handle was already taken.
    pub duplicate_handles: usize,
}

impl Reducer for CollectionCatalogReducer {
    type State = CollectionCatalogState;
    type Report = CollectionCatalog;

    fn init(&self) -> CollectionCatalogState {
        CollectionCatalogState::default()
    }

    fn fold(
        &self,
        mut state: CollectionCatalogState,
        record: CanonicalRecord,
    ) -> CollectionCatalogState {
        let Some(handle) = record.attribute(attr::HANDLE).map(str::to_string) else {
            return state;
        };
        if state.seen.insert(handle.clone()) {
            state.entries.push(CollectionEntry {
                id: record.id,
                title: record.title,
                handle,
            });
        } else {
            state.duplicates += 1;
        }
        state
    }

    fn finalize(&self, state: CollectionCatalogState) -> CollectionCatalog {
        CollectionCatalog {
            entries: state.entries,
            duplicate_handles: state.duplicates,
        }
    }

    fn supports_partial_report(&self) -> bool {
        false
    }
}
