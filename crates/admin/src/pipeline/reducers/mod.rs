//! Reducers for each batch job.

mod collections;
mod images;
mod inventory;
mod matching;
mod seo_gap;

pub use collections::{
    CollectionCatalog, CollectionCatalogReducer, CollectionCatalogState, CollectionEntry,
};
pub use images::{ImageMetadataReducer, ImageReport, ImageRow, ImageState, RecordRef};
pub use inventory::{FlaggedRecord, InventoryReport, InventoryRiskReducer, InventoryState, Welford};
pub use matching::{
    FuzzyMatchReducer, MatchEntry, MatchReport, MatchStatus, OfflineItem, OnlineEntry,
};
pub use seo_gap::{SeoCandidate, SeoGapReducer, SeoGapReport, SeoGapState};
