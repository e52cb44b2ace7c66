//! Core types for Catalog Ops.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod handle;
pub mod id;
pub mod matching;
pub mod price;
pub mod record;
pub mod run;
pub mod seo;

pub use handle::{Handle, HandleError};
pub use id::*;
pub use matching::MatchCandidate;
pub use price::{Price, PriceError};
pub use record::{CanonicalRecord, Cursor, Page, RawRecord, RecordImage};
pub use run::{FailureKind, PipelineState, ProgressSnapshot, RunCounts, RunOutcome};
pub use seo::{SeoIssue, SeoMetadata};
