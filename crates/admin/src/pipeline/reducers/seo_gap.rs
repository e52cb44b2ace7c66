//! Products missing SEO metadata.

use serde::Serialize;

use catalog_ops_core::CanonicalRecord;

use crate::pipeline::Reducer;
use crate::pipeline::normalize::attr;

/// A product that needs SEO metadata, with the context a prompt needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoCandidate {
    /// Product id.
    pub id: String,
    /// Product title.
    pub title: String,
    /// Product type.
    pub product_type: Option<String>,
    /// Vendor.
    pub vendor: Option<String>,
    /// Comma-separated tags.
    pub tags: Option<String>,
    /// Description HTML.
    pub description_html: Option<String>,
    /// Existing SEO title.
    pub seo_title: Option<String>,
    /// Existing SEO description.
    pub seo_description: Option<String>,
}

impl SeoCandidate {
    fn from_record(record: CanonicalRecord) -> Self {
        let get = |key: &str| record.attribute(key).map(str::to_string);
        Self {
            product_type: get(attr::PRODUCT_TYPE),
            vendor: get(attr::VENDOR),
            tags: get(attr::TAGS),
            description_html: get(attr::DESCRIPTION_HTML),
            seo_title: get(attr::SEO_TITLE),
            seo_description: get(attr::SEO_DESCRIPTION),
            id: record.id,
            title: record.title,
        }
    }
}

/// Collects products whose SEO title or description is missing, up to a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeoGapReducer {
    /// Maximum candidates to keep.
    pub limit: usize,
}

impl Default for SeoGapReducer {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

/// Running SEO gap scan.
#[derive(Debug, Clone, Default)]
pub struct SeoGapState {
    scanned: usize,
    missing: usize,
    candidates: Vec<SeoCandidate>,
}

/// Final SEO gap scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoGapReport {
    /// Products scanned.
    pub scanned: usize,
    /// Products with complete SEO.
    pub complete: usize,
    /// Products missing SEO, including those past the limit.
    pub missing: usize,
    /// The first `limit` products missing SEO.
    pub candidates: Vec<SeoCandidate>,
}

impl Reducer for SeoGapReducer {
    type State = SeoGapState;
    type Report = SeoGapReport;

    fn init(&self) -> SeoGapState {
        SeoGapState::default()
    }

    fn fold(&self, mut state: SeoGapState, record: CanonicalRecord) -> SeoGapState {
        state.scanned += 1;
        let incomplete = record.attribute(attr::SEO_TITLE).is_none()
            || record.attribute(attr::SEO_DESCRIPTION).is_none();

        if incomplete {
            state.missing += 1;
            if state.candidates.len() < self.limit {
                state.candidates.push(SeoCandidate::from_record(record));
            }
        }
        state
    }

    fn finalize(&self, state: SeoGapState) -> SeoGapReport {
        SeoGapReport {
            scanned: state.scanned,
            complete: state.scanned - state.missing,
            missing: state.missing,
            candidates: state.candidates,
        }
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_incomplete_up_to_limit() {
        let reducer = SeoGapReducer { limit: 2 };
        let records = [
            CanonicalRecord::new("1", "Complete", 0)
                .with_attribute(attr::SEO_TITLE, "T")
                .with_attribute(attr::SEO_DESCRIPTION, "D"),
            CanonicalRecord::new("2", "No Description", 0).with_attribute(attr::SEO_TITLE, "T"),
            CanonicalRecord::new("3", "Nothing", 0).with_attribute(attr::VENDOR, "Gem House"),
            CanonicalRecord::new("4", "Also Nothing", 0),
        ];

        let state = records
            .into_iter()
            .fold(reducer.init(), |state, record| reducer.fold(state, record));
        let report = reducer.finalize(state);

        assert_eq!(report.scanned, 4);
        assert_eq!(report.complete, 1);
        assert_eq!(report.missing, 3);
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.candidates[0].seo_title.as_deref(), Some("T"));
        assert_eq!(report.candidates[1].vendor.as_deref(), Some("Gem House"));
    }
}
