//! Offline-to-online fuzzy title matching.

use std::collections::HashSet;

use serde::Serialize;

use catalog_ops_core::{CanonicalRecord, MatchCandidate, RawRecord};

use crate::pipeline::Reducer;
use crate::pipeline::similarity::{normalize_text, score_normalized};

/// Default minimum score for a confident match.
pub const DEFAULT_MIN_SCORE: f64 = 0.85;

/// Column carrying the photo folder through to the output.
const PHOTO_FOLDER_COLUMN: &str = "Photo Folder";
/// Column carrying the gemstone name through to the output.
const GEMSTONE_NAME_COLUMN: &str = "Gemstone Name";

/// A name from the offline source, with columns carried to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineItem {
    /// Name to match.
    pub name: String,
    /// `Photo Folder` column, when present.
    pub photo_folder: Option<String>,
    /// `Gemstone Name` column, when present.
    pub gemstone_name: Option<String>,
}

impl OfflineItem {
    /// An item with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            photo_folder: None,
            gemstone_name: None,
        }
    }
}

/// An online record retained for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineEntry {
    /// Record id.
    pub id: String,
    /// Record title.
    pub title: String,
}

/// Whether an offline name found a confident match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchStatus {
    /// Best candidate scored at or above the threshold.
    Matched {
        /// The chosen candidate.
        candidate: MatchCandidate,
    },
    /// No candidate reached the threshold.
    NoConfidentMatch {
        /// Best candidate below the threshold, if the catalog was not empty.
        best: Option<MatchCandidate>,
    },
}

/// Result for one offline name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEntry {
    /// The offline item.
    #[serde(flatten)]
    pub item: OfflineItem,
    /// Match decision.
    #[serde(flatten)]
    pub status: MatchStatus,
}

/// Final match report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    /// Threshold used.
    pub min_score: f64,
    /// Online records compared against.
    pub online_count: usize,
    /// Offline names with a confident match.
    pub matched: usize,
    /// Offline names without one.
    pub unmatched: usize,
    /// One entry per distinct offline name, in input order.
    pub entries: Vec<MatchEntry>,
}

/// Retains the online catalog and matches offline names at finalize.
///
/// The report is only meaningful against the whole catalog, so aborted
/// runs release no partial report.
#[derive(Debug, Clone)]
pub struct FuzzyMatchReducer {
    offline: Vec<OfflineItem>,
    min_score: f64,
}

impl FuzzyMatchReducer {
    /// Build from offline items. Names are trimmed, blank names dropped and
    /// repeated names kept once (first occurrence wins).
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = OfflineItem>) -> Self {
        let mut seen = HashSet::new();
        let offline = items
            .into_iter()
            .filter_map(|mut item| {
                item.name = item.name.trim().to_string();
                (!item.name.is_empty() && seen.insert(item.name.clone())).then_some(item)
            })
            .collect();

        Self {
            offline,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    /// Build from offline rows, reading names from `title_column`.
    #[must_use]
    pub fn from_rows(rows: &[RawRecord], title_column: &str) -> Self {
        Self::new(rows.iter().filter_map(|row| {
            row.str_field(title_column).map(|name| OfflineItem {
                name: name.to_string(),
                photo_folder: row.str_field(PHOTO_FOLDER_COLUMN).map(str::to_string),
                gemstone_name: row.str_field(GEMSTONE_NAME_COLUMN).map(str::to_string),
            })
        }))
    }

    /// Override the confidence threshold.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// The distinct offline items.
    #[must_use]
    pub fn offline_items(&self) -> &[OfflineItem] {
        &self.offline
    }

    fn best_candidate(&self, name: &str, online: &[(OnlineEntry, String)]) -> Option<MatchCandidate> {
        let normalized = normalize_text(name);

        let candidate = |entry: &OnlineEntry, score: f64| MatchCandidate {
            offline_name: name.to_string(),
            online_id: entry.id.clone(),
            online_title: entry.title.clone(),
            score,
        };

        let exact = online
            .iter()
            .filter(|(_, title)| *title == normalized)
            .map(|(entry, _)| entry)
            .min_by(|a, b| a.id.cmp(&b.id));
        if let Some(entry) = exact {
            return Some(candidate(entry, 1.0));
        }

        online
            .iter()
            .map(|(entry, title)| candidate(entry, score_normalized(&normalized, title)))
            .min_by(MatchCandidate::rank)
    }
}

impl Reducer for FuzzyMatchReducer {
    type State = Vec<OnlineEntry>;
    type Report = MatchReport;

    fn init(&self) -> Vec<OnlineEntry> {
        Vec::new()
    }

    fn fold(&self, mut state: Vec<OnlineEntry>, record: CanonicalRecord) -> Vec<OnlineEntry> {
        state.push(OnlineEntry {
            id: record.id,
            title: record.title,
        });
        state
    }

    fn finalize(&self, state: Vec<OnlineEntry>) -> MatchReport {
        let online: Vec<(OnlineEntry, String)> = state
            .into_iter()
            .map(|entry| {
                let normalized = normalize_text(&entry.title);
                (entry, normalized)
            })
            .collect();

        let entries: Vec<MatchEntry> = self
            .offline
            .iter()
            .map(|item| {
                let best = self.best_candidate(&item.name, &online);
                let status = match best {
                    Some(candidate) if candidate.score >= self.min_score => {
                        MatchStatus::Matched { candidate }
                    }
                    best => MatchStatus::NoConfidentMatch { best },
                };
                MatchEntry {
                    item: item.clone(),
                    status,
                }
            })
            .collect();

        let matched = entries
            .iter()
            .filter(|e| matches!(e.status, MatchStatus::Matched { .. }))
            .count();

        MatchReport {
            min_score: self.min_score,
            online_count: online.len(),
            matched,
            unmatched: entries.len() - matched,
            entries,
        }
    }

    fn supports_partial_report(&self) -> bool {
        false
    }
}
