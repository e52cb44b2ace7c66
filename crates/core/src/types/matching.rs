//! Offline-to-online match candidates.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A similarity-scored pairing of an offline name with an online record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Name as written in the offline source.
    pub offline_name: String,
    /// Online record id.
    pub online_id: String,
    /// Online record title.
    pub online_title: String,
    /// Similarity in `[0, 1]`; `1.0` is an exact match.
    pub score: f64,
}

impl MatchCandidate {
    /// Ranking order: higher score first, then lexicographically smaller id.
    ///
    /// Sorting a slice with this comparator puts the best candidate first.
    #[must_use]
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.online_id.cmp(&other.online_id))
    }

    /// Whether `self` should replace `current` as the best candidate.
    #[must_use]
    pub fn beats(&self, current: &Self) -> bool {
        self.rank(current) == Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f64) -> MatchCandidate {
        MatchCandidate {
            offline_name: "Ruby Drop".to_string(),
            online_id: id.to_string(),
            online_title: format!("title {id}"),
            score,
        }
    }

    #[test]
    fn test_rank_prefers_higher_score() {
        let mut candidates = vec![candidate("a", 0.5), candidate("b", 0.9), candidate("c", 0.7)];
        candidates.sort_by(MatchCandidate::rank);
        assert_eq!(candidates[0].online_id, "b");
        assert_eq!(candidates[2].online_id, "a");
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let low_id = candidate("gid://shopify/Product/1", 0.9);
        let high_id = candidate("gid://shopify/Product/2", 0.9);
        assert!(low_id.beats(&high_id));
        assert!(!high_id.beats(&low_id));
        assert!(!low_id.beats(&low_id));
    }
}
