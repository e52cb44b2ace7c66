//! Text similarity for offline-to-online title matching.
//!
//! Scores are in `[0, 1]`. Both inputs are normalized first: lowercased,
//! apostrophes removed, any other non-alphanumeric character turned into a
//! space, whitespace collapsed.

use std::collections::BTreeSet;

/// Normalize text for comparison.
///
/// ```
/// use catalog_ops_admin::pipeline::similarity::normalize_text;
///
/// assert_eq!(normalize_text("  Tiger's-Eye  BEADS, 8mm "), "tigers eye beads 8mm");
/// ```
#[must_use]
pub fn normalize_text(input: &str) -> String {
    let mapped: String = input
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `1 - distance / max_len` over chars; two empty strings are identical.
#[must_use]
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Token-set ratio: compares the shared tokens against each side's
/// shared-plus-remaining tokens and keeps the best ratio.
///
/// Word order and duplicated words do not matter, and a title whose
/// tokens are a subset of the other's scores 1.0.
#[must_use]
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return if tokens_a.is_empty() && tokens_b.is_empty() {
            1.0
        } else {
            0.0
        };
    }

    let join = |tokens: Vec<&str>| tokens.join(" ");
    let intersection = join(tokens_a.intersection(&tokens_b).copied().collect());
    let only_a = join(tokens_a.difference(&tokens_b).copied().collect());
    let only_b = join(tokens_b.difference(&tokens_a).copied().collect());

    let combined = |rest: &str| {
        if intersection.is_empty() {
            rest.to_string()
        } else if rest.is_empty() {
            intersection.clone()
        } else {
            format!("{intersection} {rest}")
        }
    };
    let with_a = combined(&only_a);
    let with_b = combined(&only_b);

    let mut best = levenshtein_ratio(&with_a, &with_b);
    if !intersection.is_empty() {
        best = best
            .max(levenshtein_ratio(&intersection, &with_a))
            .max(levenshtein_ratio(&intersection, &with_b));
    }
    best
}

/// Similarity of two raw titles.
///
/// Equal normalized text scores exactly 1.0; otherwise the larger of the
/// Levenshtein ratio and the token-set ratio.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    score_normalized(&normalize_text(a), &normalize_text(b))
}

/// [`similarity`] for inputs already passed through [`normalize_text`].
#[must_use]
pub fn score_normalized(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    levenshtein_ratio(a, b).max(token_set_ratio(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_levenshtein_ratio_known_values() {
        assert!((levenshtein_ratio("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
        assert!((levenshtein_ratio("", "") - 1.0).abs() < f64::EPSILON);
        assert!(levenshtein_ratio("", "abc").abs() < f64::EPSILON);
        assert!((levenshtein_ratio("flaw", "lawn") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_exact_match_after_normalization() {
        assert!((similarity("Rose Quartz Beads", "rose  quartz, beads") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reordered_words_score_high() {
        let score = similarity("Beads Rose Quartz 8mm", "Rose Quartz 8mm Beads");
        assert!((score - 1.0).abs() < f64::EPSILON, "score was {score}");
    }

    #[test]
    fn test_subset_scores_full_token_set() {
        let score = token_set_ratio("amethyst chips", "amethyst chips 5 8mm");
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unrelated_titles_score_low() {
        assert!(similarity("Lapis Lazuli Rondelle", "Sterling Silver Jump Rings") < 0.5);
    }

    #[test]
    fn test_typo_scores_above_threshold() {
        assert!(similarity("Labradorite Pendant", "Labradorite Pendent") >= 0.85);
    }

    proptest! {
        #[test]
        fn prop_similarity_in_unit_range(a in ".{0,24}", b in ".{0,24}") {
            let score = similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_similarity_is_symmetric(a in "[a-z ]{0,16}", b in "[a-z ]{0,16}") {
            prop_assert!((similarity(&a, &b) - similarity(&b, &a)).abs() < 1e-12);
        }

        #[test]
        fn prop_identical_text_scores_one(a in ".{0,24}") {
            prop_assert!((similarity(&a, &a) - 1.0).abs() < f64::EPSILON);
        }
    }
}
