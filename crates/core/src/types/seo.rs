//! SEO title/description rules.
//!
//! Search engines truncate titles past ~60 characters and descriptions past
//! ~160, so generated metadata is clamped to those limits without leaving a
//! half sentence behind.

use serde::{Deserialize, Serialize};

/// Minimum title length considered good.
pub const TITLE_MIN_CHARS: usize = 50;
/// Maximum title length.
pub const TITLE_MAX_CHARS: usize = 60;
/// Minimum description length considered good.
pub const DESCRIPTION_MIN_CHARS: usize = 150;
/// Maximum description length.
pub const DESCRIPTION_MAX_CHARS: usize = 160;

/// A sentence end must land past this char index to be used as a cut point.
const MIN_SENTENCE_CUT: usize = 100;
/// A word boundary must land past this char index to be used as a cut point.
const MIN_WORD_CUT: usize = 80;

/// SEO title and meta description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    /// `<title>` tag content.
    pub title: String,
    /// Meta description.
    pub description: String,
}

/// A quality problem with a piece of SEO metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeoIssue {
    #[error("Missing title")]
    MissingTitle,
    #[error("Title too short ({0} chars, needs {TITLE_MIN_CHARS}+)")]
    TitleTooShort(usize),
    #[error("Title too long ({0} chars, needs {TITLE_MAX_CHARS} max)")]
    TitleTooLong(usize),
    #[error("Missing description")]
    MissingDescription,
    #[error("Description too short ({0} chars, needs {DESCRIPTION_MIN_CHARS}+)")]
    DescriptionTooShort(usize),
    #[error("Description too long ({0} chars, needs {DESCRIPTION_MAX_CHARS} max)")]
    DescriptionTooLong(usize),
    #[error("Description doesn't end with proper punctuation")]
    DescriptionUnpunctuated,
}

impl SeoMetadata {
    /// Build metadata, clamping both fields to their limits.
    #[must_use]
    pub fn clamped(title: &str, description: &str) -> Self {
        Self {
            title: take_chars(title.trim(), TITLE_MAX_CHARS),
            description: fit_description(description.trim()),
        }
    }

    /// Deterministic metadata used when text generation is unavailable.
    #[must_use]
    pub fn fallback(
        product_title: &str,
        product_type: Option<&str>,
        vendor: &str,
        body: Option<&str>,
    ) -> Self {
        let product_type = product_type.map(str::trim).filter(|t| !t.is_empty());

        let title = product_type.map_or_else(
            || format!("{product_title} | {vendor}"),
            |kind| format!("{product_title} | {kind} | {vendor}"),
        );

        let mut description = format!("Shop {product_title} online. ");
        if let Some(kind) = product_type {
            description.push_str(&format!("Premium {} ", kind.to_lowercase()));
        }
        description.push_str(&format!("from {vendor}. "));
        if let Some(body) = body {
            let snippet = take_chars(body, 80).replace('\n', " ");
            description.push_str(snippet.trim());
        }
        description.push_str(" Order now!");

        Self::clamped(&title, &description)
    }

    /// List every quality issue; empty means the metadata is good.
    #[must_use]
    pub fn issues(&self) -> Vec<SeoIssue> {
        let mut issues = Vec::new();

        let title_len = self.title.chars().count();
        if title_len == 0 {
            issues.push(SeoIssue::MissingTitle);
        } else if title_len < TITLE_MIN_CHARS {
            issues.push(SeoIssue::TitleTooShort(title_len));
        } else if title_len > TITLE_MAX_CHARS {
            issues.push(SeoIssue::TitleTooLong(title_len));
        }

        let description_len = self.description.chars().count();
        if description_len == 0 {
            issues.push(SeoIssue::MissingDescription);
        } else if description_len < DESCRIPTION_MIN_CHARS {
            issues.push(SeoIssue::DescriptionTooShort(description_len));
        } else if description_len > DESCRIPTION_MAX_CHARS {
            issues.push(SeoIssue::DescriptionTooLong(description_len));
        } else if !ends_sentence(&self.description) {
            issues.push(SeoIssue::DescriptionUnpunctuated);
        }

        issues
    }

    /// Whether [`Self::issues`] is empty.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.issues().is_empty()
    }
}

fn ends_sentence(s: &str) -> bool {
    s.ends_with(['.', '!', '?'])
}

/// First `n` chars of `s` (char-boundary safe).
fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Fit a description into [`DESCRIPTION_MAX_CHARS`].
///
/// Prefers the last sentence end past char 100, then the last space past
/// char 80 (with an ellipsis), then a hard cut. Short descriptions just get
/// terminal punctuation.
fn fit_description(description: &str) -> String {
    let chars: Vec<char> = description.chars().collect();

    if chars.len() <= DESCRIPTION_MAX_CHARS {
        if description.is_empty() || ends_sentence(description) {
            return description.to_owned();
        }
        return format!("{}.", description.trim_end());
    }

    let window = chars.get(..DESCRIPTION_MAX_CHARS).unwrap_or(&chars);

    let sentence_end = window.iter().rposition(|c| matches!(c, '.' | '!' | '?'));
    if let Some(end) = sentence_end.filter(|&end| end > MIN_SENTENCE_CUT) {
        return window.iter().take(end + 1).collect();
    }

    let last_space = window.iter().rposition(|c| *c == ' ');
    if let Some(space) = last_space.filter(|&space| space > MIN_WORD_CUT) {
        let mut cut: String = window.iter().take(space).collect();
        cut.push_str("...");
        return cut;
    }

    window.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(len: usize, end: char) -> String {
        let mut s = "a".repeat(len - 1);
        s.push(end);
        s
    }

    #[test]
    fn test_title_is_clamped_to_sixty_chars() {
        let meta = SeoMetadata::clamped(&"T".repeat(75), "Short.");
        assert_eq!(meta.title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn test_short_description_gets_period() {
        let meta = SeoMetadata::clamped("Title", "Buy amethyst beads today");
        assert_eq!(meta.description, "Buy amethyst beads today.");

        let meta = SeoMetadata::clamped("Title", "Already punctuated!");
        assert_eq!(meta.description, "Already punctuated!");
    }

    #[test]
    fn test_long_description_cut_at_sentence_end() {
        // 120-char first sentence, then filler past the limit.
        let first = sentence(120, '.');
        let input = format!("{first} {}", "b".repeat(80));
        let meta = SeoMetadata::clamped("Title", &input);
        assert_eq!(meta.description, first);
    }

    #[test]
    fn test_long_description_cut_at_word_boundary() {
        // Sentence end too early (index 10), word boundary at 90.
        let input = format!("{} {} {}", sentence(10, '.'), "c".repeat(79), "d".repeat(100));
        let meta = SeoMetadata::clamped("Title", &input);
        assert!(meta.description.ends_with("..."));
        assert_eq!(meta.description.chars().count(), 90 + 3);
    }

    #[test]
    fn test_long_description_hard_cut() {
        let input = "x".repeat(300);
        let meta = SeoMetadata::clamped("Title", &input);
        assert_eq!(meta.description.chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn test_multibyte_description_does_not_panic() {
        let input = "é".repeat(200);
        let meta = SeoMetadata::clamped("Titré", &input);
        assert_eq!(meta.description.chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn test_issues_for_good_metadata() {
        let meta = SeoMetadata {
            title: "t".repeat(55),
            description: sentence(155, '.'),
        };
        assert!(meta.is_good());
    }

    #[test]
    fn test_issues_reported() {
        let meta = SeoMetadata {
            title: String::new(),
            description: sentence(155, 'x'),
        };
        assert_eq!(
            meta.issues(),
            vec![SeoIssue::MissingTitle, SeoIssue::DescriptionUnpunctuated]
        );

        let meta = SeoMetadata {
            title: "short".to_string(),
            description: "tiny.".to_string(),
        };
        assert_eq!(
            meta.issues(),
            vec![SeoIssue::TitleTooShort(5), SeoIssue::DescriptionTooShort(5)]
        );
    }

    #[test]
    fn test_issue_messages() {
        assert_eq!(
            SeoIssue::TitleTooLong(72).to_string(),
            "Title too long (72 chars, needs 60 max)"
        );
    }

    #[test]
    fn test_fallback_includes_type_and_vendor() {
        let meta = SeoMetadata::fallback("Lapis Heishi", Some("Beads"), "GemHouse", None);
        assert_eq!(meta.title, "Lapis Heishi | Beads | GemHouse");
        assert!(meta.description.starts_with("Shop Lapis Heishi online. Premium beads from GemHouse."));
        assert!(meta.description.ends_with("Order now!"));
    }

    #[test]
    fn test_fallback_without_type() {
        let meta = SeoMetadata::fallback("Lapis Heishi", Some("  "), "GemHouse", Some("Hand cut\nstones"));
        assert_eq!(meta.title, "Lapis Heishi | GemHouse");
        assert!(meta.description.contains("Hand cut stones"));
    }
}
