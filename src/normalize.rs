//! Label string normalization.
//!
//! Free-text labels from the labeling stage vary in casing, spacing and
//! punctuation. Normalization folds those differences away so that
//! "Billing Issue!" and "billing  issue" compare as the same key.

use regex::Regex;
use std::sync::LazyLock;

/// Runs of anything that is not a letter or a digit.
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{M}\p{N}]+").expect("static regex is valid"));

/// Lower-case, strip punctuation, collapse whitespace.
///
/// Returns an empty string for blank or punctuation-only input.
pub fn normalize_label(raw: &str) -> String {
    let lower = raw.to_lowercase();
    NON_WORD.replace_all(&lower, " ").trim().to_string()
}

/// Split a normalized key into its whitespace tokens.
pub fn tokens(key: &str) -> impl Iterator<Item = &str> {
    key.split(' ').filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_spacing() {
        assert_eq!(normalize_label("Billing Issue"), "billing issue");
        assert_eq!(normalize_label("  billing \t  issue\n"), "billing issue");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize_label("Billing-Issue!!"), "billing issue");
        assert_eq!(normalize_label("refund (request)"), "refund request");
        assert_eq!(normalize_label("Q&A"), "q a");
    }

    #[test]
    fn test_normalize_keeps_accents_and_digits() {
        assert_eq!(normalize_label("Problème de Facturation"), "problème de facturation");
        assert_eq!(normalize_label("Plan 2024"), "plan 2024");
    }

    #[test]
    fn test_normalize_blank() {
        assert_eq!(normalize_label(""), "");
        assert_eq!(normalize_label("   "), "");
        assert_eq!(normalize_label("?!..."), "");
    }

    #[test]
    fn test_tokens() {
        let t: Vec<&str> = tokens("billing issue late").collect();
        assert_eq!(t, vec!["billing", "issue", "late"]);
        assert_eq!(tokens("").count(), 0);
    }
}
