//! Trigram shingling and Jaccard similarity over normalized text.
//!
//! Used by the search engine for fuzzy lexical matching and by the
//! maintenance engine's consolidation pass as a fallback similarity signal
//! when one or both records lack an embedding.

use std::collections::HashSet;

/// Generate the set of overlapping 3-character shingles of `text`.
///
/// The text is lowercased and padded with two spaces on each side
/// before windowing, so short inputs (1-2 chars) still produce at least
/// one trigram and boundary characters participate in a shingle. Shingles
/// that are entirely whitespace are dropped.
pub fn trigrams(text: &str) -> HashSet<String> {
    let normalized = format!("  {}  ", text.trim().to_lowercase());
    let chars: Vec<char> = normalized.chars().collect();

    if chars.len() < 3 {
        return HashSet::new();
    }

    let mut set = HashSet::with_capacity(chars.len().saturating_sub(2));
    for window in chars.windows(3) {
        if window.iter().all(|c| c.is_whitespace()) {
            continue;
        }
        set.insert(window.iter().collect());
    }
    set
}

/// Jaccard similarity between two trigram sets: `|A ∩ B| / |A ∪ B|`.
///
/// Returns 0.0 when either set is empty (the union would be empty or the
/// intersection undefined in a meaningful sense).
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return 0.0;
    }
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Convenience wrapper: trigram-shingle both strings and return their
/// Jaccard similarity directly.
pub fn similarity(a: &str, b: &str) -> f32 {
    jaccard(&trigrams(a), &trigrams(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigrams_are_deterministic() {
        let text = "The quick brown Fox";
        assert_eq!(trigrams(text), trigrams(text));
    }

    #[test]
    fn identical_text_has_jaccard_one() {
        let t = trigrams("hexvera systems");
        assert!(!t.is_empty());
        assert_eq!(jaccard(&t, &t), 1.0);
    }

    #[test]
    fn empty_sets_have_zero_similarity() {
        let empty = HashSet::new();
        let nonempty = trigrams("abc");
        assert_eq!(jaccard(&empty, &nonempty), 0.0);
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }

    #[test]
    fn case_insensitive_by_construction() {
        assert_eq!(trigrams("ABC"), trigrams("abc"));
    }

    #[test]
    fn disjoint_text_has_low_similarity() {
        let s = similarity("quantum mechanics", "banana bread recipe");
        assert!(s < 0.2);
    }

    #[test]
    fn short_text_still_produces_trigrams() {
        assert!(!trigrams("hi").is_empty());
    }

    #[test]
    fn whitespace_only_trigrams_are_dropped() {
        let t = trigrams("a");
        for shingle in &t {
            assert!(!shingle.chars().all(|c| c.is_whitespace()));
        }
    }
}
