//! Plugin name matching
//!
//! Senders report the same plugin under slightly different names
//! ("Cool Timeline", "cool timeline", "Cool-Timeline"). Two names match when,
//! in order:
//! 1. they are equal ignoring case and surrounding whitespace
//! 2. they are equal after lower-casing and removing all whitespace
//! 3. their character similarity is at least 85%
//!
//! Similarity follows the longest-common-substring recursion (matched
//! characters counted twice over the combined length), not edit distance.
//! The recursion picks the first longest substring, which can make it
//! direction-dependent; the score used is the larger of both directions.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Minimum similarity (percent) for two names to be the same plugin
pub const SIMILARITY_THRESHOLD: f64 = 85.0;

/// Lower-case and strip all whitespace
pub fn normalize(name: &str) -> String {
    WHITESPACE.replace_all(name.trim(), "").to_lowercase()
}

/// Whether `a` and `b` name the same plugin
pub fn is_same_plugin(a: &str, b: &str) -> bool {
    PluginMatcher::new(b).matches(a)
}

/// Symmetric similarity percentage of two strings (0.0 ..= 100.0)
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    similarity_chars(&a, &b)
}

fn similarity_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let common = common_chars(a, b).max(common_chars(b, a));
    common as f64 * 2.0 * 100.0 / total as f64
}

/// Characters shared by `a` and `b` under the longest-common-substring recursion
fn common_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (mut pos_a, mut pos_b, mut max) = (0, 0, 0);
    for i in 0..a.len() {
        for j in 0..b.len() {
            let mut k = 0;
            while i + k < a.len() && j + k < b.len() && a[i + k] == b[j + k] {
                k += 1;
            }
            if k > max {
                pos_a = i;
                pos_b = j;
                max = k;
            }
        }
    }

    if max == 0 {
        return 0;
    }

    max + common_chars(&a[..pos_a], &b[..pos_b])
        + common_chars(&a[pos_a + max..], &b[pos_b + max..])
}

/// One side of a comparison, prepared once and matched against many names
#[derive(Debug, Clone)]
pub struct PluginMatcher {
    trimmed_lower: String,
    normalized: Vec<char>,
}

impl PluginMatcher {
    pub fn new(name: &str) -> Self {
        Self {
            trimmed_lower: name.trim().to_lowercase(),
            normalized: normalize(name).chars().collect(),
        }
    }

    pub fn matches(&self, other: &str) -> bool {
        if other.trim().to_lowercase() == self.trimmed_lower {
            return true;
        }

        let other: Vec<char> = normalize(other).chars().collect();
        if other == self.normalized {
            return true;
        }

        similarity_chars(&other, &self.normalized) >= SIMILARITY_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        for name in ["Cool Timeline", "", "  ", "Événements Pro", "a"] {
            assert!(is_same_plugin(name, name), "{name:?} should match itself");
        }
    }

    #[test]
    fn test_case_and_whitespace() {
        assert!(is_same_plugin("Cool Timeline", "  cool timeline "));
        assert!(is_same_plugin("Cool Timeline", "COOLTIMELINE"));
        assert!(is_same_plugin("Cool\tTime line", "cool timeline"));
    }

    #[test]
    fn test_hyphenated_variant() {
        assert!(is_same_plugin("Cool Timeline", "cool-timeline"));
        assert_eq!(similarity("cooltimeline", "cool-timeline"), 96.0);
    }

    #[test]
    fn test_different_plugins() {
        assert!(!is_same_plugin("Cool Timeline", "Elementor"));
        assert!(!is_same_plugin("Cool Timeline", "Timeline Widget"));
        assert!(!is_same_plugin("Events Calendar", "Events Calendar Pro Add-ons"));
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("Cool Timeline", "cool-timeline"),
            ("Cool Timeline Pro", "Cool Timeline"),
            ("abcab", "bcaba"),
            ("Loco Translate", "Locotranslate Plus"),
            ("Elementor", "Elementor Pro"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} / {b:?}");
            assert_eq!(is_same_plugin(a, b), is_same_plugin(b, a), "{a:?} / {b:?}");
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 100.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("abc", "abc"), 100.0);
    }

    #[test]
    fn test_matcher_reuse() {
        let matcher = PluginMatcher::new("Cool Timeline");
        assert!(matcher.matches("cool timeline"));
        assert!(matcher.matches("Cool-Timeline"));
        assert!(!matcher.matches("Elementor"));
    }
}
