//! Name normalization and fuzzy comparison.
//!
//! Catalog designations arrive with inconsistent dash encodings (en dash, em
//! dash, minus sign, figure dash), stray whitespace, and mixed case. Every
//! name comparison in the crate goes through [`normalize_name`] first so that
//! those variations never produce duplicate sources.

/// Unicode dash variants that show up in catalog designations.
const UNICODE_DASHES: [char; 4] = ['\u{2012}', '\u{2013}', '\u{2014}', '\u{2212}'];

/// Replace figure dash, en dash, em dash, and minus sign with an ASCII
/// hyphen. A name with none of those characters is returned unchanged.
pub fn strip_unicode_dashes(name: &str) -> String {
    name.chars()
        .map(|c| if UNICODE_DASHES.contains(&c) { '-' } else { c })
        .collect()
}

/// Canonical comparison form: dashes normalized, whitespace trimmed and
/// collapsed, case folded.
pub fn normalize_name(name: &str) -> String {
    strip_unicode_dashes(name)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Levenshtein edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row rolling table.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;

        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost)
                .min(prev[j + 1] + 1)
                .min(cur[j] + 1);
        }

        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b.len()]
}

/// Maximum edit distance the fuzzy matcher accepts for a pair of normalized
/// names: one edit is always allowed, plus one more per five characters of
/// the longer name.
pub fn fuzzy_tolerance(a: &str, b: &str) -> usize {
    let longer = a.chars().count().max(b.chars().count());
    (longer / 5).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_variants_become_ascii_hyphens() {
        let cases = [
            ("CWISE J221706.28\u{2013}145437.6", "CWISE J221706.28-145437.6"), // en dash
            ("2MASS J20115649\u{2014}6201127", "2MASS J20115649-6201127"),     // em dash
            ("1234\u{2212}5678", "1234-5678"),                                 // minus sign
            ("9W34\u{2012}aou", "9W34-aou"),                                   // figure dash
            ("should-work", "should-work"),
        ];

        for (input, expected) in cases {
            assert_eq!(strip_unicode_dashes(input), expected);
        }
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  LHS   2924 "), "lhs 2924");
        assert_eq!(
            normalize_name("CWISE J221706.28\u{2013}145437.6"),
            "cwise j221706.28-145437.6"
        );
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("lhs 292", "lhs 2924"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn tolerance_scales_with_length() {
        assert_eq!(fuzzy_tolerance("abc", "abd"), 1);
        assert_eq!(fuzzy_tolerance("lhs 292", "lhs 2924"), 1);
        assert_eq!(fuzzy_tolerance("2mass j07222760-0540384", "x"), 4);
    }
}
