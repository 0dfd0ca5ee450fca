//! # Version Comparison
//!
//! "Ahead" and "behind" are decided on a version vector with fixed
//! precedence: version code when both sides have one, then version text,
//! then code presence, then sequence.

use std::cmp::Ordering;

/// Version vector of a manifest or an installed package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionVector<'a> {
    /// Version text (`1.2.3`, `v2`).
    pub version: Option<&'a str>,
    /// Version code; zero and below count as absent.
    pub version_code: Option<u64>,
    /// Chain sequence.
    pub sequence: Option<u64>,
}

impl<'a> VersionVector<'a> {
    /// Vector with every component.
    pub fn new(version: &'a str, version_code: u64, sequence: u64) -> Self {
        Self {
            version: Some(version),
            version_code: Some(version_code),
            sequence: Some(sequence),
        }
    }
}

/// Positive codes only.
pub fn normalize_version_code(code: Option<u64>) -> Option<u64> {
    code.filter(|c| *c > 0)
}

fn normalize_text(text: Option<&str>) -> &str {
    let trimmed = text.unwrap_or("").trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

fn numeric_parts(text: &str) -> Vec<u64> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
        .collect()
}

/// Compare version texts.
///
/// An empty side loses to a non-empty one. Numeric components are compared
/// left to right with missing components treated as 0; texts without digits
/// fall back to case-insensitive ordering.
pub fn compare_version_text(candidate: Option<&str>, baseline: Option<&str>) -> Ordering {
    let c = normalize_text(candidate);
    let b = normalize_text(baseline);
    match (c.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (false, true) => return Ordering::Greater,
        (true, false) => return Ordering::Less,
        _ => {}
    }
    let c_parts = numeric_parts(c);
    let b_parts = numeric_parts(b);
    if !c_parts.is_empty() || !b_parts.is_empty() {
        let len = c_parts.len().max(b_parts.len());
        for i in 0..len {
            let ord = c_parts.get(i).copied().unwrap_or(0).cmp(&b_parts.get(i).copied().unwrap_or(0));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        return Ordering::Equal;
    }
    c.to_lowercase().cmp(&b.to_lowercase())
}

/// Compare two version vectors.
pub fn compare_version_vector(candidate: &VersionVector<'_>, baseline: &VersionVector<'_>) -> Ordering {
    let c_code = normalize_version_code(candidate.version_code);
    let b_code = normalize_version_code(baseline.version_code);
    let text = compare_version_text(candidate.version, baseline.version);

    if let (Some(c), Some(b)) = (c_code, b_code) {
        return c.cmp(&b).then(text);
    }
    if text != Ordering::Equal {
        return text;
    }
    match (c_code, b_code) {
        (Some(_), None) => return Ordering::Greater,
        (None, Some(_)) => return Ordering::Less,
        _ => {}
    }
    match (candidate.sequence, baseline.sequence) {
        (Some(c), Some(b)) => c.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_numeric_parts() {
        assert_eq!(compare_version_text(Some("1.10.0"), Some("1.9.9")), Ordering::Greater);
        assert_eq!(compare_version_text(Some("v1.2"), Some("1.2.0")), Ordering::Equal);
        assert_eq!(compare_version_text(Some("1.2"), Some("1.2.1")), Ordering::Less);
    }

    #[test]
    fn test_text_empty_sides() {
        assert_eq!(compare_version_text(None, Some(" ")), Ordering::Equal);
        assert_eq!(compare_version_text(Some("1"), None), Ordering::Greater);
        assert_eq!(compare_version_text(Some(""), Some("0.1")), Ordering::Less);
    }

    #[test]
    fn test_text_lexical_fallback() {
        assert_eq!(compare_version_text(Some("Beta"), Some("alpha")), Ordering::Greater);
        assert_eq!(compare_version_text(Some("BETA"), Some("beta")), Ordering::Equal);
    }

    #[test]
    fn test_code_wins_when_both_present() {
        let a = VersionVector::new("1.0.0", 20, 1);
        let b = VersionVector::new("2.0.0", 10, 5);
        assert_eq!(compare_version_vector(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_equal_codes_fall_back_to_text_not_sequence() {
        let a = VersionVector::new("1.0.1", 10, 1);
        let b = VersionVector::new("1.0.0", 10, 9);
        assert_eq!(compare_version_vector(&a, &b), Ordering::Greater);

        let c = VersionVector::new("1.0.0", 10, 9);
        assert_eq!(compare_version_vector(&b, &c), Ordering::Equal);
    }

    #[test]
    fn test_zero_code_counts_as_absent() {
        let with_code = VersionVector::new("1.0.0", 5, 0);
        let without = VersionVector::new("1.0.0", 0, 3);
        assert_eq!(compare_version_vector(&with_code, &without), Ordering::Greater);
        assert_eq!(compare_version_vector(&without, &with_code), Ordering::Less);
    }

    #[test]
    fn test_sequence_is_last_resort() {
        let a = VersionVector { sequence: Some(3), ..Default::default() };
        let b = VersionVector { sequence: Some(2), ..Default::default() };
        assert_eq!(compare_version_vector(&a, &b), Ordering::Greater);
        assert_eq!(compare_version_vector(&VersionVector::default(), &b), Ordering::Less);
    }
}
