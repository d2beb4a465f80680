//! Location cleaning for geocoding.
//!
//! Upstream locations arrive in many formats:
//! - Plain addresses: `"100 MAIN ST"`
//! - With noise words: `"4800 BLOCK OF FRONT ST"`
//! - Prefixed: `"AT CHENANGO ST / HENRY ST"`
//! - Cross streets: `"1ST ST / MAIN AVE"`, `"COURT ST & WATER ST"`
//! - Block ranges: `"STATE ST - HAWLEY ST"`
//!
//! [`normalize_location`] rewrites these into a single free-form query,
//! and [`cache_key`] derives the cache key for it.

use regex::Regex;
use std::sync::LazyLock;

/// Leading "at " before an address or intersection.
static LEADING_AT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^at\s+").expect("valid regex"));

/// Regex for "BLOCK OF" / "BLK OF" noise in addresses.
static BLOCK_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+BLOCK\s+OF\s+|\s+BLK\s+OF\s+").expect("valid regex"));

/// Regex for standalone "BLOCK" / "BLK" after a house number,
/// with or without a space between the number and the keyword.
static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*(?:BLOCK|BLK)\s+").expect("valid regex"));

/// Cross-street separators: `/`, `&` and `@`, with optional spacing.
static CROSS_STREET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[/&@]\s*").expect("valid regex"));

/// Block range written as a spaced hyphen. Unspaced hyphens are left alone
/// so house-number ranges like `12-14` survive.
static BLOCK_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+-\s+").expect("valid regex"));

/// Runs of commas, with any whitespace around them.
static COMMA_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,[\s,]*").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Non-geocodable location text.
static SKIP_PATTERNS: &[&str] = &[
    "UNKNOWN",
    "N/A",
    "NA",
    "NONE",
    "NOT AVAILABLE",
    "UNDETERMINED",
    "UNSPECIFIED",
];

/// Cleans a free-text location into a geocoding query.
///
/// `locality` (e.g. `"Binghamton, NY"`) is appended when non-empty and not
/// already present, compared case-insensitively. Returns `None` for empty
/// or known non-address text.
#[must_use]
pub fn normalize_location(raw: &str, locality: &str) -> Option<String> {
    let addr = raw.trim();

    let upper = addr.to_uppercase();
    if addr.is_empty() || SKIP_PATTERNS.iter().any(|p| upper == *p) {
        return None;
    }

    let addr = LEADING_AT_RE.replace(addr, "");

    // "4800 BLOCK OF FRONT ST" → "4800 FRONT ST"
    let addr = BLOCK_OF_RE.replace_all(&addr, " ");

    // "100 BLOCK MAIN ST" → "100 MAIN ST"
    let addr = BLOCK_RE.replace(&addr, "$1 ");

    let addr = CROSS_STREET_RE.replace_all(&addr, " and ");
    let addr = BLOCK_RANGE_RE.replace_all(&addr, " and ");
    let addr = COMMA_RUN_RE.replace_all(&addr, ", ");
    let addr = WHITESPACE_RE.replace_all(&addr, " ");

    let addr = addr
        .trim_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string();

    if addr.is_empty() {
        return None;
    }

    let locality = locality.trim();
    if locality.is_empty() || addr.to_lowercase().contains(&locality.to_lowercase()) {
        Some(addr)
    } else {
        Some(format!("{addr}, {locality}"))
    }
}

/// Cache key for a geocoding query: trimmed, lowercased, with internal
/// whitespace collapsed.
#[must_use]
pub fn cache_key(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCALITY: &str = "Binghamton, NY";

    #[test]
    fn appends_locality_to_plain_address() {
        assert_eq!(
            normalize_location("100 MAIN ST", LOCALITY).as_deref(),
            Some("100 MAIN ST, Binghamton, NY")
        );
    }

    #[test]
    fn does_not_duplicate_locality() {
        assert_eq!(
            normalize_location("100 MAIN ST, BINGHAMTON, NY", LOCALITY).as_deref(),
            Some("100 MAIN ST, BINGHAMTON, NY")
        );
    }

    #[test]
    fn empty_locality_is_not_appended() {
        assert_eq!(
            normalize_location("  100 MAIN ST  ", "").as_deref(),
            Some("100 MAIN ST")
        );
    }

    #[test]
    fn strips_leading_at() {
        assert_eq!(
            normalize_location("at 25 COURT ST", "").as_deref(),
            Some("25 COURT ST")
        );
        assert_eq!(
            normalize_location("AT 25 COURT ST", "").as_deref(),
            Some("25 COURT ST")
        );
    }

    #[test]
    fn rewrites_cross_streets() {
        assert_eq!(
            normalize_location("CHENANGO ST / HENRY ST", "").as_deref(),
            Some("CHENANGO ST and HENRY ST")
        );
        assert_eq!(
            normalize_location("COURT ST&WATER ST", "").as_deref(),
            Some("COURT ST and WATER ST")
        );
        assert_eq!(
            normalize_location("MAIN ST @ FRONT ST", "").as_deref(),
            Some("MAIN ST and FRONT ST")
        );
    }

    #[test]
    fn rewrites_block_ranges_but_keeps_house_number_ranges() {
        assert_eq!(
            normalize_location("STATE ST - HAWLEY ST", "").as_deref(),
            Some("STATE ST and HAWLEY ST")
        );
        assert_eq!(
            normalize_location("12-14 MAIN ST", "").as_deref(),
            Some("12-14 MAIN ST")
        );
    }

    #[test]
    fn removes_block_noise() {
        assert_eq!(
            normalize_location("4800 BLOCK OF FRONT ST", "").as_deref(),
            Some("4800 FRONT ST")
        );
        assert_eq!(
            normalize_location("100 BLK OF MAIN ST", "").as_deref(),
            Some("100 MAIN ST")
        );
        assert_eq!(
            normalize_location("100BLOCK MAIN ST", "").as_deref(),
            Some("100 MAIN ST")
        );
    }

    #[test]
    fn collapses_commas_and_whitespace() {
        assert_eq!(
            normalize_location("100  MAIN ST,, ,BINGHAMTON,", "").as_deref(),
            Some("100 MAIN ST, BINGHAMTON")
        );
    }

    #[test]
    fn skips_non_addresses() {
        for raw in ["", "   ", "UNKNOWN", "n/a", "None", ",,,"] {
            assert!(normalize_location(raw, LOCALITY).is_none(), "{raw:?}");
        }
    }

    #[test]
    fn cache_key_folds_case_and_spacing() {
        assert_eq!(
            cache_key("  100  Main St,  Binghamton "),
            "100 main st, binghamton"
        );
        assert_eq!(cache_key("100 MAIN ST"), cache_key("100 main   st"));
    }
}
