//! Cell, ZIP and name normalization.

use std::sync::LazyLock;

use regex::Regex;

use leadscout_shared::PersonName;

/// Words that mark an owner or lender as an organization.
const ENTITY_MARKERS: &[&str] = &[
    "LLC", "L.L.C.", "INC", "INC.", "CORP", "CORP.", "CORPORATION", "CO", "CO.", "COMPANY",
    "LP", "LLP", "LTD", "TRUST", "TRUSTEE", "TRUSTEES", "TR", "BANK", "BANCORP", "MORTGAGE",
    "LENDING", "FINANCIAL", "FUNDING", "CREDIT", "UNION", "ASSOCIATION", "ASSN", "HOLDINGS",
    "PROPERTIES", "INVESTMENTS", "PARTNERS", "PARTNERSHIP", "ESTATE", "CHURCH", "CITY",
    "COUNTY", "FEDERAL", "NATIONAL", "SAVINGS", "FOUNDATION", "MINISTRIES", "GROUP",
];

/// Trailing generational suffixes dropped before picking the last name.
const SUFFIXES: &[&str] = &["JR", "SR", "II", "III", "IV", "V"];

/// Trim a cell; `""`, `nan` and `none` (any case) are missing.
pub fn clean_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("none")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a ZIP to five digits.
///
/// Accepts `62701`, `62701-1234`, `627011234`, spreadsheet floats like
/// `62701.0`, and ZIPs that lost leading zeros (`2134` → `02134`).
pub fn normalize_zip(raw: &str) -> Option<String> {
    static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(\d{3,5})(?:\.0+)?(?:-\d{4})?$").expect("valid regex")
    });
    static ZIP9_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d{5})\d{4}$").expect("valid regex"));

    let s = raw.trim();
    if let Some(c) = ZIP9_RE.captures(s) {
        return Some(c[1].to_string());
    }
    ZIP_RE.captures(s).map(|c| format!("{:0>5}", &c[1]))
}

/// Upper-case two-letter state code; anything else is kept trimmed.
pub fn normalize_state(raw: &str) -> String {
    let s = raw.trim();
    if s.len() == 2 {
        s.to_ascii_uppercase()
    } else {
        s.to_string()
    }
}

/// Whether a name reads as an organization rather than a person.
pub fn is_business_name(name: &str) -> bool {
    name.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .any(|token| {
            let upper = token.to_ascii_uppercase();
            ENTITY_MARKERS.contains(&upper.as_str())
        })
}

/// Case- and spacing-insensitive key for deduplication.
pub fn dedup_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a person's name into parts.
///
/// Composite owners (`John & Mary Smith`, `John Smith and Mary Smith`) are
/// reduced to the first person, borrowing the shared last name when the first
/// person has none. Suffixes like `JR` are ignored. A single token yields no
/// first/last split.
pub fn split_person_name(full: &str) -> PersonName {
    static COMPOSITE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\s+(?:&|and)\s+").expect("valid regex"));

    let full_trimmed = full.trim().to_string();
    let mut parts = COMPOSITE_RE.split(&full_trimmed);
    let primary = parts.next().unwrap_or_default();
    let partner_tokens = parts.next().map(tokens).unwrap_or_default();

    let mut toks = tokens(primary);
    if toks.len() == 1 && partner_tokens.len() >= 2 {
        // "John & Mary Smith": the last name belongs to both.
        if let Some(last) = partner_tokens.last() {
            toks.push(last.clone());
        }
    }

    let (first, middle, last) = match toks.len() {
        0 | 1 => (None, None, None),
        2 => (Some(toks[0].clone()), None, Some(toks[1].clone())),
        n => (
            Some(toks[0].clone()),
            Some(toks[1..n - 1].join(" ")),
            Some(toks[n - 1].clone()),
        ),
    };

    PersonName {
        full: full_trimmed,
        first,
        middle,
        last,
    }
}

/// Name tokens with punctuation and trailing suffixes removed.
fn tokens(s: &str) -> Vec<String> {
    let mut toks: Vec<String> = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_matches(|c: char| c == '.' || c == ','))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    while toks.len() > 2
        && toks
            .last()
            .is_some_and(|t| SUFFIXES.contains(&t.to_ascii_uppercase().as_str()))
    {
        toks.pop();
    }
    toks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cells() {
        assert_eq!(clean_cell("  "), None);
        assert_eq!(clean_cell("nan"), None);
        assert_eq!(clean_cell("None"), None);
        assert_eq!(clean_cell(" 12 Oak St "), Some("12 Oak St".into()));
    }

    #[test]
    fn zip_normalization() {
        assert_eq!(normalize_zip("62701").as_deref(), Some("62701"));
        assert_eq!(normalize_zip("62701-1234").as_deref(), Some("62701"));
        assert_eq!(normalize_zip("627011234").as_deref(), Some("62701"));
        assert_eq!(normalize_zip("62701.0").as_deref(), Some("62701"));
        assert_eq!(normalize_zip("2134").as_deref(), Some("02134"));
        assert_eq!(normalize_zip("abc"), None);
        assert_eq!(normalize_zip("12"), None);
    }

    #[test]
    fn business_detection() {
        assert!(is_business_name("ACME HOLDINGS LLC"));
        assert!(is_business_name("Smith Family Trust"));
        assert!(is_business_name("First National Bank"));
        assert!(is_business_name("Oak Street Properties, Inc."));
        assert!(!is_business_name("John A Smith"));
        // Substrings do not count.
        assert!(!is_business_name("Cole Banks"));
    }

    #[test]
    fn name_splitting() {
        let n = split_person_name("John A Smith Jr");
        assert_eq!(n.first.as_deref(), Some("John"));
        assert_eq!(n.middle.as_deref(), Some("A"));
        assert_eq!(n.last.as_deref(), Some("Smith"));
        assert_eq!(n.full, "John A Smith Jr");

        let n = split_person_name("Mary Jones");
        assert_eq!(n.first.as_deref(), Some("Mary"));
        assert_eq!(n.middle, None);
        assert_eq!(n.last.as_deref(), Some("Jones"));

        let n = split_person_name("Cher");
        assert_eq!(n.first, None);
        assert_eq!(n.last, None);
    }

    #[test]
    fn composite_names_use_first_person() {
        let n = split_person_name("John & Mary Smith");
        assert_eq!(n.first.as_deref(), Some("John"));
        assert_eq!(n.last.as_deref(), Some("Smith"));

        let n = split_person_name("Robert Lee Brown and Ann Brown");
        assert_eq!(n.first.as_deref(), Some("Robert"));
        assert_eq!(n.middle.as_deref(), Some("Lee"));
        assert_eq!(n.last.as_deref(), Some("Brown"));
    }

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        assert_eq!(dedup_key("JOHN  SMITH"), dedup_key("john smith"));
    }
}
