//! Owner-name and mailing-address normalization.
//!
//! The catalog publishes owner names as an HTML blob (entity-encoded,
//! `<br>`-separated, one line per co-owner) and mailing addresses as a
//! pipe-delimited string. This module turns both into structured fields.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Substrings that mark a name as a business entity. Matched against the
/// uppercased name with their surrounding-space boundaries intact.
///
/// Known precision trade-off: naive containment means short tokens like
/// `" CO "` or `" TR "` can fire inside unrelated text. Downstream data has
/// been vetted against exactly this behavior, so it stays.
const BUSINESS_KEYWORDS: [&str; 35] = [
    " LLC",
    " L.L.C",
    " LLP",
    " L.L.P",
    " INC",
    " CO ",
    " COMPANY",
    " CORPORATION",
    " CORP",
    " LP",
    " L.P",
    " LLLP",
    " PLLC",
    " PC",
    " TRUST",
    " TR ",
    " FOUNDATION",
    " ASSOCIATES",
    " HOLDINGS",
    " ENTERPRISE",
    " ENTERPRISES",
    " PROPERTIES",
    " PROPERTY",
    " GROUP",
    " INVEST",
    " PARTNERSHIP",
    " PARTNERS",
    " LIVING TRUST",
    " REVOCABLE",
    " FAMILY",
    " MANAGEMENT",
    " FUND",
    " ESTATE",
    " LLC.",
    " LLC,",
];

const SUFFIX_TOKENS: [&str; 6] = ["JR", "SR", "II", "III", "IV", "V"];

static BR_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"));

/// Structured name components for one owner line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    pub first: String,
    pub middle: String,
    pub last: String,
    pub suffix: String,
    pub title: String,
    pub company: String,
}

/// Structured mailing-address components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParts {
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Strip markup and decode HTML entities from a text fragment.
fn fragment_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    fragment.root_element().text().collect::<String>()
}

/// Split the HTML owner-name blob into one string per co-owner.
///
/// Splits on `<br>` markup, strips any remaining tags, decodes entities,
/// and drops blank lines, preserving order.
pub fn split_owner_names(raw_html: &str) -> Vec<String> {
    if raw_html.is_empty() {
        return Vec::new();
    }

    BR_SPLIT_RE
        .split(raw_html)
        .map(|part| fragment_text(part).trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Python `str.title` semantics: capitalize the first letter of every
/// alphabetic run, lowercase the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Split one raw owner line into structured name components.
///
/// Business names are detected first and kept verbatim in `company`. Person
/// names get periods stripped, a generational suffix popped off the end, and
/// joint names ("John & Jane Doe") keep the whole first-through-second-to-last
/// span in `first` so the ampersand formatting survives.
pub fn split_name(raw_name: &str) -> NameParts {
    let clean = raw_name.trim().trim_matches(',');
    if clean.is_empty() {
        return NameParts::default();
    }

    let clean = clean.replace("  ", " ");
    let upper = clean.to_uppercase();
    if BUSINESS_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
        return NameParts {
            company: clean,
            ..NameParts::default()
        };
    }

    let stripped = clean.replace('.', "");
    let mut tokens: Vec<&str> = stripped.split_whitespace().collect();
    if tokens.is_empty() {
        return NameParts::default();
    }

    let mut suffix = String::new();
    if SUFFIX_TOKENS.contains(&tokens[tokens.len() - 1].to_uppercase().as_str()) {
        suffix = tokens.pop().unwrap_or_default().to_string();
    }

    if tokens.is_empty() {
        return NameParts {
            suffix,
            ..NameParts::default()
        };
    }

    if tokens.len() == 1 {
        return NameParts {
            last: title_case(tokens[0]),
            suffix,
            ..NameParts::default()
        };
    }

    let (first_middle, last_token) = tokens.split_at(tokens.len() - 1);
    let last = title_case(last_token[0]);

    let joint = first_middle
        .iter()
        .any(|t| matches!(t.to_uppercase().as_str(), "&" | "AND"));

    let (first, middle) = if joint {
        let first = first_middle
            .iter()
            .map(|t| title_case(t))
            .collect::<Vec<_>>()
            .join(" ");
        (first, String::new())
    } else {
        let first = title_case(first_middle[0]);
        let middle = first_middle[1..]
            .iter()
            .map(|t| title_case(t))
            .collect::<Vec<_>>()
            .join(" ");
        (first, middle)
    };

    NameParts {
        first,
        middle,
        last,
        suffix,
        ..NameParts::default()
    }
}

/// Parse the pipe-delimited mailing-address blob.
///
/// First segment is line 1; with exactly two segments the second is the
/// city/state/zip block; with three or more, the middle segments join into
/// line 2 and the last is the city/state/zip block.
pub fn parse_address(raw: &str) -> AddressParts {
    if raw.is_empty() {
        return AddressParts::default();
    }

    let decoded = fragment_text(raw);
    let segments: Vec<&str> = decoded
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return AddressParts::default();
    }

    let line1 = segments[0].to_string();
    let mut line2 = String::new();
    let mut city_state = "";

    if segments.len() == 2 {
        city_state = segments[1];
    } else if segments.len() >= 3 {
        line2 = segments[1..segments.len() - 1].join(" ");
        city_state = segments[segments.len() - 1];
    }

    let mut city = String::new();
    let mut state = String::new();
    let mut zip = String::new();

    if !city_state.is_empty() {
        if let Some((city_part, rest)) = city_state.split_once(',') {
            city = title_case(city_part.trim());
            let rest = rest.trim();
            if !rest.is_empty() {
                let mut tokens = rest.split_whitespace();
                if let Some(first) = tokens.next() {
                    state = first.to_uppercase();
                    zip = tokens.collect::<Vec<_>>().join(" ").trim().to_string();
                }
            }
        } else {
            city = title_case(city_state);
        }
    }

    AddressParts {
        line1,
        line2,
        city,
        state,
        zip,
    }
}

/// Compose the display name from split components.
///
/// A company name wins outright; otherwise title/first/middle/last join with
/// spaces and the suffix glues onto the final token instead of standing alone.
pub fn display_name(parts: &NameParts) -> String {
    let company = parts.company.trim();
    if !company.is_empty() {
        return company.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    for value in [&parts.title, &parts.first, &parts.middle, &parts.last] {
        let value = value.trim();
        if !value.is_empty() {
            out.push(value.to_string());
        }
    }
    let suffix = parts.suffix.trim();
    if !suffix.is_empty() {
        match out.last_mut() {
            Some(last) => *last = format!("{last} {suffix}"),
            None => out.push(suffix.to_string()),
        }
    }

    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_owner_names_decodes_and_splits() {
        let html = "SMITH JOHN &amp; JANE<br/>ACME PROPERTIES LLC<br>";
        let names = split_owner_names(html);
        assert_eq!(names, vec!["SMITH JOHN & JANE", "ACME PROPERTIES LLC"]);
    }

    #[test]
    fn test_split_owner_names_strips_stray_markup() {
        let html = "<b>DOE JANE</b><br /><i></i>";
        assert_eq!(split_owner_names(html), vec!["DOE JANE"]);
        assert!(split_owner_names("").is_empty());
    }

    #[test]
    fn test_split_name_suffix_pops() {
        let parts = split_name("Smith Jr");
        assert_eq!(parts.last, "Smith");
        assert_eq!(parts.suffix, "Jr");
        assert_eq!(parts.first, "");
    }

    #[test]
    fn test_split_name_business_keyword_wins() {
        let parts = split_name("Acme Properties LLC");
        assert_eq!(parts.company, "Acme Properties LLC");
        assert_eq!(parts.first, "");
        assert_eq!(parts.last, "");
    }

    #[test]
    fn test_split_name_joint_names_keep_ampersand_span() {
        let parts = split_name("John & Jane Doe");
        assert_eq!(parts.first, "John & Jane");
        assert_eq!(parts.middle, "");
        assert_eq!(parts.last, "Doe");
    }

    #[test]
    fn test_split_name_first_middle_last() {
        let parts = split_name("MARY ELLEN VANCE");
        assert_eq!(parts.first, "Mary");
        assert_eq!(parts.middle, "Ellen");
        assert_eq!(parts.last, "Vance");
    }

    #[test]
    fn test_split_name_strips_periods_and_commas() {
        let parts = split_name(" Doe, John Q. ,");
        assert_eq!(parts.first, "Doe,");
        // The comma survives inside the token; only periods are stripped.
        assert_eq!(parts.middle, "John");
        assert_eq!(parts.last, "Q");
    }

    #[test]
    fn test_parse_address_two_segments() {
        let parts = parse_address("123 Main St|Denver, CO 80202");
        assert_eq!(parts.line1, "123 Main St");
        assert_eq!(parts.line2, "");
        assert_eq!(parts.city, "Denver");
        assert_eq!(parts.state, "CO");
        assert_eq!(parts.zip, "80202");
    }

    #[test]
    fn test_parse_address_middle_segments_join_line2() {
        let parts = parse_address("PO BOX 4|C/O HOA|STE 9|FRISCO, CO 80443-1234");
        assert_eq!(parts.line1, "PO BOX 4");
        assert_eq!(parts.line2, "C/O HOA STE 9");
        assert_eq!(parts.city, "Frisco");
        assert_eq!(parts.state, "CO");
        assert_eq!(parts.zip, "80443-1234");
    }

    #[test]
    fn test_parse_address_no_comma_is_all_city() {
        let parts = parse_address("500 Pine|Breckenridge");
        assert_eq!(parts.city, "Breckenridge");
        assert_eq!(parts.state, "");
        assert_eq!(parts.zip, "");
    }

    #[test]
    fn test_display_name_suffix_glues_to_last_token() {
        let parts = split_name("John Quincy Adams Jr");
        assert_eq!(display_name(&parts), "John Quincy Adams Jr");
        let solo = split_name("Smith Jr");
        assert_eq!(display_name(&solo), "Smith Jr");
    }

    #[test]
    fn test_display_name_company_verbatim() {
        let parts = split_name("SUMMIT HOLDINGS LLC");
        assert_eq!(display_name(&parts), "SUMMIT HOLDINGS LLC");
    }

    #[test]
    fn test_title_case_runs() {
        assert_eq!(title_case("O'BRIEN"), "O'Brien");
        assert_eq!(title_case("mcdonald way"), "Mcdonald Way");
        assert_eq!(title_case("123 MAIN"), "123 Main");
    }
}
