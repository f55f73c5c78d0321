//! Owner table building.
//!
//! Maps each deduplicated feature to one printable row per co-owner, with the
//! grouping label ("complex"), unit, normalized owner fields, and the composed
//! mailing-address block, sorted deterministically for export.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::{self, NameParts};
use crate::catalog::RawFeature;
use crate::config::FieldMap;

/// Fixed leading export columns, in order.
pub const PRIMARY_COLUMNS: [&str; 16] = [
    "Complex",
    "Unit",
    "Owner Name",
    "Owner Link",
    "Business Owner?",
    "Mailing Address",
    "Address Line 1",
    "Address Line 2",
    "City",
    "State",
    "Zip5",
    "Zip9",
    "Subdivision",
    "Schedule Number",
    "Public Detail URL",
    "Physical Address",
];

/// Fixed trailing export columns, after any overlay columns.
pub const SUPPLEMENTAL_COLUMNS: [&str; 8] = [
    "First name",
    "Middle",
    "Last Name",
    "Suffix",
    "Title",
    "Company",
    "Original Zip",
    "Comments",
];

static UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)UNIT\s+([A-Za-z0-9-]+)").expect("static regex"));
static BLDG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBLDG\s+([A-Za-z0-9-]+)").expect("static regex"));

/// Subdivision suffix words that add nothing to the grouping label.
const COMPLEX_SUFFIXES: [&str; 8] = [
    " Condo",
    " Condos",
    " Condominiums",
    " Townhomes",
    " Townhome",
    " Pud",
    " Filing",
    " Phase",
];

/// One printable output record; one feature yields one row per co-owner.
#[derive(Debug, Clone, Default)]
pub struct OwnerRow {
    pub complex: String,
    pub unit: String,
    pub owner_name: String,
    /// Link-cell placeholder, filled in by the registry linker.
    pub owner_link: String,
    pub business: bool,
    pub mailing_address: String,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub zip5: String,
    pub zip9: String,
    pub subdivision: String,
    pub schedule: String,
    pub detail_url: String,
    pub physical_address: String,
    /// Overlay column values, aligned with the caller's extra-column order.
    pub extra: Vec<String>,
    pub first: String,
    pub middle: String,
    pub last: String,
    pub suffix: String,
    pub title: String,
    pub company: String,
    pub original_zip: String,
    pub comments: String,
}

impl OwnerRow {
    pub fn business_label(&self) -> &'static str {
        if self.business { "Yes" } else { "No" }
    }

    fn primary_values(&self) -> Vec<String> {
        vec![
            self.complex.clone(),
            self.unit.clone(),
            self.owner_name.clone(),
            self.owner_link.clone(),
            self.business_label().to_string(),
            self.mailing_address.clone(),
            self.address1.clone(),
            self.address2.clone(),
            self.city.clone(),
            self.state.clone(),
            self.zip5.clone(),
            self.zip9.clone(),
            self.subdivision.clone(),
            self.schedule.clone(),
            self.detail_url.clone(),
            self.physical_address.clone(),
        ]
    }

    fn supplemental_values(&self) -> Vec<String> {
        vec![
            self.first.clone(),
            self.middle.clone(),
            self.last.clone(),
            self.suffix.clone(),
            self.title.clone(),
            self.company.clone(),
            self.original_zip.clone(),
            self.comments.clone(),
        ]
    }

    /// Full export record: primary columns, overlay columns, supplemental.
    pub fn record(&self) -> Vec<String> {
        let mut values = self.primary_values();
        values.extend(self.extra.iter().cloned());
        values.extend(self.supplemental_values());
        values
    }
}

/// Build the header row matching [`OwnerRow::record`].
pub fn header_row(extra_columns: &[String]) -> Vec<String> {
    PRIMARY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extra_columns.iter().cloned())
        .chain(SUPPLEMENTAL_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

/// Derive the grouping label for a feature.
///
/// Prefers the subdivision name with known suffix words stripped and a small
/// alias table applied; falls back to the street address with the house number
/// dropped and everything from the first unit/building marker on removed.
fn normalize_complex_name(feature: &RawFeature, fields: &FieldMap) -> String {
    let subdivision = normalize::title_case(&feature.attr_str(&fields.subdivision))
        .trim()
        .to_string();
    if !subdivision.is_empty() {
        let mut name = subdivision;
        for suffix in COMPLEX_SUFFIXES {
            if let Some(stripped) = name.strip_suffix(suffix) {
                name = stripped.trim().to_string();
            }
        }
        if name == "Mountain Thunder Lodge" {
            name = "Mountain Thunder".to_string();
        }
        return name;
    }

    let situs = feature.attr_str(&fields.situs);
    if situs.is_empty() {
        return String::new();
    }

    let mut parts: Vec<&str> = situs.split_whitespace().collect();
    if parts
        .first()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        parts.remove(0);
    }

    let mut trimmed: Vec<&str> = Vec::new();
    for part in parts {
        if matches!(part.to_uppercase().as_str(), "UNIT" | "BLDG" | "BUILDING") {
            break;
        }
        trimmed.push(part);
    }

    if trimmed.is_empty() {
        situs
    } else {
        normalize::title_case(&trimmed.join(" "))
    }
}

/// Extract the unit label from the description or street address.
/// A `UNIT <x>` match anywhere takes precedence over `BLDG <x>`.
fn extract_unit(feature: &RawFeature, fields: &FieldMap) -> String {
    let sources = [
        feature.attr_str(&fields.description),
        feature.attr_str(&fields.situs),
    ];
    for re in [&*UNIT_RE, &*BLDG_RE] {
        for text in &sources {
            if text.is_empty() {
                continue;
            }
            if let Some(captures) = re.captures(text) {
                return captures[1].to_string();
            }
        }
    }
    String::new()
}

/// Numeric-aware sort key for unit labels: numeric units first (by value),
/// then alphabetic units, then blank.
fn unit_sort_key(unit: &str) -> (u8, String) {
    if unit.is_empty() {
        return (1, String::new());
    }
    match unit.parse::<f64>() {
        Ok(value) => (0, format!("{value:012.4}")),
        Err(_) => (0, unit.to_lowercase()),
    }
}

/// Compose the printable mailing-address block: line 1, line 2, and a
/// "city, state zip" line, skipping whichever pieces are empty.
fn mailing_block(address1: &str, address2: &str, city: &str, state: &str, zip9: &str, zip5: &str) -> String {
    let mut city_line = city.to_string();
    if !city_line.is_empty() && !state.is_empty() {
        city_line = format!("{city_line}, {state}");
    } else if !state.is_empty() {
        city_line = state.to_string();
    }
    let zip_for_line = if !zip9.is_empty() { zip9 } else { zip5 };
    if !city_line.is_empty() && !zip_for_line.is_empty() {
        city_line = format!("{city_line} {zip_for_line}").trim().to_string();
    } else if city_line.is_empty() && !zip_for_line.is_empty() {
        city_line = zip_for_line.to_string();
    }

    [address1, address2, &city_line]
        .iter()
        .filter(|line| !line.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map deduplicated features into sorted owner rows.
pub fn build_rows(
    features: &[RawFeature],
    fields: &FieldMap,
    extra_columns: &[String],
) -> Vec<OwnerRow> {
    let mut rows: Vec<OwnerRow> = Vec::new();

    for feature in features {
        if feature.attributes.is_empty() {
            continue;
        }

        let mut raw_names = normalize::split_owner_names(&feature.attr_str(&fields.owner_html));
        if raw_names.is_empty() {
            let fallback = feature.attr_str(&fields.owner_fallback);
            raw_names = if fallback.is_empty() {
                vec![String::new()]
            } else {
                vec![fallback.trim().to_string()]
            };
        }

        let address = normalize::parse_address(&feature.attr_str(&fields.mailing));
        let complex = normalize_complex_name(feature, fields);
        let unit = extract_unit(feature, fields);
        let schedule = feature.attr_str(&fields.schedule);
        let detail_id = {
            let parcel = feature.attr_str(&fields.parcel);
            if parcel.is_empty() { schedule.clone() } else { parcel }
        };
        let detail_url = fields.detail_url(&detail_id);
        let physical_address = {
            let situs = feature.attr_str(&fields.situs);
            if situs.is_empty() {
                feature.attr_str(&fields.description)
            } else {
                situs
            }
        };

        let extra: Vec<String> = extra_columns
            .iter()
            .map(|column| feature.attr_str(column))
            .collect();

        for raw_name in &raw_names {
            let parts: NameParts = normalize::split_name(raw_name);
            let owner_name = normalize::display_name(&parts);
            let business = !parts.company.trim().is_empty();
            let zip5 = address
                .zip
                .split('-')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            let mailing_address = mailing_block(
                &address.line1,
                &address.line2,
                &address.city,
                &address.state,
                &address.zip,
                &zip5,
            );

            rows.push(OwnerRow {
                complex: complex.clone(),
                unit: unit.clone(),
                owner_name,
                owner_link: String::new(),
                business,
                mailing_address,
                address1: address.line1.clone(),
                address2: address.line2.clone(),
                city: address.city.clone(),
                state: address.state.clone(),
                zip5,
                zip9: address.zip.clone(),
                subdivision: feature.attr_str(&fields.subdivision),
                schedule: schedule.clone(),
                detail_url: detail_url.clone(),
                physical_address: physical_address.clone(),
                extra: extra.clone(),
                first: parts.first,
                middle: parts.middle,
                last: parts.last,
                suffix: parts.suffix,
                title: parts.title,
                company: parts.company,
                original_zip: address.zip.clone(),
                comments: String::new(),
            });
        }
    }

    rows.sort_by_key(|row| (row.complex.to_lowercase(), unit_sort_key(&row.unit)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(attrs: serde_json::Value) -> RawFeature {
        serde_json::from_value(json!({ "attributes": attrs })).unwrap()
    }

    fn fields() -> FieldMap {
        FieldMap::default()
    }

    #[test]
    fn test_unit_sort_numeric_then_alpha_then_blank() {
        let mut units = vec!["A", "", "10", "2"];
        units.sort_by_key(|u| unit_sort_key(u));
        assert_eq!(units, vec!["2", "10", "A", ""]);
    }

    #[test]
    fn test_complex_name_strips_suffix_and_applies_alias() {
        let f = feature(json!({"SubdivisionName": "RIVER RUN CONDOS"}));
        assert_eq!(normalize_complex_name(&f, &fields()), "River Run");

        let f = feature(json!({"SubdivisionName": "MOUNTAIN THUNDER LODGE"}));
        assert_eq!(normalize_complex_name(&f, &fields()), "Mountain Thunder");
    }

    #[test]
    fn test_complex_name_from_situs_drops_number_and_unit() {
        let f = feature(json!({
            "SubdivisionName": "",
            "SitusAddress": "123 SNOWY RIDGE RD UNIT 4B"
        }));
        assert_eq!(normalize_complex_name(&f, &fields()), "Snowy Ridge Rd");
    }

    #[test]
    fn test_extract_unit_prefers_unit_over_bldg() {
        let f = feature(json!({
            "BriefPropertyDescription": "BLDG C UNIT 12",
            "SitusAddress": "456 PEAK PL"
        }));
        assert_eq!(extract_unit(&f, &fields()), "12");

        let f = feature(json!({
            "BriefPropertyDescription": "BLDG C",
            "SitusAddress": ""
        }));
        assert_eq!(extract_unit(&f, &fields()), "C");
    }

    #[test]
    fn test_build_rows_one_per_co_owner() {
        let f = feature(json!({
            "OwnerNamesPublicHTML": "SMITH JOHN<br/>ACME HOLDINGS LLC",
            "OwnerContactPublicMailingAddr": "PO BOX 100|DENVER, CO 80202-1234",
            "SubdivisionName": "RIVER RUN CONDOS",
            "PropertyScheduleText": "S100",
            "HC_RegistrationsOriginalCleaned": "P100",
            "BriefPropertyDescription": "UNIT 7",
            "SitusAddress": "9 RIVER RUN RD UNIT 7"
        }));

        let rows = build_rows(&[f], &fields(), &[]);
        assert_eq!(rows.len(), 2);

        // Token order is preserved: the catalog publishes "SMITH JOHN" and
        // the splitter never reorders, so "Smith" lands in first.
        let person = rows.iter().find(|r| !r.business).unwrap();
        assert_eq!(person.owner_name, "Smith John");
        assert_eq!(person.first, "Smith");
        assert_eq!(person.last, "John");
        assert_eq!(person.complex, "River Run");
        assert_eq!(person.unit, "7");
        assert_eq!(person.zip5, "80202");
        assert_eq!(person.zip9, "80202-1234");
        assert_eq!(person.mailing_address, "PO BOX 100\nDenver, CO 80202-1234");
        assert_eq!(
            person.detail_url,
            "https://gis.summitcountyco.gov/map/DetailData.aspx?Schno=P100"
        );

        let business = rows.iter().find(|r| r.business).unwrap();
        assert_eq!(business.owner_name, "ACME HOLDINGS LLC");
        assert_eq!(business.business_label(), "Yes");
    }

    #[test]
    fn test_build_rows_falls_back_to_plain_name_field() {
        let f = feature(json!({
            "OwnerFullName": "DOE JANE",
            "PropertyScheduleText": "S1"
        }));
        let rows = build_rows(&[f], &fields(), &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owner_name, "Doe Jane");

        // No owner fields at all still yields one (empty-name) row.
        let f = feature(json!({"PropertyScheduleText": "S2"}));
        let rows = build_rows(&[f], &fields(), &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owner_name, "");
    }

    #[test]
    fn test_rows_sorted_by_complex_then_unit() {
        let make = |sub: &str, desc: &str, sched: &str| {
            feature(json!({
                "OwnerFullName": "DOE JANE",
                "SubdivisionName": sub,
                "BriefPropertyDescription": desc,
                "PropertyScheduleText": sched
            }))
        };
        let features = vec![
            make("ZENITH", "UNIT 2", "S1"),
            make("ALPINE", "UNIT A", "S2"),
            make("ALPINE", "UNIT 10", "S3"),
            make("ALPINE", "", "S4"),
            make("ALPINE", "UNIT 2", "S5"),
        ];
        let rows = build_rows(&features, &fields(), &[]);
        let order: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.complex.clone(), r.unit.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Alpine".to_string(), "2".to_string()),
                ("Alpine".to_string(), "10".to_string()),
                ("Alpine".to_string(), "A".to_string()),
                ("Alpine".to_string(), "".to_string()),
                ("Zenith".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_extra_columns_attached_verbatim() {
        let f = feature(json!({
            "OwnerFullName": "DOE JANE",
            "PropertyScheduleText": "S1",
            "Zoning District": "R-1"
        }));
        let extra = vec!["Zoning District".to_string(), "Land Use Category".to_string()];
        let rows = build_rows(&[f], &fields(), &extra);
        assert_eq!(rows[0].extra, vec!["R-1".to_string(), String::new()]);
        let record = rows[0].record();
        assert_eq!(record.len(), PRIMARY_COLUMNS.len() + 2 + SUPPLEMENTAL_COLUMNS.len());
    }
}
