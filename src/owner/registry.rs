//! Owner registry and cross-sheet link addressing.
//!
//! Walks the built rows in order, dedupes owners by identity key, and computes
//! the stable row addresses both workbook sheets use to point at each other.

use std::collections::HashMap;

use super::table::OwnerRow;
use crate::config::SheetIdentifiers;

/// Uppercased identity tuple deciding when two rows share an owner.
/// A company name dominates (business rows carry empty person fields).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OwnerKey(String, String, String, String, String);

impl OwnerKey {
    fn of(row: &OwnerRow) -> Self {
        let norm = |s: &str| s.trim().to_uppercase();
        Self(
            norm(&row.company),
            norm(&row.first),
            norm(&row.middle),
            norm(&row.last),
            norm(&row.suffix),
        )
    }
}

/// One property reference held by an owner, plus its link addressing.
#[derive(Debug, Clone)]
pub struct PropertyRef {
    /// Index of the originating row in the flat export.
    pub row_index: usize,
    pub complex: String,
    pub unit: String,
    pub schedule: String,
    /// Owner-detail sheet row (the owner's starting row, shared by all of
    /// that owner's properties).
    pub owner_row: Option<u32>,
    /// Per-property sheet row (`row_index + 2`; row 1 is the header).
    pub complex_row: Option<u32>,
    pub owner_url: Option<String>,
    pub complex_url: Option<String>,
    /// Short human label for the property link.
    pub link_label: String,
}

/// One deduplicated owner identity with its linked properties.
#[derive(Debug, Clone)]
pub struct OwnerRecord {
    /// Sequential generated id: OWN0001, OWN0002, ...
    pub owner_id: String,
    pub display_name: String,
    pub name: String,
    pub business: bool,
    pub mailing: String,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    pub zip5: String,
    pub zip9: String,
    pub company: String,
    pub first: String,
    pub middle: String,
    pub last: String,
    pub suffix: String,
    pub properties: Vec<PropertyRef>,
    /// Starting row on the owner-detail sheet, cached once by the layout pass.
    pub sheet_row: Option<u32>,
    pub owner_url: Option<String>,
}

/// Dedup owners across rows and build the bidirectional index.
///
/// Returns the registry in insertion order plus a row-index → registry-index
/// map. Records are append-only: later matching rows only add property refs.
pub fn build_registry(rows: &[OwnerRow]) -> (Vec<OwnerRecord>, Vec<usize>) {
    let mut owners: Vec<OwnerRecord> = Vec::new();
    let mut lookup: HashMap<OwnerKey, usize> = HashMap::new();
    let mut row_to_owner: Vec<usize> = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let key = OwnerKey::of(row);
        let owner_idx = match lookup.get(&key) {
            Some(&i) => i,
            None => {
                let owner_id = format!("OWN{:04}", owners.len() + 1);
                let display_name = if row.owner_name.trim().is_empty() {
                    owner_id.clone()
                } else {
                    row.owner_name.trim().to_string()
                };
                owners.push(OwnerRecord {
                    owner_id,
                    display_name,
                    name: row.owner_name.clone(),
                    business: row.business,
                    mailing: row.mailing_address.clone(),
                    address1: row.address1.clone(),
                    address2: row.address2.clone(),
                    city: row.city.clone(),
                    state: row.state.clone(),
                    zip5: row.zip5.clone(),
                    zip9: row.zip9.clone(),
                    company: row.company.clone(),
                    first: row.first.clone(),
                    middle: row.middle.clone(),
                    last: row.last.clone(),
                    suffix: row.suffix.clone(),
                    properties: Vec::new(),
                    sheet_row: None,
                    owner_url: None,
                });
                let i = owners.len() - 1;
                lookup.insert(key, i);
                i
            }
        };

        owners[owner_idx].properties.push(PropertyRef {
            row_index: idx,
            complex: row.complex.clone(),
            unit: row.unit.clone(),
            schedule: row.schedule.clone(),
            owner_row: None,
            complex_row: None,
            owner_url: None,
            complex_url: None,
            link_label: String::new(),
        });
        row_to_owner.push(owner_idx);
    }

    tracing::debug!("registry: {} owner(s) across {} row(s)", owners.len(), rows.len());
    (owners, row_to_owner)
}

/// Lay owners out consecutively on the detail sheet, starting at row 2
/// (row 1 is the header); each owner consumes one row per property.
pub fn assign_sheet_rows(owners: &mut [OwnerRecord]) {
    let mut current_row = 2u32;
    for owner in owners {
        owner.sheet_row = Some(current_row);
        current_row += owner.properties.len() as u32;
    }
}

/// Spreadsheet URL targeting one cell of one sheet.
pub fn sheet_url(doc_id: &str, gid: &str, cell_range: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{doc_id}/edit#gid={gid}&range={cell_range}")
}

/// Double embedded quotes so the label survives inside a formula string.
pub fn escape_label(label: &str) -> String {
    label.replace('"', "\"\"")
}

/// `=HYPERLINK(...)` formula with an escaped label.
pub fn hyperlink_formula(url: &str, label: &str) -> String {
    format!("=HYPERLINK(\"{url}\", \"{}\")", escape_label(label))
}

/// Compute every link address and fill the rows' link cells.
///
/// Each property gets: the owner's detail row (constant per owner), its own
/// per-property row, both URLs, and a short label (complex + unit, or complex
/// + schedule when no unit, falling back to the complex alone). Without a
/// complete set of spreadsheet identifiers the link cells get bare
/// cross-sheet cell references instead of formulas; a later link rewrite can
/// upgrade them once the identifiers are known.
pub fn apply_hyperlinks(
    rows: &mut [OwnerRow],
    owners: &mut [OwnerRecord],
    sheets: &SheetIdentifiers,
) {
    assign_sheet_rows(owners);
    let linkable = sheets.is_complete();
    for owner in owners.iter_mut() {
        let owner_row = owner.sheet_row.unwrap_or(2);
        let owner_url = sheet_url(&sheets.doc_id, &sheets.owner_gid, &format!("B{owner_row}"));
        owner.owner_url = linkable.then(|| owner_url.clone());

        for prop in &mut owner.properties {
            let complex_row = prop.row_index as u32 + 2;
            let complex_url =
                sheet_url(&sheets.doc_id, &sheets.complex_gid, &format!("A{complex_row}"));

            prop.owner_row = Some(owner_row);
            prop.owner_url = linkable.then(|| owner_url.clone());
            prop.complex_row = Some(complex_row);
            prop.complex_url = linkable.then_some(complex_url);

            let mut label_parts: Vec<&str> = vec![&prop.complex, &prop.unit];
            if prop.unit.is_empty() && !prop.schedule.is_empty() {
                label_parts.push(&prop.schedule);
            }
            let label = label_parts
                .iter()
                .filter(|part| !part.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            prop.link_label = if label.is_empty() {
                prop.complex.clone()
            } else {
                label
            };

            rows[prop.row_index].owner_link = if linkable {
                hyperlink_formula(&owner_url, &owner.owner_id)
            } else {
                format!("'By Owner'!B{owner_row}")
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: &str, last: &str, company: &str, complex: &str, unit: &str, sched: &str) -> OwnerRow {
        OwnerRow {
            complex: complex.to_string(),
            unit: unit.to_string(),
            owner_name: format!("{first} {last}").trim().to_string(),
            business: !company.is_empty(),
            schedule: sched.to_string(),
            first: first.to_string(),
            last: last.to_string(),
            company: company.to_string(),
            ..OwnerRow::default()
        }
    }

    #[test]
    fn test_case_insensitive_identity_dedups() {
        let rows = vec![
            row("John", "Doe", "", "Alpine", "2", "S1"),
            row("JOHN", "DOE", "", "Alpine", "4", "S2"),
            row("Jane", "Doe", "", "Alpine", "6", "S3"),
        ];
        let (owners, row_to_owner) = build_registry(&rows);
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].owner_id, "OWN0001");
        assert_eq!(owners[0].properties.len(), 2);
        assert_eq!(owners[1].owner_id, "OWN0002");
        assert_eq!(row_to_owner, vec![0, 0, 1]);
    }

    #[test]
    fn test_company_identity_separate_from_person() {
        let rows = vec![
            row("", "", "ACME LLC", "Alpine", "1", "S1"),
            row("", "", "acme llc", "Alpine", "2", "S2"),
            row("Acme", "Llc", "", "Alpine", "3", "S3"),
        ];
        let (owners, _) = build_registry(&rows);
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].properties.len(), 2);
    }

    #[test]
    fn test_sheet_row_layout_is_consecutive() {
        let rows = vec![
            row("John", "Doe", "", "Alpine", "2", "S1"),
            row("John", "Doe", "", "Alpine", "4", "S2"),
            row("Jane", "Roe", "", "Alpine", "6", "S3"),
        ];
        let (mut owners, _) = build_registry(&rows);
        assign_sheet_rows(&mut owners);
        assert_eq!(owners[0].sheet_row, Some(2));
        // John Doe consumes rows 2-3, so Jane Roe starts at 4.
        assert_eq!(owners[1].sheet_row, Some(4));
    }

    #[test]
    fn test_apply_hyperlinks_fills_link_cells_and_labels() {
        let mut rows = vec![
            row("John", "Doe", "", "Alpine", "2", "S1"),
            row("John", "Doe", "", "Birch", "", "S2"),
        ];
        let mut registry = build_registry(&rows);
        let sheets = SheetIdentifiers {
            doc_id: "DOC".to_string(),
            complex_gid: "111".to_string(),
            owner_gid: "222".to_string(),
        };
        apply_hyperlinks(&mut rows, &mut registry.0, &sheets);

        let owner = &registry.0[0];
        assert_eq!(owner.sheet_row, Some(2));
        let props = &owner.properties;
        assert_eq!(props[0].complex_row, Some(2));
        assert_eq!(props[1].complex_row, Some(3));
        assert_eq!(props[0].link_label, "Alpine 2");
        // No unit: the schedule number stands in.
        assert_eq!(props[1].link_label, "Birch S2");

        assert_eq!(
            rows[0].owner_link,
            "=HYPERLINK(\"https://docs.google.com/spreadsheets/d/DOC/edit#gid=222&range=B2\", \"OWN0001\")"
        );
        assert_eq!(rows[0].owner_link, rows[1].owner_link);
    }

    #[test]
    fn test_incomplete_identifiers_leave_bare_references() {
        let mut rows = vec![row("John", "Doe", "", "Alpine", "2", "S1")];
        let mut registry = build_registry(&rows);
        let sheets = SheetIdentifiers {
            doc_id: String::new(),
            complex_gid: "111".to_string(),
            owner_gid: "222".to_string(),
        };
        apply_hyperlinks(&mut rows, &mut registry.0, &sheets);
        assert_eq!(rows[0].owner_link, "'By Owner'!B2");
        assert!(registry.0[0].owner_url.is_none());
        assert!(registry.0[0].properties[0].complex_url.is_none());
    }

    #[test]
    fn test_hyperlink_formula_escapes_quotes() {
        assert_eq!(
            hyperlink_formula("https://x", "Say \"hi\""),
            "=HYPERLINK(\"https://x\", \"Say \"\"hi\"\"\")"
        );
    }
}
