//! Linked two-sheet workbook export.
//!
//! "By Complex" carries one row per property with a hyperlink to its owner's
//! detail row; "By Owner" carries one row per (owner, property) pair linking
//! back to the property row. An Instructions sheet records the spreadsheet
//! identifiers the links were built against. `rewrite_links` retargets an
//! existing workbook's links to a new spreadsheet identity without
//! re-running the query.

use std::path::Path;
use std::sync::LazyLock;

use calamine::{Data, Reader, Xlsx, open_workbook};
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};

use crate::config::SheetIdentifiers;
use crate::error::{Error, Result};
use crate::owner::{OwnerRecord, OwnerRow, header_row, hyperlink_formula, sheet_url};

pub const INSTRUCTIONS_SHEET: &str = "Instructions";
pub const COMPLEX_SHEET: &str = "By Complex";
pub const OWNER_SHEET: &str = "By Owner";

/// Column headed "Owner Link" in the flat export order.
const OWNER_LINK_COL: usize = 3;
/// Column headed "Mailing Address" in the flat export order.
const MAILING_COL: usize = 5;

pub const OWNER_SHEET_COLUMNS: [&str; 20] = [
    "Owner ID",
    "Owner Name",
    "Business Owner?",
    "Mailing Address",
    "Address Line 1",
    "Address Line 2",
    "City",
    "State",
    "Zip5",
    "Zip9",
    "Company",
    "First name",
    "Middle",
    "Last Name",
    "Suffix",
    "Property Index",
    "Property Complex",
    "Property Unit",
    "Schedule Number",
    "Complex Sheet Link",
];

static HYPERLINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^=?HYPERLINK\("([^"]+)",\s*"((?:[^"]|"")*)"\)$"#).expect("static regex")
});

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&#]range=([A-Za-z]{1,3}[0-9]+)").expect("static regex"));

// Bare cross-sheet references look like B12 or 'By Owner'!B12.
static CELL_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:'[^']+'!)?([A-Za-z]{1,3}[0-9]+)$").expect("static regex"));

/// Pull the target cell address and the (still escaped) label out of a
/// hyperlink formula. Returns None for anything that is not one of ours.
pub fn extract_range_and_label(formula: &str) -> Option<(String, String)> {
    let caps = HYPERLINK_RE.captures(formula.trim())?;
    let url = caps.get(1)?.as_str();
    let label = caps.get(2)?.as_str().to_string();
    let range = RANGE_RE.captures(url)?.get(1)?.as_str().to_string();
    Some((range, label))
}

/// Label comes in already escaped, so bypass the escaping helper.
fn raw_hyperlink(url: &str, escaped_label: &str) -> String {
    format!("=HYPERLINK(\"{url}\", \"{escaped_label}\")")
}

fn instructions_lines(sheets: &SheetIdentifiers) -> Vec<String> {
    vec![
        "Owner roster export".to_string(),
        String::new(),
        format!("{COMPLEX_SHEET}: one row per property; the Owner Link column jumps to that owner's detail row."),
        format!("{OWNER_SHEET}: one row per owner/property pair; the Complex Sheet Link column jumps back to the property row."),
        String::new(),
        format!("Links target spreadsheet document {}.", sheets.doc_id),
        format!("{COMPLEX_SHEET} sheet id: {}", sheets.complex_gid),
        format!("{OWNER_SHEET} sheet id: {}", sheets.owner_gid),
        String::new(),
        "If this workbook is relocated to a different spreadsheet, rewrite the links against the new identifiers instead of re-running the query.".to_string(),
    ]
}

/// Serialize rows and the owner registry into the three-sheet workbook.
///
/// Call `apply_hyperlinks` first so every property carries its link
/// addressing; link cells for rows lacking it come out as plain text.
pub fn write_workbook(
    path: &Path,
    rows: &[OwnerRow],
    extra_columns: &[String],
    owners: &[OwnerRecord],
    row_to_owner: &[usize],
    sheets: &SheetIdentifiers,
) -> Result<()> {
    if rows.is_empty() {
        return Err(Error::validation("no rows to export; refusing to write an empty workbook"));
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let wrap = Format::new().set_text_wrap();

    let instructions = workbook.add_worksheet();
    instructions.set_name(INSTRUCTIONS_SHEET)?;
    for (r, line) in instructions_lines(sheets).iter().enumerate() {
        instructions.write_string(r as u32, 0, line)?;
    }

    let complex = workbook.add_worksheet();
    complex.set_name(COMPLEX_SHEET)?;
    let mut complex_headers = header_row(extra_columns);
    complex_headers.push("Owner ID".to_string());
    complex_headers.push("Owner Link".to_string());
    for (c, name) in complex_headers.iter().enumerate() {
        complex.write_string_with_format(0, c as u16, name, &bold)?;
    }
    for (idx, row) in rows.iter().enumerate() {
        let r = idx as u32 + 1;
        for (c, value) in row.record().iter().enumerate() {
            if c == OWNER_LINK_COL && value.starts_with('=') {
                complex.write_formula(r, c as u16, value.as_str())?;
            } else if c == MAILING_COL {
                // The composed mailing block spans multiple lines.
                complex.write_string_with_format(r, c as u16, value, &wrap)?;
            } else {
                complex.write_string(r, c as u16, value)?;
            }
        }
        let owner_id = row_to_owner
            .get(idx)
            .and_then(|&i| owners.get(i))
            .map(|o| o.owner_id.as_str())
            .unwrap_or("");
        let id_col = (complex_headers.len() - 2) as u16;
        complex.write_string(r, id_col, owner_id)?;
        // The trailing column repeats the link value for callers that hide
        // the primary Owner Link column.
        if row.owner_link.starts_with('=') {
            complex.write_formula(r, id_col + 1, row.owner_link.as_str())?;
        } else {
            complex.write_string(r, id_col + 1, &row.owner_link)?;
        }
    }

    let owner_sheet = workbook.add_worksheet();
    owner_sheet.set_name(OWNER_SHEET)?;
    for (c, name) in OWNER_SHEET_COLUMNS.iter().enumerate() {
        owner_sheet.write_string_with_format(0, c as u16, *name, &bold)?;
    }
    let mut r = 1u32;
    for owner in owners {
        let business = if owner.business { "Yes" } else { "No" };
        for (i, prop) in owner.properties.iter().enumerate() {
            let attrs = [
                owner.owner_id.as_str(),
                owner.display_name.as_str(),
                business,
                owner.mailing.as_str(),
                owner.address1.as_str(),
                owner.address2.as_str(),
                owner.city.as_str(),
                owner.state.as_str(),
                owner.zip5.as_str(),
                owner.zip9.as_str(),
                owner.company.as_str(),
                owner.first.as_str(),
                owner.middle.as_str(),
                owner.last.as_str(),
                owner.suffix.as_str(),
            ];
            for (c, value) in attrs.iter().enumerate() {
                if c == 3 {
                    owner_sheet.write_string_with_format(r, c as u16, *value, &wrap)?;
                } else {
                    owner_sheet.write_string(r, c as u16, *value)?;
                }
            }
            // Property index counts within the owner, starting at 1.
            owner_sheet.write_number(r, 15, (i + 1) as f64)?;
            owner_sheet.write_string(r, 16, &prop.complex)?;
            owner_sheet.write_string(r, 17, &prop.unit)?;
            owner_sheet.write_string(r, 18, &prop.schedule)?;
            match &prop.complex_url {
                Some(url) => {
                    owner_sheet
                        .write_formula(r, 19, hyperlink_formula(url, &prop.link_label).as_str())?;
                }
                None => {
                    // No document id yet: a bare reference the link rewrite
                    // can upgrade once identifiers are known.
                    let complex_row = prop.complex_row.unwrap_or(prop.row_index as u32 + 2);
                    owner_sheet.write_string(r, 19, &format!("'{COMPLEX_SHEET}'!A{complex_row}"))?;
                }
            }
            r += 1;
        }
    }

    workbook.save(path)?;
    tracing::info!(
        "wrote workbook with {} property row(s), {} owner(s) to {}",
        rows.len(),
        owners.len(),
        path.display()
    );
    Ok(())
}

/// In-memory picture of one sheet, formulas kept as text.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Formula(String),
}

fn read_sheet(workbook: &mut Xlsx<std::io::BufReader<std::fs::File>>, name: &str) -> Result<Vec<Vec<Cell>>> {
    let range = workbook
        .worksheet_range(name)
        .map_err(|e| Error::data_shape(format!("cannot read sheet {name:?}: {e}")))?;
    let formulas = workbook
        .worksheet_formula(name)
        .map_err(|e| Error::data_shape(format!("cannot read formulas of sheet {name:?}: {e}")))?;

    let end_row = range
        .end()
        .map(|(r, _)| r)
        .max(formulas.end().map(|(r, _)| r))
        .map(|r| r as usize + 1)
        .unwrap_or(0);
    let end_col = range
        .end()
        .map(|(_, c)| c)
        .max(formulas.end().map(|(_, c)| c))
        .map(|c| c as usize + 1)
        .unwrap_or(0);
    let mut grid = vec![vec![Cell::Empty; end_col]; end_row];

    if let Some((row0, col0)) = range.start() {
        for (r, row) in range.rows().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let cell = match value {
                    Data::Empty => Cell::Empty,
                    Data::String(s) => Cell::Text(s.clone()),
                    Data::Float(f) => Cell::Number(*f),
                    Data::Int(i) => Cell::Number(*i as f64),
                    Data::Bool(b) => Cell::Bool(*b),
                    other => Cell::Text(other.to_string()),
                };
                grid[row0 as usize + r][col0 as usize + c] = cell;
            }
        }
    }

    // Formula text wins over the cached value calamine reports for the cell.
    if let Some((row0, col0)) = formulas.start() {
        for (r, row) in formulas.rows().enumerate() {
            for (c, text) in row.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                let formula = if text.starts_with('=') {
                    text.clone()
                } else {
                    format!("={text}")
                };
                grid[row0 as usize + r][col0 as usize + c] = Cell::Formula(formula);
            }
        }
    }

    Ok(grid)
}

/// Every column carrying the given header ("By Complex" repeats the link
/// column at the end of the row).
fn header_columns(grid: &[Vec<Cell>], sheet: &str, header: &str) -> Result<Vec<usize>> {
    let header_cells = grid.first().ok_or_else(|| {
        Error::data_shape(format!("sheet {sheet:?} is empty, expected a header row"))
    })?;
    let columns: Vec<usize> = header_cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| matches!(cell, Cell::Text(t) if t == header))
        .map(|(c, _)| c)
        .collect();
    if columns.is_empty() {
        return Err(Error::data_shape(format!(
            "sheet {sheet:?} is missing the {header:?} header"
        )));
    }
    Ok(columns)
}

/// Regenerate one link cell against a new document identity. Cells that are
/// not hyperlink formulas, bare target URLs, or bare cell references pass
/// through untouched.
fn rewrite_cell(cell: &Cell, doc_id: &str, gid: &str) -> Cell {
    match cell {
        Cell::Formula(f) => {
            if let Some((range, label)) = extract_range_and_label(f) {
                return Cell::Formula(raw_hyperlink(&sheet_url(doc_id, gid, &range), &label));
            }
            // A formula that is just a cross-sheet reference, e.g. ='By Owner'!B2.
            let bare = f.trim().trim_start_matches('=');
            if let Some(caps) = CELL_REF_RE.captures(bare) {
                let range = caps[1].to_string();
                return Cell::Formula(raw_hyperlink(&sheet_url(doc_id, gid, &range), &range));
            }
            cell.clone()
        }
        Cell::Text(t) => {
            let trimmed = t.trim();
            if let Some(caps) = RANGE_RE.captures(trimmed) {
                if trimmed.starts_with("https://") {
                    let range = caps[1].to_string();
                    return Cell::Text(sheet_url(doc_id, gid, &range));
                }
            }
            if let Some(caps) = CELL_REF_RE.captures(trimmed) {
                let range = caps[1].to_string();
                let url = sheet_url(doc_id, gid, &range);
                return Cell::Formula(raw_hyperlink(&url, &range));
            }
            cell.clone()
        }
        other => other.clone(),
    }
}

/// Retarget an existing workbook's cross-sheet links to a new spreadsheet
/// identity, writing the result to `output`. Both data sheets and their link
/// headers must be present. Rewriting twice against the same identity yields
/// identical formula text.
pub fn rewrite_links(input: &Path, output: &Path, sheets: &SheetIdentifiers) -> Result<()> {
    let mut source: Xlsx<_> = open_workbook(input)?;
    let mut complex_grid = read_sheet(&mut source, COMPLEX_SHEET)?;
    let mut owner_grid = read_sheet(&mut source, OWNER_SHEET)?;

    let owner_link_cols = header_columns(&complex_grid, COMPLEX_SHEET, "Owner Link")?;
    let complex_link_cols = header_columns(&owner_grid, OWNER_SHEET, "Complex Sheet Link")?;

    let mut rewritten = 0usize;
    for row in complex_grid.iter_mut().skip(1) {
        for &col in &owner_link_cols {
            if let Some(cell) = row.get_mut(col) {
                let updated = rewrite_cell(cell, &sheets.doc_id, &sheets.owner_gid);
                if updated != *cell {
                    rewritten += 1;
                }
                *cell = updated;
            }
        }
    }
    for row in owner_grid.iter_mut().skip(1) {
        for &col in &complex_link_cols {
            if let Some(cell) = row.get_mut(col) {
                let updated = rewrite_cell(cell, &sheets.doc_id, &sheets.complex_gid);
                if updated != *cell {
                    rewritten += 1;
                }
                *cell = updated;
            }
        }
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let instructions = workbook.add_worksheet();
    instructions.set_name(INSTRUCTIONS_SHEET)?;
    for (r, line) in instructions_lines(sheets).iter().enumerate() {
        instructions.write_string(r as u32, 0, line)?;
    }

    for (name, grid) in [(COMPLEX_SHEET, &complex_grid), (OWNER_SHEET, &owner_grid)] {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        for (r, row) in grid.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Empty => {}
                    Cell::Text(t) => {
                        if r == 0 {
                            worksheet.write_string_with_format(r as u32, c as u16, t, &bold)?;
                        } else {
                            worksheet.write_string(r as u32, c as u16, t)?;
                        }
                    }
                    Cell::Number(n) => {
                        worksheet.write_number(r as u32, c as u16, *n)?;
                    }
                    Cell::Bool(b) => {
                        worksheet.write_boolean(r as u32, c as u16, *b)?;
                    }
                    Cell::Formula(f) => {
                        worksheet.write_formula(r as u32, c as u16, f.as_str())?;
                    }
                }
            }
        }
    }

    workbook.save(output)?;
    tracing::info!(
        "rewrote {rewritten} link cell(s) against document {} into {}",
        sheets.doc_id,
        output.display()
    );
    Ok(())
}
