//! Flat delimited rendering of the built rows.

use csv::WriterBuilder;

use crate::error::{Error, Result};
use crate::owner::{OwnerRow, header_row};

/// Render the header plus every row as delimited text.
///
/// Quoting is left to the writer, so link formulas and free-text fields
/// containing the delimiter come through intact.
pub fn to_delimited(rows: &[OwnerRow], extra_columns: &[String], delimiter: u8) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(header_row(extra_columns))?;
    for row in rows {
        writer.write_record(row.record())?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::data_shape(format!("failed to flush delimited output: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::data_shape(format!("delimited output is not valid UTF-8: {e}")))
}
