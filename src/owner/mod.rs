//! Owner identity and mailing-address handling.
//!
//! ## Components
//! - `normalize`: raw owner/address text blobs into structured fields
//! - `table`: deduplicated features into sorted printable rows
//! - `registry`: owner dedup across rows plus cross-sheet link addressing

mod normalize;
pub use normalize::{
    AddressParts, NameParts, display_name, parse_address, split_name, split_owner_names,
    title_case,
};

mod table;
pub use table::{OwnerRow, PRIMARY_COLUMNS, SUPPLEMENTAL_COLUMNS, build_rows, header_row};

mod registry;
pub use registry::{
    OwnerRecord, PropertyRef, apply_hyperlinks, assign_sheet_rows, build_registry,
    escape_label, hyperlink_formula, sheet_url,
};
