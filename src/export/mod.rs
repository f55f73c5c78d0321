pub mod csv;
pub mod workbook;

pub use csv::to_delimited;
pub use workbook::{rewrite_links, write_workbook};
