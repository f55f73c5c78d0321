//! Parcel roster export pipeline.
//!
//! Queries an ArcGIS-style hosted feature catalog for parcel records inside one
//! or more search regions, deduplicates and aggregates the pages, normalizes
//! owner names and mailing addresses into structured fields, and emits the
//! result as a delimited table and a two-sheet workbook with cross-sheet
//! hyperlinks.
//!
//! ## Main components
//! - `catalog`: paginated query engine, region aggregation, overlay joins
//! - `owner`: name/address normalization, row building, owner registry
//! - `export`: CSV serialization and the linked workbook writer/rewriter
//! - `pipeline`: top-level driver wiring the stages together

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub mod catalog;
pub mod owner;
pub mod export;

pub use config::{CatalogConfig, FieldMap, SheetIdentifiers};
pub use error::{Error, Result};
pub use pipeline::{ExportOutput, ExportRequest, run_owner_export, run_raw_query};
