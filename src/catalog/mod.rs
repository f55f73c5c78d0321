//! Remote feature-catalog access.
//!
//! ## Components
//! - `client`: opaque HTTP seam (`CatalogClient`) plus the reqwest-backed
//!   implementation used against real ArcGIS portals
//! - `geometry`: search regions and their envelope filters
//! - `engine`: paginated single-query engine (`query_all`)
//! - `aggregate`: multi-region / per-subdivision aggregation with dedup
//! - `overlay`: secondary-layer attribute joins keyed by schedule number

mod client;
pub use client::{CatalogClient, RestClient, check_remote_error};

mod geometry;
pub use geometry::{Envelope, Region};

mod engine;
pub use engine::{FeatureKey, Layer, QueryResult, RawFeature, query_all};

mod aggregate;
pub use aggregate::{Aggregator, FilterCriteria, combine_where, escape_sql_literal};

mod overlay;
pub use overlay::{OverlaySource, apply_overlay, collect_schedule_numbers, fetch_overlay};
