//! End-to-end export orchestration.
//!
//! The caller hands over regions, filter criteria, and output destinations;
//! everything from the catalog round-trips to the serialized exports runs
//! strictly sequentially so dedup order and subdivision enumeration stay
//! deterministic.

use std::path::PathBuf;

use crate::catalog::{
    Aggregator, CatalogClient, FilterCriteria, Layer, OverlaySource, Region, apply_overlay,
    collect_schedule_numbers, fetch_overlay,
};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::export::{to_delimited, write_workbook};
use crate::owner::{OwnerRecord, OwnerRow, apply_hyperlinks, build_registry, build_rows};

/// One export invocation's worth of caller input.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub regions: Vec<Region>,
    pub criteria: FilterCriteria,
    /// Split the query per distinct subdivision value instead of one pass
    /// per region. Recovers full coverage when the catalog silently caps
    /// large single queries.
    pub by_subdivision: bool,
    /// Secondary layers joined onto the result, applied in order; their
    /// output columns land in the export in the same order.
    pub overlays: Vec<OverlaySource>,
    pub delimiter: u8,
    pub csv_path: Option<PathBuf>,
    pub workbook_path: Option<PathBuf>,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            criteria: FilterCriteria::default(),
            by_subdivision: false,
            overlays: Vec::new(),
            delimiter: b'\t',
            csv_path: None,
            workbook_path: None,
        }
    }
}

/// Everything a run produces, returned by value.
pub struct ExportOutput {
    pub delimited: String,
    pub rows: Vec<OwnerRow>,
    pub owners: Vec<OwnerRecord>,
    pub truncated: bool,
}

fn validate(request: &ExportRequest) -> Result<()> {
    if request.regions.is_empty() {
        return Err(Error::validation("at least one search region is required"));
    }
    if request.csv_path.is_some() && request.workbook_path.is_some() {
        return Err(Error::validation(
            "csv and workbook destinations are mutually exclusive; pick one",
        ));
    }
    Ok(())
}

/// Run the full query → normalize → link → export pipeline.
///
/// The delimited text is always produced and returned; file destinations are
/// written only when requested. Workbook output needs a complete set of
/// spreadsheet identifiers in the configuration.
pub async fn run_owner_export<C: CatalogClient>(
    client: &C,
    config: &CatalogConfig,
    request: &ExportRequest,
) -> Result<ExportOutput> {
    validate(request)?;
    if request.workbook_path.is_some() && !config.sheets.is_complete() {
        return Err(Error::validation(
            "workbook output needs the spreadsheet document id and both sheet ids",
        ));
    }

    let layer = Layer::connect(client, &config.layer_url).await?;
    let aggregator = Aggregator::new(client, &layer, &config.field_map);
    let mut result = if request.by_subdivision {
        aggregator
            .aggregate_by_subdivision(&request.regions, &request.criteria)
            .await?
    } else {
        aggregator.aggregate(&request.regions, &request.criteria).await?
    };
    if result.truncated {
        tracing::warn!(
            "result set is truncated at {} feature(s); narrow the filter or raise the cap",
            result.features.len()
        );
    }

    let mut extra_columns: Vec<String> = Vec::new();
    if !request.overlays.is_empty() {
        let schedules = collect_schedule_numbers(&result.features, &config.field_map.schedule);
        for overlay in &request.overlays {
            let overlay_map = fetch_overlay(client, overlay, &schedules).await?;
            apply_overlay(
                &mut result.features,
                &overlay_map,
                &overlay.columns,
                &config.field_map.schedule,
            );
            extra_columns.extend(overlay.columns.iter().map(|(name, _)| name.clone()));
        }
    }

    let mut rows = build_rows(&result.features, &config.field_map, &extra_columns);
    let (mut owners, row_to_owner) = build_registry(&rows);
    apply_hyperlinks(&mut rows, &mut owners, &config.sheets);

    let delimited = to_delimited(&rows, &extra_columns, request.delimiter)?;
    if let Some(path) = &request.csv_path {
        std::fs::write(path, &delimited)?;
        tracing::info!("wrote {} row(s) to {}", rows.len(), path.display());
    }
    if let Some(path) = &request.workbook_path {
        write_workbook(path, &rows, &extra_columns, &owners, &row_to_owner, &config.sheets)?;
    }

    Ok(ExportOutput {
        delimited,
        rows,
        owners,
        truncated: result.truncated,
    })
}

/// Aggregate the regions and pretty-print the raw catalog payload as JSON.
/// Useful for poking at the layer without building the roster; honors the
/// same per-subdivision split as the roster export.
pub async fn run_raw_query<C: CatalogClient>(
    client: &C,
    config: &CatalogConfig,
    regions: &[Region],
    criteria: &FilterCriteria,
    by_subdivision: bool,
) -> Result<String> {
    if regions.is_empty() {
        return Err(Error::validation("at least one search region is required"));
    }
    let layer = Layer::connect(client, &config.layer_url).await?;
    let aggregator = Aggregator::new(client, &layer, &config.field_map);
    let result = if by_subdivision {
        aggregator.aggregate_by_subdivision(regions, criteria).await?
    } else {
        aggregator.aggregate(regions, criteria).await?
    };
    serde_json::to_string_pretty(&result.to_value())
        .map_err(|e| Error::data_shape(format!("cannot serialize query result: {e}")))
}
