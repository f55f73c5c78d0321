//! Secondary-layer attribute joins.
//!
//! Zoning and land-use layers expose compliance attributes keyed by the same
//! parcel schedule numbers as the primary layer. The overlay fetch pulls those
//! attributes in chunked IN-clause queries and copies them into the primary
//! features as extra export columns.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::aggregate::{combine_where, escape_sql_literal};
use super::client::CatalogClient;
use super::engine::{Layer, RawFeature, query_all};
use crate::error::Result;

/// Schedule numbers per IN clause; keeps the WHERE string well under service
/// URL/parameter limits.
const CHUNK_SIZE: usize = 200;

/// Describes how to query one overlay layer.
#[derive(Debug, Clone)]
pub struct OverlaySource {
    pub layer_url: String,
    /// Field in the overlay layer holding the parcel schedule number.
    pub join_field: String,
    /// Optional extra WHERE clause applied to every chunk.
    pub where_clause: Option<String>,
    /// (output column name, overlay source field) pairs, in export order.
    pub columns: Vec<(String, String)>,
}

/// Distinct non-blank schedule numbers present in the feature set.
pub fn collect_schedule_numbers(features: &[RawFeature], schedule_field: &str) -> BTreeSet<String> {
    features
        .iter()
        .map(|f| f.attr_str(schedule_field).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn build_in_clause(field: &str, values: &[String]) -> String {
    let safe: Vec<String> = values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| format!("'{}'", escape_sql_literal(v)))
        .collect();
    if safe.is_empty() {
        return "1=0".to_string();
    }
    format!("{} IN ({})", field, safe.join(", "))
}

/// Fetch overlay attribute values for the given schedule numbers.
///
/// Returns a schedule → (source field → value) map. When a schedule appears in
/// more than one chunk or row, earlier non-null values win per field.
pub async fn fetch_overlay<C: CatalogClient>(
    client: &C,
    source: &OverlaySource,
    schedule_numbers: &BTreeSet<String>,
) -> Result<HashMap<String, HashMap<String, Value>>> {
    if schedule_numbers.is_empty() {
        return Ok(HashMap::new());
    }

    let layer = Layer::connect(client, &source.layer_url).await?;
    let base_where = source
        .where_clause
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("1=1");

    let mut all_fields: BTreeSet<&str> = source
        .columns
        .iter()
        .map(|(_, field)| field.as_str())
        .collect();
    all_fields.insert(source.join_field.as_str());
    let out_fields = all_fields.into_iter().collect::<Vec<_>>().join(",");

    let schedules: Vec<String> = schedule_numbers.iter().cloned().collect();
    let mut overlay_map: HashMap<String, HashMap<String, Value>> = HashMap::new();

    for chunk in schedules.chunks(CHUNK_SIZE) {
        let clause = build_in_clause(&source.join_field, chunk);
        let combined = combine_where(base_where, &clause);
        let result = query_all(client, &layer, None, &combined, &out_fields, false, None).await?;

        for feature in &result.features {
            let key = feature.attr_str(&source.join_field).trim().to_string();
            if key.is_empty() {
                continue;
            }
            let entry = overlay_map.entry(key).or_default();
            for (_, field) in &source.columns {
                match feature.attributes.get(field) {
                    None | Some(Value::Null) => {}
                    Some(value) => {
                        entry.entry(field.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
        }
    }

    tracing::info!(
        "overlay {} matched {} of {} schedule number(s)",
        source.layer_url,
        overlay_map.len(),
        schedule_numbers.len()
    );
    Ok(overlay_map)
}

/// Copy fetched overlay values into the primary features under the output
/// column names. Features without a matching schedule are left untouched.
pub fn apply_overlay(
    features: &mut [RawFeature],
    overlay_map: &HashMap<String, HashMap<String, Value>>,
    columns: &[(String, String)],
    schedule_field: &str,
) {
    if overlay_map.is_empty() {
        return;
    }

    for feature in features {
        let schedule = feature.attr_str(schedule_field).trim().to_string();
        if schedule.is_empty() {
            continue;
        }
        let Some(values) = overlay_map.get(&schedule) else {
            continue;
        };
        for (output_name, source_field) in columns {
            match values.get(source_field) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => {
                    feature
                        .attributes
                        .insert(output_name.clone(), Value::String(s.clone()));
                }
                Some(other) => {
                    feature
                        .attributes
                        .insert(output_name.clone(), Value::String(other.to_string()));
                }
            }
        }
    }
}
