//! Multi-region aggregation with identity-key deduplication.
//!
//! Requests run strictly sequentially: first-seen-wins dedup and the
//! deterministic subdivision enumeration both depend on request order.

use std::collections::HashSet;

use super::client::CatalogClient;
use super::engine::{FeatureKey, Layer, QueryResult, query_all};
use super::geometry::Region;
use crate::config::FieldMap;
use crate::error::Result;

/// Caller-supplied filter settings for one aggregation run.
#[derive(Debug, Clone)]
pub struct FilterCriteria {
    pub where_clause: String,
    pub out_fields: String,
    pub return_geometry: bool,
    pub max_records: Option<usize>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            where_clause: "1=1".to_string(),
            out_fields: "*".to_string(),
            return_geometry: true,
            max_records: None,
        }
    }
}

/// Runs the query engine over one or more regions and merges the results.
pub struct Aggregator<'a, C: CatalogClient> {
    client: &'a C,
    layer: &'a Layer,
    fields: &'a FieldMap,
}

impl<'a, C: CatalogClient> Aggregator<'a, C> {
    pub fn new(client: &'a C, layer: &'a Layer, fields: &'a FieldMap) -> Self {
        Self { client, layer, fields }
    }

    /// One `query_all` per region, merged with first-occurrence-wins dedup.
    ///
    /// The merged truncation flag is the OR of all per-region flags; a global
    /// record cap clips the merged list and forces the flag on when it bites.
    pub async fn aggregate(
        &self,
        regions: &[Region],
        criteria: &FilterCriteria,
    ) -> Result<QueryResult> {
        let mut merged = QueryResult::empty();
        let mut seen: HashSet<FeatureKey> = HashSet::new();

        for region in regions {
            let envelope = region.envelope()?;
            tracing::debug!(
                "querying region ({}, {}) r={}m",
                region.lat,
                region.lng,
                region.radius_m
            );
            let result = query_all(
                self.client,
                self.layer,
                Some(&envelope),
                &criteria.where_clause,
                &criteria.out_fields,
                criteria.return_geometry,
                criteria.max_records,
            )
            .await?;

            self.merge_into(&mut merged, &mut seen, result);
            if apply_cap(&mut merged, criteria.max_records) {
                break;
            }
        }

        tracing::info!(
            "aggregated {} unique features across {} region(s)",
            merged.features.len(),
            regions.len()
        );
        Ok(merged)
    }

    /// Split each region's query by distinct subdivision value.
    ///
    /// Catalogs silently cap very large single queries; enumerating a known
    /// low-cardinality attribute first and issuing one uncapped sub-query per
    /// value recovers full coverage for one extra discovery round-trip.
    pub async fn aggregate_by_subdivision(
        &self,
        regions: &[Region],
        criteria: &FilterCriteria,
    ) -> Result<QueryResult> {
        let mut merged = QueryResult::empty();
        let mut seen: HashSet<FeatureKey> = HashSet::new();

        for region in regions {
            let result = self.query_region_by_subdivision(region, criteria).await?;
            self.merge_into(&mut merged, &mut seen, result);
            if apply_cap(&mut merged, criteria.max_records) {
                break;
            }
        }

        Ok(merged)
    }

    /// Subdivision pass for a single region: discovery query, then one
    /// uncapped sub-query per distinct label, concatenated in label order.
    async fn query_region_by_subdivision(
        &self,
        region: &Region,
        criteria: &FilterCriteria,
    ) -> Result<QueryResult> {
        let envelope = region.envelope()?;
        let filters = self
            .collect_subdivision_filters(&envelope, &criteria.where_clause)
            .await?;
        tracing::debug!("subdivision pass: {} distinct value(s)", filters.len());

        if filters.is_empty() {
            return query_all(
                self.client,
                self.layer,
                Some(&envelope),
                &criteria.where_clause,
                &criteria.out_fields,
                criteria.return_geometry,
                criteria.max_records,
            )
            .await;
        }

        let mut aggregated = QueryResult::empty();
        let mut have_template = false;

        for (label, clause) in filters {
            let where_clause = combine_where(&criteria.where_clause, &clause);
            tracing::debug!("subdivision '{}': {}", label, where_clause);
            let sub = query_all(
                self.client,
                self.layer,
                Some(&envelope),
                &where_clause,
                &criteria.out_fields,
                criteria.return_geometry,
                None,
            )
            .await?;

            if !have_template {
                aggregated.template = sub.template;
                have_template = true;
            }
            aggregated.truncated |= sub.truncated;
            aggregated.features.extend(sub.features);
        }

        // The concatenated pass only clips when it actually overflows the cap.
        if let Some(cap) = criteria.max_records {
            if aggregated.features.len() > cap {
                aggregated.features.truncate(cap);
                aggregated.truncated = true;
            }
        }
        Ok(aggregated)
    }

    /// Discover the distinct subdivision labels inside the envelope.
    ///
    /// Labels compare case-insensitively after trimming; blank and null values
    /// collapse into one "Unspecified" bucket matched with an IS-NULL-OR-EMPTY
    /// clause. The result is sorted case-insensitively by label.
    async fn collect_subdivision_filters(
        &self,
        envelope: &super::geometry::Envelope,
        base_where: &str,
    ) -> Result<Vec<(String, String)>> {
        let field = &self.fields.subdivision;
        let result = query_all(
            self.client,
            self.layer,
            Some(envelope),
            base_where,
            field,
            false,
            None,
        )
        .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut filters: Vec<(String, String)> = Vec::new();

        for feature in &result.features {
            let raw_name = feature.attr_str(field).trim().to_string();
            let key = if raw_name.is_empty() {
                "__BLANK__".to_string()
            } else {
                raw_name.to_uppercase()
            };
            if !seen.insert(key) {
                continue;
            }

            if raw_name.is_empty() {
                let clause = format!("({field} IS NULL OR {field} = '')");
                filters.push(("Unspecified".to_string(), clause));
            } else {
                let clause = format!("{field} = '{}'", escape_sql_literal(&raw_name));
                filters.push((raw_name, clause));
            }
        }

        filters.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
        Ok(filters)
    }

    fn merge_into(
        &self,
        merged: &mut QueryResult,
        seen: &mut HashSet<FeatureKey>,
        result: QueryResult,
    ) {
        if merged.template.is_empty() {
            merged.template = result.template;
        }
        merged.truncated |= result.truncated;
        for feature in result.features {
            // First occurrence wins; later duplicates are dropped whole, not
            // merged field-by-field.
            if seen.insert(feature.key(self.fields)) {
                merged.features.push(feature);
            }
        }
    }
}

/// Clip to the global record cap. Returns true when the cap was hit.
fn apply_cap(result: &mut QueryResult, max_records: Option<usize>) -> bool {
    match max_records {
        Some(cap) if result.features.len() >= cap => {
            if result.features.len() > cap {
                result.features.truncate(cap);
                result.truncated = true;
            } else if result.features.len() == cap {
                result.truncated = true;
            }
            true
        }
        _ => false,
    }
}

/// AND two WHERE clauses, absorbing blank and `1=1` trivial filters.
pub fn combine_where(base: &str, clause: &str) -> String {
    let base = base.trim();
    if clause.is_empty() || clause == "1=1" {
        if !base.is_empty() {
            return base.to_string();
        }
        if !clause.is_empty() {
            return clause.to_string();
        }
        return "1=1".to_string();
    }
    if base.is_empty() || base == "1=1" {
        return clause.to_string();
    }
    format!("({base}) AND ({clause})")
}

/// Double embedded single quotes for safe SQL-literal interpolation.
pub fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::super::engine::tests::{PagedCatalog, make_feature};
    use super::*;
    use crate::catalog::CatalogClient;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    fn fields() -> FieldMap {
        FieldMap::default()
    }

    #[tokio::test]
    async fn test_overlapping_regions_dedup_to_set_union() {
        // The same fixed catalog answers every region, so two regions return
        // identical feature sets and the union must equal one region's worth.
        let catalog = PagedCatalog::new((1..=6).map(make_feature).collect());
        let layer = Layer::with_page_size("https://example.test/0", 10);
        let fields = fields();
        let aggregator = Aggregator::new(&catalog, &layer, &fields);

        let regions = [Region::new(39.6, -106.0, 400.0), Region::new(39.61, -106.01, 400.0)];
        let result = aggregator
            .aggregate(&regions, &FilterCriteria::default())
            .await
            .unwrap();

        assert_eq!(result.features.len(), 6);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_global_cap_forces_truncated() {
        let catalog = PagedCatalog::new((1..=9).map(make_feature).collect());
        let layer = Layer::with_page_size("https://example.test/0", 20);
        let fields = fields();
        let aggregator = Aggregator::new(&catalog, &layer, &fields);

        let criteria = FilterCriteria {
            max_records: Some(4),
            ..FilterCriteria::default()
        };
        let result = aggregator
            .aggregate(&[Region::new(39.6, -106.0, 400.0)], &criteria)
            .await
            .unwrap();

        assert_eq!(result.features.len(), 4);
        assert!(result.truncated);
    }

    /// Catalog that records WHERE clauses and answers the discovery query with
    /// a mixed bag of subdivision labels.
    struct SubdivisionCatalog {
        wheres: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CatalogClient for SubdivisionCatalog {
        async fn get(&self, _url: &str, params: &[(String, String)]) -> crate::error::Result<Value> {
            let lookup = |name: &str| {
                params
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            };
            let where_clause = lookup("where");
            let out_fields = lookup("outFields");
            self.wheres.lock().unwrap().push(where_clause.clone());

            if out_fields == "SubdivisionName" {
                // Discovery pass: duplicate labels in mixed case plus a blank.
                return Ok(json!({
                    "features": [
                        {"attributes": {"SubdivisionName": "Beta Condos"}},
                        {"attributes": {"SubdivisionName": "ALPHA"}},
                        {"attributes": {"SubdivisionName": "alpha"}},
                        {"attributes": {"SubdivisionName": ""}},
                    ],
                    "exceededTransferLimit": false,
                }));
            }

            let id = self.wheres.lock().unwrap().len() as u64;
            Ok(json!({
                "features": [make_feature(id * 100)],
                "exceededTransferLimit": false,
            }))
        }
    }

    #[tokio::test]
    async fn test_subdivision_pass_enumerates_sorted_distinct_labels() {
        let catalog = SubdivisionCatalog {
            wheres: std::sync::Mutex::new(Vec::new()),
        };
        let layer = Layer::with_page_size("https://example.test/0", 100);
        let fields = fields();
        let aggregator = Aggregator::new(&catalog, &layer, &fields);

        let result = aggregator
            .aggregate_by_subdivision(
                &[Region::new(39.6, -106.0, 400.0)],
                &FilterCriteria::default(),
            )
            .await
            .unwrap();

        // One feature per sub-query: ALPHA, Beta Condos, Unspecified.
        assert_eq!(result.features.len(), 3);

        let wheres = catalog.wheres.lock().unwrap().clone();
        // Discovery query first, then the per-label clauses sorted
        // case-insensitively, blank bucket last.
        assert_eq!(wheres[0], "1=1");
        assert_eq!(wheres[1], "SubdivisionName = 'ALPHA'");
        assert_eq!(wheres[2], "SubdivisionName = 'Beta Condos'");
        assert_eq!(
            wheres[3],
            "(SubdivisionName IS NULL OR SubdivisionName = '')"
        );
    }

    #[test]
    fn test_combine_where_absorbs_trivial_filters() {
        assert_eq!(combine_where("1=1", "A = 'x'"), "A = 'x'");
        assert_eq!(combine_where("", "A = 'x'"), "A = 'x'");
        assert_eq!(combine_where("B = 1", "1=1"), "B = 1");
        assert_eq!(combine_where("", ""), "1=1");
        assert_eq!(combine_where("B = 1", "A = 'x'"), "(B = 1) AND (A = 'x')");
    }

    #[test]
    fn test_escape_sql_literal_doubles_quotes() {
        assert_eq!(escape_sql_literal("O'Brien's"), "O''Brien''s");
        assert_eq!(escape_sql_literal("plain"), "plain");
    }
}
