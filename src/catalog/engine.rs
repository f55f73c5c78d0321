//! Paginated feature-query engine.
//!
//! One logical query = as many catalog pages as it takes, accumulated into a
//! single [`QueryResult`]. Any transport or remote-side error aborts the whole
//! call; no partial result is ever returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::{CatalogClient, check_remote_error};
use super::geometry::Envelope;
use crate::config::FieldMap;
use crate::error::{Error, Result};

/// Page-size cap advertised by most hosted feature services.
const DEFAULT_MAX_RECORD_COUNT: usize = 1000;

/// One record returned by the catalog: attribute map plus optional geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

/// Identity tuple deciding when two features are the same entity.
///
/// Values are coerced to their string form so that numeric and string ids
/// hash consistently; absent or null fields stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey(Option<String>, Option<String>, Option<String>);

impl RawFeature {
    /// Read an attribute as a display string ("" for absent or null).
    pub fn attr_str(&self, name: &str) -> String {
        match self.attributes.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn key(&self, fields: &FieldMap) -> FeatureKey {
        FeatureKey(
            key_part(self.attributes.get(&fields.schedule)),
            key_part(self.attributes.get(&fields.parcel)),
            key_part(self.attributes.get(&fields.object_id)),
        )
    }
}

fn key_part(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Accumulated pages of one logical query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Non-feature response metadata from the first page (spatial reference,
    /// field definitions, ...), carried through unchanged.
    pub template: Map<String, Value>,
    pub features: Vec<RawFeature>,
    /// True iff the result is a known-incomplete view of the matching records.
    pub truncated: bool,
    pub fetched_at: DateTime<Utc>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            template: Map::new(),
            features: Vec::new(),
            truncated: false,
            fetched_at: Utc::now(),
        }
    }

    /// Reassemble the full response payload for raw JSON output.
    pub fn to_value(&self) -> Value {
        let mut payload = self.template.clone();
        payload.insert(
            "features".to_string(),
            serde_json::to_value(&self.features).unwrap_or(Value::Array(Vec::new())),
        );
        payload.insert("exceededTransferLimit".to_string(), Value::Bool(self.truncated));
        Value::Object(payload)
    }
}

/// Queryable feature layer endpoint.
#[derive(Debug, Clone)]
pub struct Layer {
    pub url: String,
    /// Largest page the service will return per request.
    pub max_record_count: usize,
}

impl Layer {
    /// Fetch the layer's service metadata and capture its page-size cap.
    pub async fn connect<C: CatalogClient>(client: &C, url: &str) -> Result<Self> {
        let payload = check_remote_error(client.get(url, &[]).await?)?;
        let max_record_count = payload
            .get("maxRecordCount")
            .and_then(Value::as_u64)
            .filter(|&n| n > 0)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RECORD_COUNT);

        tracing::debug!("connected to layer {} (page cap {})", url, max_record_count);

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            max_record_count,
        })
    }

    /// Build a layer without a metadata round-trip.
    pub fn with_page_size(url: &str, max_record_count: usize) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            max_record_count,
        }
    }
}

/// Request one page of results at the given offset.
async fn query_page<C: CatalogClient>(
    client: &C,
    layer: &Layer,
    envelope: Option<&Envelope>,
    where_clause: &str,
    out_fields: &str,
    return_geometry: bool,
    offset: usize,
    page_size: usize,
) -> Result<Map<String, Value>> {
    let mut params: Vec<(String, String)> = vec![
        ("where".to_string(), where_clause.to_string()),
        ("outFields".to_string(), out_fields.to_string()),
        (
            "returnGeometry".to_string(),
            Value::Bool(return_geometry).to_string(),
        ),
        ("outSR".to_string(), "4326".to_string()),
        ("resultOffset".to_string(), offset.to_string()),
        ("resultRecordCount".to_string(), page_size.to_string()),
    ];
    if let Some(envelope) = envelope {
        params.extend(envelope.intersects_params());
    }

    let url = format!("{}/query", layer.url);
    let payload = check_remote_error(client.get(&url, &params).await?)?;

    match payload {
        Value::Object(map) => Ok(map),
        other => Err(Error::data_shape(format!(
            "query page was not a JSON object: {other}"
        ))),
    }
}

/// Query the layer and page through the full response.
///
/// The page size is the layer's cap, clipped to `max_records` when a cap is
/// given. Pagination stops when the cap is reached (result clipped to exactly
/// `max_records`, truncated iff the last page was full) or when a page comes
/// back short or empty (truncated taken from the server's own flag).
pub async fn query_all<C: CatalogClient>(
    client: &C,
    layer: &Layer,
    envelope: Option<&Envelope>,
    where_clause: &str,
    out_fields: &str,
    return_geometry: bool,
    max_records: Option<usize>,
) -> Result<QueryResult> {
    if max_records == Some(0) {
        return Err(Error::validation("max_records must be positive when set"));
    }

    let page_size = match max_records {
        Some(cap) => layer.max_record_count.min(cap),
        None => layer.max_record_count,
    };

    let mut offset = 0usize;
    let mut collected: Vec<RawFeature> = Vec::new();
    let mut template: Option<Map<String, Value>> = None;
    let truncated;

    loop {
        let page = query_page(
            client,
            layer,
            envelope,
            where_clause,
            out_fields,
            return_geometry,
            offset,
            page_size,
        )
        .await?;

        let server_flag = page
            .get("exceededTransferLimit")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let features: Vec<RawFeature> = match page.get("features") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::data_shape(format!("malformed features array: {e}")))?,
            None => Vec::new(),
        };

        if template.is_none() {
            let mut head = page;
            head.remove("features");
            template = Some(head);
        }

        let page_len = features.len();
        tracing::debug!(
            "page at offset {}: {} features (cap {})",
            offset,
            page_len,
            page_size
        );
        collected.extend(features);

        if let Some(cap) = max_records {
            if collected.len() >= cap {
                collected.truncate(cap);
                truncated = page_len == page_size;
                break;
            }
        }

        if page_len == 0 || page_len < page_size {
            truncated = server_flag;
            break;
        }

        offset += page_size;
    }

    Ok(QueryResult {
        template: template.unwrap_or_default(),
        features: collected,
        truncated,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// In-memory catalog serving a fixed feature list one page at a time.
    pub(crate) struct PagedCatalog {
        pub features: Vec<Value>,
        pub offsets_seen: Mutex<Vec<usize>>,
    }

    impl PagedCatalog {
        pub fn new(features: Vec<Value>) -> Self {
            Self {
                features,
                offsets_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for PagedCatalog {
        async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
            assert!(url.ends_with("/query"), "unexpected url: {url}");
            let lookup = |name: &str| {
                params
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
            };
            let offset: usize = lookup("resultOffset").unwrap().parse().unwrap();
            let count: usize = lookup("resultRecordCount").unwrap().parse().unwrap();
            self.offsets_seen.lock().unwrap().push(offset);

            let end = (offset + count).min(self.features.len());
            let page: Vec<Value> = self.features[offset.min(end)..end].to_vec();
            let exceeded = end < self.features.len();
            Ok(json!({
                "spatialReference": {"wkid": 4326},
                "features": page,
                "exceededTransferLimit": exceeded,
            }))
        }
    }

    pub(crate) fn make_feature(id: u64) -> Value {
        json!({
            "attributes": {
                "OBJECTID": id,
                "PropertyScheduleText": format!("S{id:05}"),
                "HC_RegistrationsOriginalCleaned": format!("P{id:05}"),
                "SubdivisionName": "TEST CONDOS",
            }
        })
    }

    fn features(n: u64) -> Vec<Value> {
        (1..=n).map(make_feature).collect()
    }

    #[tokio::test]
    async fn test_pagination_collects_all_pages() {
        // Two full pages of 5 plus a short page of 3.
        let catalog = PagedCatalog::new(features(13));
        let layer = Layer::with_page_size("https://example.test/0", 5);

        let result = query_all(&catalog, &layer, None, "1=1", "*", false, None)
            .await
            .unwrap();

        assert_eq!(result.features.len(), 13);
        assert!(!result.truncated);
        assert_eq!(*catalog.offsets_seen.lock().unwrap(), vec![0, 5, 10]);
        assert_eq!(
            result.template.get("spatialReference"),
            Some(&json!({"wkid": 4326}))
        );
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_on_empty_page() {
        let catalog = PagedCatalog::new(features(10));
        let layer = Layer::with_page_size("https://example.test/0", 5);

        let result = query_all(&catalog, &layer, None, "1=1", "*", false, None)
            .await
            .unwrap();

        assert_eq!(result.features.len(), 10);
        assert!(!result.truncated);
        assert_eq!(*catalog.offsets_seen.lock().unwrap(), vec![0, 5, 10]);
    }

    #[tokio::test]
    async fn test_record_cap_truncates_and_flags() {
        let catalog = PagedCatalog::new(features(20));
        let layer = Layer::with_page_size("https://example.test/0", 5);

        let result = query_all(&catalog, &layer, None, "1=1", "*", false, Some(7))
            .await
            .unwrap();

        assert_eq!(result.features.len(), 7);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_cap_larger_than_total_is_not_truncated() {
        let catalog = PagedCatalog::new(features(4));
        let layer = Layer::with_page_size("https://example.test/0", 10);

        let result = query_all(&catalog, &layer, None, "1=1", "*", false, Some(50))
            .await
            .unwrap();

        assert_eq!(result.features.len(), 4);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_remote_error_aborts_without_partial_result() {
        struct FailingCatalog;

        #[async_trait]
        impl CatalogClient for FailingCatalog {
            async fn get(&self, _url: &str, _params: &[(String, String)]) -> Result<Value> {
                Ok(json!({
                    "error": {"message": "Token required.", "details": []}
                }))
            }
        }

        let layer = Layer::with_page_size("https://example.test/0", 5);
        let err = query_all(&FailingCatalog, &layer, None, "1=1", "*", false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[test]
    fn test_feature_key_equality_across_value_types() {
        let fields = FieldMap::default();
        let a: RawFeature = serde_json::from_value(make_feature(7)).unwrap();
        let b: RawFeature = serde_json::from_value(make_feature(7)).unwrap();
        let c: RawFeature = serde_json::from_value(make_feature(8)).unwrap();
        assert_eq!(a.key(&fields), b.key(&fields));
        assert_ne!(a.key(&fields), c.key(&fields));
    }
}
