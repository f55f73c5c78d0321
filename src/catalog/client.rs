//! Opaque catalog client seam.
//!
//! Authentication and session handling live entirely behind [`CatalogClient`];
//! the query engine only ever asks for "this URL with these parameters" and
//! gets JSON back. Tests substitute in-memory clients at the same seam.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// Minimal surface the query engine needs from the remote catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Perform one request against `url` and return the parsed JSON body.
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value>;
}

/// Reqwest-backed client for ArcGIS-style REST endpoints.
///
/// Every request carries `f=json`, the configured Referer header and, when an
/// API key is configured, a `token` parameter. No retries: a transport failure
/// aborts the call and surfaces to the caller unchanged.
pub struct RestClient {
    client: reqwest::Client,
    referer: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            client,
            referer: config.referer.clone(),
            token: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CatalogClient for RestClient {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
        let mut form: Vec<(String, String)> = vec![("f".to_string(), "json".to_string())];
        form.extend(params.iter().cloned());
        if let Some(token) = &self.token {
            if !params.iter().any(|(k, _)| k == "token") {
                form.push(("token".to_string(), token.clone()));
            }
        }

        tracing::debug!("catalog request: {} ({} params)", url, form.len());

        let response = self
            .client
            .post(url)
            .header(reqwest::header::REFERER, &self.referer)
            .form(&form)
            .send()
            .await?;

        let payload: Value = response.json().await?;
        Ok(payload)
    }
}

/// Convert the catalog's JSON-embedded error payload into [`Error::Remote`].
///
/// ArcGIS reports failures inside a 200 response as
/// `{"error": {"message": ..., "details": [...]}}`.
pub fn check_remote_error(payload: Value) -> Result<Value> {
    let Some(error) = payload.get("error") else {
        return Ok(payload);
    };

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unspecified catalog error")
        .to_string();
    let details = error
        .get("details")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Err(Error::Remote { message, details })
}
