//! Runtime configuration.
//!
//! The original deployment leaned on ambient environment variables for the
//! jurisdiction defaults; here they live in one explicit configuration object
//! that callers construct up front (or load from a TOML file).

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Connection settings for the remote feature catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Portal the opaque client authenticates against.
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Feature layer endpoint that is queried for parcel records.
    #[serde(default = "default_layer_url")]
    pub layer_url: String,

    /// Referer header expected by the catalog for cross-domain requests.
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Optional API key forwarded as the request token.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub field_map: FieldMap,

    #[serde(default)]
    pub sheets: SheetIdentifiers,
}

/// Attribute names the pipeline reads from catalog features.
///
/// The defaults match the Summit County, CO short-term rental layer; other
/// jurisdictions override the names that differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default = "default_schedule_field")]
    pub schedule: String,
    #[serde(default = "default_parcel_field")]
    pub parcel: String,
    #[serde(default = "default_object_id_field")]
    pub object_id: String,
    #[serde(default = "default_subdivision_field")]
    pub subdivision: String,
    #[serde(default = "default_owner_html_field")]
    pub owner_html: String,
    #[serde(default = "default_owner_fallback_field")]
    pub owner_fallback: String,
    #[serde(default = "default_mailing_field")]
    pub mailing: String,
    #[serde(default = "default_situs_field")]
    pub situs: String,
    #[serde(default = "default_description_field")]
    pub description: String,
    /// Public detail-page URL with an `{id}` placeholder for the parcel id.
    #[serde(default = "default_detail_url_template")]
    pub detail_url_template: String,
}

/// Spreadsheet identity used when building cross-sheet hyperlink formulas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetIdentifiers {
    /// Hosted spreadsheet document id (empty disables hyperlink URLs).
    #[serde(default = "default_sheets_doc_id")]
    pub doc_id: String,
    /// Sheet identifier of the per-property ("By Complex") tab.
    #[serde(default = "default_complex_gid")]
    pub complex_gid: String,
    /// Sheet identifier of the owner-detail ("By Owner") tab.
    #[serde(default = "default_owner_gid")]
    pub owner_gid: String,
}

fn default_portal_url() -> String {
    "https://summitcountyco.maps.arcgis.com".to_string()
}

fn default_layer_url() -> String {
    "https://services6.arcgis.com/dmNYNuTJZDtkcRJq/arcgis/rest/services/\
     STR_Licenses_October_2025_public_view_layer/FeatureServer/0"
        .to_string()
}

fn default_referer() -> String {
    "https://experience.arcgis.com/experience/706a6886322445479abadb904db00bc0/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_schedule_field() -> String {
    "PropertyScheduleText".to_string()
}

fn default_parcel_field() -> String {
    "HC_RegistrationsOriginalCleaned".to_string()
}

fn default_object_id_field() -> String {
    "OBJECTID".to_string()
}

fn default_subdivision_field() -> String {
    "SubdivisionName".to_string()
}

fn default_owner_html_field() -> String {
    "OwnerNamesPublicHTML".to_string()
}

fn default_owner_fallback_field() -> String {
    "OwnerFullName".to_string()
}

fn default_mailing_field() -> String {
    "OwnerContactPublicMailingAddr".to_string()
}

fn default_situs_field() -> String {
    "SitusAddress".to_string()
}

fn default_description_field() -> String {
    "BriefPropertyDescription".to_string()
}

fn default_detail_url_template() -> String {
    "https://gis.summitcountyco.gov/map/DetailData.aspx?Schno={id}".to_string()
}

fn default_sheets_doc_id() -> String {
    "1kKuIBG3BQTKu3uiH3lcOg9o-fUJ79440FldeFO5gho0".to_string()
}

fn default_complex_gid() -> String {
    "2088119676".to_string()
}

fn default_owner_gid() -> String {
    "521649832".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            portal_url: default_portal_url(),
            layer_url: default_layer_url(),
            referer: default_referer(),
            api_key: None,
            log_level: default_log_level(),
            field_map: FieldMap::default(),
            sheets: SheetIdentifiers::default(),
        }
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            schedule: default_schedule_field(),
            parcel: default_parcel_field(),
            object_id: default_object_id_field(),
            subdivision: default_subdivision_field(),
            owner_html: default_owner_html_field(),
            owner_fallback: default_owner_fallback_field(),
            mailing: default_mailing_field(),
            situs: default_situs_field(),
            description: default_description_field(),
            detail_url_template: default_detail_url_template(),
        }
    }
}

impl Default for SheetIdentifiers {
    fn default() -> Self {
        Self {
            doc_id: default_sheets_doc_id(),
            complex_gid: default_complex_gid(),
            owner_gid: default_owner_gid(),
        }
    }
}

impl CatalogConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CatalogConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

impl SheetIdentifiers {
    /// True when all three identifiers are present, i.e. hyperlink formulas
    /// can actually target a cell.
    pub fn is_complete(&self) -> bool {
        !self.doc_id.trim().is_empty()
            && !self.complex_gid.trim().is_empty()
            && !self.owner_gid.trim().is_empty()
    }
}

impl FieldMap {
    pub fn detail_url(&self, id: &str) -> String {
        if id.is_empty() {
            String::new()
        } else {
            self.detail_url_template.replace("{id}", id)
        }
    }
}
