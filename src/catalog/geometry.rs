//! Search regions and spatial filters.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// One circular search region supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
}

/// WGS84 axis-aligned bounding box used as a spatial query filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Region {
    pub fn new(lat: f64, lng: f64, radius_m: f64) -> Self {
        Self { lat, lng, radius_m }
    }

    /// Build the envelope that bounds this region.
    ///
    /// Longitude degrees shrink with latitude; a zero scale (the poles, or a
    /// non-finite input) cannot be inverted and is rejected.
    pub fn envelope(&self) -> Result<Envelope> {
        if !self.lat.is_finite() || !self.lng.is_finite() || !self.radius_m.is_finite() {
            return Err(Error::validation("region coordinates must be numeric"));
        }

        let meters_per_degree_lng = METERS_PER_DEGREE_LAT * self.lat.to_radians().cos();
        if meters_per_degree_lng == 0.0 {
            return Err(Error::validation(
                "unable to compute longitude delta for the provided latitude",
            ));
        }

        let delta_lat = self.radius_m / METERS_PER_DEGREE_LAT;
        let delta_lng = self.radius_m / meters_per_degree_lng;

        Ok(Envelope {
            xmin: self.lng - delta_lng,
            xmax: self.lng + delta_lng,
            ymin: self.lat - delta_lat,
            ymax: self.lat + delta_lat,
        })
    }
}

impl Envelope {
    /// Wire parameters for an envelope-intersects spatial filter.
    pub fn intersects_params(&self) -> Vec<(String, String)> {
        let geometry = json!({
            "xmin": self.xmin,
            "xmax": self.xmax,
            "ymin": self.ymin,
            "ymax": self.ymax,
            "spatialReference": {"wkid": 4326},
        });

        vec![
            ("geometry".to_string(), geometry.to_string()),
            ("geometryType".to_string(), "esriGeometryEnvelope".to_string()),
            ("spatialRel".to_string(), "esriSpatialRelIntersects".to_string()),
        ]
    }
}
