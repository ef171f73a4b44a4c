use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ─── Site & panels ───────────────────────────────────────────────────────────

/// A fixed geographic point the forecast is requested for.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Location {
    pub name: String,
    /// NED "point" identifier (0 = whole country, 1..=12 = provinces)
    pub point: u8,
    pub latitude: f64,
    pub longitude: f64,
}

/// Named NED points with a representative coordinate.
/// The index into this table is both the config code and the NED point id.
pub const KNOWN_LOCATIONS: [(&str, f64, f64); 13] = [
    ("Nederland", 52.13, 5.29),
    ("Groningen", 53.2, 6.6),
    ("Friesland", 53.0, 5.8),
    ("Drenthe", 53.0, 6.6),
    ("Overijssel", 52.5, 6.8),
    ("Flevoland", 52.6, 5.3),
    ("Gelderland", 52.0, 6.0),
    ("Utrecht", 52.1, 5.2),
    ("Noord-Holland", 52.5, 5.1),
    ("Zuid-Holland", 51.9, 4.5),
    ("Zeeland", 51.4, 3.9),
    ("Noord-Brabant", 51.5, 5.0),
    ("Limburg", 51.2, 5.7),
];

impl Location {
    /// The whole-country point, used when no valid location is configured.
    pub fn national() -> Self {
        let (name, latitude, longitude) = KNOWN_LOCATIONS[0];
        Location { name: name.to_string(), point: 0, latitude, longitude }
    }

    /// Looks up one of the predefined points by its numeric code.
    pub fn known(point: u8) -> Option<Self> {
        KNOWN_LOCATIONS
            .get(point as usize)
            .map(|(name, latitude, longitude)| Location {
                name: (*name).to_string(),
                point,
                latitude: *latitude,
                longitude: *longitude,
            })
    }
}

/// Orientation and size of the installed array.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct PanelConfig {
    /// Tilt to the earth surface: 0 (horizontal) … 90 (vertical)
    pub declination: f64,
    /// -180 … 180 (-90 = east, 0 = south, 90 = west, ±180 = north)
    pub azimuth: f64,
    pub peak_power_kw: f64,
}

// ─── Pipeline values ─────────────────────────────────────────────────────────

/// One forecast slot as delivered by the API. The timestamp is kept as the
/// raw text so that a malformed value only costs that single point.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUtilizationPoint {
    pub valid_from: String,
    pub capacity_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    pub altitude_deg: f64,
    /// Compass bearing, 0 = north, clockwise, in [0, 360)
    pub azimuth_deg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedEstimate {
    pub timestamp: DateTime<Utc>,
    pub watts: i64,
    pub kwh: f64,
}

impl CorrectedEstimate {
    /// Device value string: `watts;kWh;isoTimestamp`
    pub fn s_value(&self) -> String {
        format!("{};{:.3};{}", self.watts, self.kwh, self.timestamp.to_rfc3339())
    }
}

/// Expected energy for one whole local day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub kwh: f64,
}

impl DailyTotal {
    /// Day totals carry `-1` in the watts position.
    pub fn s_value(&self) -> String {
        format!("-1;{:.3};{}", self.kwh, self.date)
    }
}

// ─── NED wire types ──────────────────────────────────────────────────────────

/// One element of the `/v1/utilizations` collection. Every field is optional
/// on purpose: incomplete records are skipped, not fatal.
#[derive(Debug, Deserialize)]
pub struct UtilizationRecord {
    #[serde(default)]
    pub validfrom: Option<String>,
    #[serde(default)]
    pub capacity: Option<f64>,
}

/// The API answers with a bare array for `application/json` and with a
/// hydra collection for `application/ld+json`. Elements stay untyped here so
/// one malformed record cannot reject the whole collection.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UtilizationResponse {
    Plain(Vec<serde_json::Value>),
    Hydra {
        #[serde(rename = "hydra:member")]
        member: Vec<serde_json::Value>,
    },
}

impl UtilizationResponse {
    pub fn into_records(self) -> Vec<serde_json::Value> {
        match self {
            UtilizationResponse::Plain(records) => records,
            UtilizationResponse::Hydra { member } => member,
        }
    }
}
