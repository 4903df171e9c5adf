use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Reference record for one US city, loaded from the external catalog.
///
/// Identity is `(name, state_code)` — city names repeat across states,
/// so downstream keys always pair the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    /// Uppercase 2-letter USPS code.
    pub state_code: String,
    pub state_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: i64,
}

/// Key into the area lookup: (lowercase place name, uppercase 2-letter state).
pub type AreaKey = (String, String);

/// City/state -> land area in square miles.
///
/// Holds two keys per physical place: the raw lowercase name and the
/// suffix-normalized name, so lookups succeed either way.
pub type AreaLookup = HashMap<AreaKey, f64>;

/// Count outcome for a single query in query-list mode.
#[derive(Debug, Clone)]
pub struct CountResult {
    pub query: String,
    /// Defaults to 0 when `error` is set.
    pub total: i64,
    /// Unparsed external response, kept for diagnostics.
    pub raw: Option<Value>,
    pub error: Option<String>,
}

/// Count outcome for a single city in city-sweep mode.
#[derive(Debug, Clone)]
pub struct CityCountResult {
    pub city: City,
    pub total: i64,
    pub raw: Option<Value>,
    pub error: Option<String>,
    pub radius_miles: f64,
}

/// One member of a multi-location cluster count.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterMember {
    pub city: String,
    pub state: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_miles: Option<f64>,
}
