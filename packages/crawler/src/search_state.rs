//! Typed model of the external service's `searchState` request object.
//!
//! Every payload variant (country-wide default, per-city, multi-location
//! cluster) and the deep links reconstructed for the heatmap go through
//! the same structs and the same location builder. That is what keeps a
//! link generated from a stored row byte-compatible with the payload
//! that produced the row.

use anyhow::{anyhow, Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{City, ClusterMember};

/// Date window the external site applies by default.
pub const DEFAULT_DATE_WINDOW_DAYS: u32 = 61;

const DEFAULT_WORKPLACE_TYPES: &[&str] = &["Remote", "Hybrid", "Onsite"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub location: GeometryPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    pub types: Vec<String>,
}

/// Radius options for a concrete place, or flexible-region options for
/// the country-wide default. The external schema keys are snake_case.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flexible_regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_miles: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_radius: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub formatted_address: String,
    pub types: Vec<String>,
    pub geometry: Geometry,
    pub id: String,
    pub address_components: Vec<AddressComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<i64>,
    pub options: LocationOptions,
}

/// The request object sent as `{"searchState": ...}`. Top-level keys are
/// camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub locations: Vec<Location>,
    pub workplace_types: Vec<String>,
    pub default_to_user_location: bool,
    pub search_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority_level: Option<Vec<String>>,
    pub date_fetched_past_n_days: u32,
    pub sort_by: String,
}

/// Internal seniority key mapped to the external vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeniorityLevel {
    Entry,
    Mid,
    Senior,
    /// No filter sent.
    All,
}

impl SeniorityLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "entry" => Some(Self::Entry),
            "mid" => Some(Self::Mid),
            "senior" => Some(Self::Senior),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Mid => "mid",
            Self::Senior => "senior",
            Self::All => "all",
        }
    }

    /// Terms understood by the external service's seniority filter.
    pub fn external_terms(self) -> &'static [&'static str] {
        match self {
            Self::Entry => &["No Prior Experience Required", "Entry Level"],
            Self::Mid => &["Associate", "Mid-Senior Level"],
            Self::Senior => &["Senior Level", "Director"],
            Self::All => &[],
        }
    }
}

/// External vocabulary for a stored seniority key. `all`/absent means no
/// filter; an unrecognized key is passed through verbatim so links for
/// rows written by older runs still carry their filter.
pub fn seniority_terms(level: &str) -> Option<Vec<String>> {
    match SeniorityLevel::parse(level) {
        Some(SeniorityLevel::All) => None,
        Some(known) => Some(
            known
                .external_terms()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        None => Some(vec![level.to_string()]),
    }
}

impl SearchState {
    /// Minimal country-wide default used for count queries.
    pub fn default_us() -> Self {
        Self {
            locations: vec![Location::united_states()],
            workplace_types: DEFAULT_WORKPLACE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_to_user_location: false,
            search_query: String::new(),
            job_title_query: None,
            seniority_level: None,
            date_fetched_past_n_days: DEFAULT_DATE_WINDOW_DAYS,
            sort_by: "default".to_string(),
        }
    }

    pub fn with_query(&self, query: &str) -> Self {
        let mut state = self.clone();
        state.search_query = query.to_string();
        state
    }

    pub fn with_locations(&self, locations: Vec<Location>) -> Self {
        let mut state = self.clone();
        state.locations = locations;
        state
    }

    pub fn with_job_title(&self, title: &str) -> Self {
        let mut state = self.clone();
        state.job_title_query = Some(title.to_string());
        state
    }

    /// `All` clears the filter.
    pub fn with_seniority(&self, level: SeniorityLevel) -> Self {
        let mut state = self.clone();
        state.seniority_level = match level {
            SeniorityLevel::All => None,
            known => Some(
                known
                    .external_terms()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        };
        state
    }
}

/// Deterministic id fragment: lowercased, non-alphanumeric runs collapsed
/// to single underscores, surrounding underscores trimmed.
pub fn city_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }
    slug
}

impl Location {
    /// The country-wide location the default state carries.
    pub fn united_states() -> Self {
        Self {
            formatted_address: "United States".to_string(),
            types: vec!["country".to_string()],
            geometry: Geometry {
                location: GeometryPoint {
                    lat: 39.8283,
                    lon: -98.5795,
                },
            },
            id: "user_country".to_string(),
            address_components: vec![AddressComponent {
                long_name: "United States".to_string(),
                short_name: "US".to_string(),
                types: vec!["country".to_string()],
            }],
            population: None,
            options: LocationOptions {
                flexible_regions: Some(vec![
                    "anywhere_in_continent".to_string(),
                    "anywhere_in_world".to_string(),
                ]),
                ..Default::default()
            },
        }
    }

    /// One builder for every concrete place the engine mentions: fetch
    /// payloads, cluster members, and reconstructed deep links.
    pub fn for_place(
        name: &str,
        state_code: &str,
        state_long_name: &str,
        lat: f64,
        lon: f64,
        population: Option<i64>,
        radius_miles: f64,
    ) -> Self {
        Self {
            formatted_address: format!("{name}, {state_code}, United States"),
            types: vec!["locality".to_string(), "political".to_string()],
            geometry: Geometry {
                location: GeometryPoint { lat, lon },
            },
            id: format!(
                "city_{}_{}",
                city_slug(name),
                state_code.to_lowercase()
            ),
            address_components: vec![
                AddressComponent {
                    long_name: name.to_string(),
                    short_name: name.to_string(),
                    types: vec!["locality".to_string(), "political".to_string()],
                },
                AddressComponent {
                    long_name: state_long_name.to_string(),
                    short_name: state_code.to_string(),
                    types: vec![
                        "administrative_area_level_1".to_string(),
                        "political".to_string(),
                    ],
                },
                AddressComponent {
                    long_name: "United States".to_string(),
                    short_name: "US".to_string(),
                    types: vec!["country".to_string(), "political".to_string()],
                },
            ],
            population: population.filter(|p| *p > 0),
            options: LocationOptions {
                flexible_regions: None,
                radius_miles: Some(radius_miles),
                radius: Some(radius_miles),
                ignore_radius: Some(false),
            },
        }
    }

    pub fn for_city(city: &City, radius_miles: f64) -> Self {
        Self::for_place(
            &city.name,
            &city.state_code,
            &city.state_name,
            city.latitude,
            city.longitude,
            Some(city.population),
            radius_miles,
        )
    }

    /// Cluster members carry no state name; the 2-letter code stands in.
    pub fn for_cluster_member(member: &ClusterMember, default_radius: f64) -> Self {
        Self::for_place(
            &member.city,
            &member.state,
            &member.state,
            member.lat,
            member.lon,
            None,
            member.radius_miles.unwrap_or(default_radius),
        )
    }
}

/// Search state scoped to one city and radius, optionally overriding the
/// query text.
pub fn search_state_for_city(
    base: &SearchState,
    city: &City,
    radius_miles: f64,
    query: Option<&str>,
) -> SearchState {
    let mut state = base.with_locations(vec![Location::for_city(city, radius_miles)]);
    if let Some(q) = query {
        state.search_query = q.to_string();
    }
    state
}

/// Combined search state across several places, for one cluster count.
pub fn search_state_for_cluster(
    base: &SearchState,
    members: &[ClusterMember],
    query: &str,
    default_radius: f64,
) -> SearchState {
    let locations = members
        .iter()
        .map(|m| Location::for_cluster_member(m, default_radius))
        .collect();
    base.with_locations(locations).with_query(query)
}

/// Shallow top-level merge: every key present in `overrides` replaces the
/// corresponding key in `base`; keys not mentioned are inherited. Callers
/// wanting to change one field inside `locations` must supply the whole
/// replacement list. Keys outside the typed schema are dropped when the
/// merged value is re-typed.
pub fn merge_overrides(base: &SearchState, overrides: &Value) -> Result<SearchState> {
    let mut merged = serde_json::to_value(base).context("failed to serialize base state")?;
    let base_map = merged
        .as_object_mut()
        .ok_or_else(|| anyhow!("base state did not serialize to an object"))?;
    let override_map = overrides
        .as_object()
        .ok_or_else(|| anyhow!("overrides must be a JSON object"))?;
    for (key, value) in override_map {
        base_map.insert(key.clone(), value.clone());
    }
    serde_json::from_value(merged).context("merged searchState does not match the schema")
}

/// Percent-encoding matching what the external site accepts in its
/// `searchState` param: unreserved characters and `/` stay literal.
const SEARCH_STATE_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Deep link reproducing `state` when opened on the external site.
pub fn deep_link_url(site_base: &str, state: &SearchState) -> Result<String> {
    let json = serde_json::to_string(state).context("failed to serialize search state")?;
    let encoded = utf8_percent_encode(&json, SEARCH_STATE_ENCODE);
    Ok(format!(
        "{}/?searchState={}",
        site_base.trim_end_matches('/'),
        encoded
    ))
}
