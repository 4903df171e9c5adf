//! Search-radius inference for a city.
//!
//! The resolver walks an ordered chain: raw-name lookup, normalized-name
//! lookup, NYC borough alias, then the circle-equivalent of the land
//! area. Cities with no area anywhere get the configured default. A
//! separate population-density estimator covers runs with no area cache
//! at all.

use std::f64::consts::PI;
use tracing::{info, warn};

use crate::sources::AreaSource;
use crate::storage::ResultStore;
use crate::types::{AreaKey, AreaLookup, City};
use crate::util::normalize_place_name;

const NYC_BOROUGHS: &[&str] = &["brooklyn", "queens", "manhattan", "bronx", "staten island"];

#[derive(Debug, Clone)]
pub struct RadiusConfig {
    /// Returned unclamped when no area is found.
    pub default_radius: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    /// Map NYC borough names to the New York City area entry.
    pub map_boroughs: bool,
}

pub struct RadiusResolver {
    areas: AreaLookup,
    config: RadiusConfig,
}

impl RadiusResolver {
    pub fn new(areas: AreaLookup, config: RadiusConfig) -> Self {
        Self { areas, config }
    }

    pub fn has_areas(&self) -> bool {
        !self.areas.is_empty()
    }

    /// Radius in miles for `city`, always within `[min, max]` when an
    /// area entry exists, exactly the default when none does.
    pub fn resolve(&self, city: &City) -> f64 {
        match self.lookup_area(city) {
            Some(area_sqmi) if area_sqmi > 0.0 => {
                let radius = (area_sqmi / PI).sqrt();
                round_radius_miles(radius.clamp(self.config.min_radius, self.config.max_radius))
            }
            _ => self.config.default_radius,
        }
    }

    fn lookup_area(&self, city: &City) -> Option<f64> {
        self.candidate_keys(city)
            .into_iter()
            .find_map(|key| self.areas.get(&key).copied())
    }

    /// First match wins: raw name, normalized name, then (for NY
    /// boroughs, when enabled) the city-wide aliases.
    fn candidate_keys(&self, city: &City) -> Vec<AreaKey> {
        let state = city.state_code.to_uppercase();
        let normalized = normalize_place_name(&city.name);
        let mut keys = vec![
            (city.name.to_lowercase(), state.clone()),
            (normalized.clone(), state.clone()),
        ];
        if self.config.map_boroughs && state == "NY" && NYC_BOROUGHS.contains(&normalized.as_str())
        {
            keys.push(("new york city".to_string(), "NY".to_string()));
            keys.push(("new york".to_string(), "NY".to_string()));
        }
        keys
    }
}

/// Round-half-up to the nearest whole mile.
pub fn round_radius_miles(radius: f64) -> f64 {
    radius.round()
}

/// Coarse fallback for runs with no area cache: assume a uniform
/// population density and take the circle-equivalent radius.
pub fn estimate_radius_from_population(
    population: i64,
    density_per_sq_mile: f64,
    min_radius: f64,
    max_radius: f64,
) -> f64 {
    if population <= 0 || density_per_sq_mile <= 0.0 {
        return min_radius;
    }
    let area = population as f64 / density_per_sq_mile;
    (area / PI).sqrt().clamp(min_radius, max_radius)
}

/// Build the area lookup, preferring the persisted store; if the store
/// is empty and bulk-loading is allowed, parse the reference source once
/// and cache it back (both key forms per place). Any failure degrades to
/// an empty lookup so the run can continue on the fallback radius.
pub async fn build_area_lookup(
    store: &dyn ResultStore,
    gazetteer: Option<&dyn AreaSource>,
    load_gazetteer_to_store: bool,
) -> AreaLookup {
    let areas = match store.load_areas().await {
        Ok(areas) => areas,
        Err(error) => {
            warn!(%error, "Failed to load areas from the store; continuing without");
            return AreaLookup::new();
        }
    };
    if !areas.is_empty() {
        info!(entries = areas.len(), "Loaded city areas from the store");
        return areas;
    }

    let Some(source) = gazetteer.filter(|_| load_gazetteer_to_store) else {
        return areas;
    };

    match source.load_areas() {
        Ok(parsed) if !parsed.is_empty() => {
            match store.upsert_areas(&parsed).await {
                Ok(saved) => info!(saved, "Cached gazetteer areas into the store"),
                Err(error) => warn!(%error, "Failed to cache gazetteer areas"),
            }
            parsed
        }
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(%error, "Failed to load gazetteer areas; continuing without");
            AreaLookup::new()
        }
    }
}
