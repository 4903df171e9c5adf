//! Seams for the external reference data this crate consumes but does
//! not own: the city/state catalog and the land-area ("gazetteer")
//! reference file. Concrete loaders live with the callers.

use anyhow::Result;

use crate::types::{AreaLookup, City};

/// Read-only catalog of US cities.
///
/// Implementations return cities sorted by population descending, with
/// clean 2-letter state codes only, filtered to `min_population` and
/// truncated to `limit` when given.
pub trait CitySource: Send + Sync {
    fn cities(&self, min_population: i64, limit: Option<usize>) -> Result<Vec<City>>;
}

/// Source of (city, state) -> land-area mappings, e.g. a parsed Census
/// Gazetteer places file. Expected to emit both the raw lowercase and
/// the suffix-normalized key per place.
pub trait AreaSource: Send + Sync {
    fn load_areas(&self) -> Result<AreaLookup>;
}
