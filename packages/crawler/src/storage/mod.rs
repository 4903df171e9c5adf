//! Persistence for per-city-per-query-per-day counts and the area
//! cache, plus the heatmap read path.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub mod postgres;
pub use postgres::PostgresResultStore;

use crate::search_state::{seniority_terms, Location, SearchState};
use crate::types::{AreaLookup, CityCountResult};

/// Run-wide fields written alongside every city result in a batch.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub query: String,
    pub job_title_query: Option<String>,
    pub role: Option<String>,
    /// Internal seniority key (`entry`/`mid`/`senior`), not the external
    /// vocabulary.
    pub seniority_level: Option<String>,
    /// Used when a result carries no per-city radius.
    pub default_radius_miles: f64,
    pub run_date: NaiveDate,
}

/// Filters for the heatmap read path. Empty filters match everything.
#[derive(Debug, Clone)]
pub struct HeatmapFilter {
    pub query: Option<String>,
    pub roles: Option<Vec<String>>,
    pub seniority_levels: Option<Vec<String>>,
    pub min_total: i64,
    pub limit: i64,
}

impl Default for HeatmapFilter {
    fn default() -> Self {
        Self {
            query: None,
            roles: None,
            seniority_levels: None,
            min_total: 0,
            limit: 1000,
        }
    }
}

/// One heatmap point: the latest result for a distinct
/// (city, state, query, seniority) group, plus a deep link that
/// reproduces the original search on the external site.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapPoint {
    pub city: String,
    pub state: String,
    pub state_name: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_miles: f64,
    pub total: i64,
    pub query: Option<String>,
    pub job_title_query: Option<String>,
    pub role: Option<String>,
    pub seniority_level: Option<String>,
    pub run_at: DateTime<Utc>,
    pub hiring_cafe_url: String,
}

/// Idempotent store for count results and the area cache.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create tables and indexes when the store is configured to manage
    /// its own schema; otherwise a no-op.
    async fn ensure_schema(&self) -> Result<()>;

    /// Load the area cache, double-keyed (raw + normalized name).
    async fn load_areas(&self) -> Result<AreaLookup>;

    /// Overwrite-or-insert area entries; returns how many were written.
    async fn upsert_areas(&self, areas: &AreaLookup) -> Result<usize>;

    /// Upsert one row per result under the natural key
    /// (city, state_code, query, seniority_level, run_date), all in one
    /// transaction. Re-running the same day updates in place.
    async fn save_city_results(
        &self,
        results: &[CityCountResult],
        ctx: &RunContext,
    ) -> Result<()>;

    /// Latest result per distinct (city, state, query, seniority) group,
    /// newest `run_at` wins, with optional filters and a row cap.
    async fn heatmap_points(&self, filter: &HeatmapFilter) -> Result<Vec<HeatmapPoint>>;
}

/// Rebuild the search state a stored row was fetched with. Must go
/// through the same builder as the fetch path so reconstructed links
/// stay byte-compatible with the original request.
#[allow(clippy::too_many_arguments)]
pub fn heatmap_search_state(
    city: &str,
    state_code: &str,
    state_name: &str,
    lat: f64,
    lon: f64,
    radius_miles: f64,
    query: Option<&str>,
    job_title_query: Option<&str>,
    seniority_level: Option<&str>,
) -> SearchState {
    let mut state = SearchState::default_us().with_locations(vec![Location::for_place(
        city,
        state_code,
        state_name,
        lat,
        lon,
        None,
        radius_miles,
    )]);
    state.search_query = query.unwrap_or_default().to_string();
    if let Some(title) = job_title_query {
        state.job_title_query = Some(title.to_string());
    }
    if let Some(level) = seniority_level {
        state.seniority_level = seniority_terms(level);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_state::deep_link_url;
    use crate::util::parse_search_state_from_url;

    #[test]
    fn reconstructed_link_round_trips_row_fields() {
        let state = heatmap_search_state(
            "Austin",
            "TX",
            "Texas",
            30.2672,
            -97.7431,
            10.0,
            Some("frontend developer"),
            None,
            Some("entry"),
        );
        let url = deep_link_url("https://hiring.cafe", &state).unwrap();
        let decoded: SearchState =
            serde_json::from_value(parse_search_state_from_url(&url).unwrap()).unwrap();

        assert_eq!(decoded.locations[0].geometry.location.lat, 30.2672);
        assert_eq!(decoded.locations[0].geometry.location.lon, -97.7431);
        assert_eq!(decoded.search_query, "frontend developer");
        assert_eq!(decoded.job_title_query, None);
        assert_eq!(
            decoded.seniority_level,
            Some(vec![
                "No Prior Experience Required".to_string(),
                "Entry Level".to_string()
            ])
        );
        assert_eq!(decoded.locations[0].options.radius, Some(10.0));
    }

    #[test]
    fn job_title_rows_keep_both_query_fields() {
        let state = heatmap_search_state(
            "Boise",
            "ID",
            "Idaho",
            43.615,
            -116.2023,
            8.0,
            Some("backend"),
            Some("Backend Engineer"),
            Some("all"),
        );
        assert_eq!(state.search_query, "backend");
        assert_eq!(state.job_title_query.as_deref(), Some("Backend Engineer"));
        // "all" means no filter on the wire.
        assert_eq!(state.seniority_level, None);
    }
}
