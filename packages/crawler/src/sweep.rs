//! Category sweep orchestration: cities in, persisted count batches out.
//!
//! Each category runs its queries sequentially; within a query the
//! cities fan out through the scheduler. A failed fetch stays inside its
//! result row; a failed persistence aborts the run with an error.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::config::{category_queries, CrawlerConfig};
use crate::radius::{build_area_lookup, estimate_radius_from_population, RadiusResolver};
use crate::scheduler::{counts_for_cities, TotalCountFetcher};
use crate::search_state::{merge_overrides, SearchState};
use crate::sources::{AreaSource, CitySource};
use crate::storage::{ResultStore, RunContext};
use crate::types::City;
use crate::util::parse_search_state_from_url;

/// Base state for a run: the country-wide default, optionally seeded
/// from a shared URL's searchState. A bad seed is a warning, not a
/// failure.
pub fn base_search_state(cfg: &CrawlerConfig) -> SearchState {
    let base = SearchState::default_us();
    let Some(url) = &cfg.seed_search_state_url else {
        return base;
    };
    parse_search_state_from_url(url)
        .and_then(|overrides| merge_overrides(&base, &overrides))
        .unwrap_or_else(|error| {
            warn!(%error, "Failed to seed searchState from URL; using defaults");
            SearchState::default_us()
        })
}

/// Run every query of one category across the city list and persist the
/// batch. The category name is recorded as the row's role.
#[allow(clippy::too_many_arguments)]
pub async fn run_category(
    fetcher: &impl TotalCountFetcher,
    store: &dyn ResultStore,
    cities: &[City],
    resolver: &RadiusResolver,
    category: &str,
    queries: &[&str],
    base: &SearchState,
    cfg: &CrawlerConfig,
) -> Result<()> {
    let run_date = Utc::now().date_naive();
    for query in queries.iter().copied() {
        info!(category, query, cities = cities.len(), "Running query across cities");
        let results = counts_for_cities(
            fetcher,
            cities,
            |city| radius_for(resolver, cfg, city),
            cfg.concurrency.max(1),
            base,
            Some(query),
        )
        .await;

        let failures = results.iter().filter(|r| r.error.is_some()).count();
        store
            .save_city_results(
                &results,
                &RunContext {
                    query: query.to_string(),
                    job_title_query: None,
                    role: Some(category.to_string()),
                    seniority_level: None,
                    default_radius_miles: cfg.radius_miles,
                    run_date,
                },
            )
            .await
            .with_context(|| format!("failed to persist batch for query {query:?}"))?;

        info!(
            category,
            query,
            saved = results.len(),
            failures,
            "Saved category batch"
        );
    }
    Ok(())
}

/// Full sweep across the given categories. Reference data is loaded
/// once; unknown category names are skipped with a warning.
pub async fn run_categories(
    fetcher: &impl TotalCountFetcher,
    store: &dyn ResultStore,
    city_source: &dyn CitySource,
    gazetteer: Option<&dyn AreaSource>,
    categories: &[String],
    cfg: &CrawlerConfig,
) -> Result<()> {
    let cities = city_source
        .cities(cfg.min_population, cfg.city_limit)
        .context("failed to load the city catalog")?;
    info!(
        cities = cities.len(),
        min_population = cfg.min_population,
        "Loaded city catalog"
    );

    store
        .ensure_schema()
        .await
        .context("failed to prepare the store schema")?;

    let areas = build_area_lookup(store, gazetteer, cfg.load_gazetteer_to_store).await;
    let resolver = RadiusResolver::new(areas, cfg.radius_config());
    let base = base_search_state(cfg);

    for category in categories {
        let Some(queries) = category_queries(category) else {
            warn!(category, "Skipping unknown category");
            continue;
        };
        run_category(
            fetcher, store, &cities, &resolver, category, queries, &base, cfg,
        )
        .await?;
    }
    Ok(())
}

/// Per-city radius: area-derived when the cache has entries, else the
/// population estimate when enabled, else the static default.
fn radius_for(resolver: &RadiusResolver, cfg: &CrawlerConfig, city: &City) -> f64 {
    if resolver.has_areas() {
        resolver.resolve(city)
    } else if cfg.auto_radius_from_population {
        estimate_radius_from_population(
            city.population,
            cfg.density_per_sq_mile,
            cfg.min_radius,
            cfg.max_radius,
        )
    } else {
        cfg.radius_miles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::storage::{HeatmapFilter, HeatmapPoint};
    use crate::types::{AreaLookup, CityCountResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticCities(Vec<City>);

    impl CitySource for StaticCities {
        fn cities(&self, _min_population: i64, _limit: Option<usize>) -> Result<Vec<City>> {
            Ok(self.0.clone())
        }
    }

    struct FixedFetcher;

    #[async_trait]
    impl TotalCountFetcher for FixedFetcher {
        async fn fetch_total(&self, state: &SearchState) -> Result<(i64, Value), ClientError> {
            if state.search_query.contains("ruby") {
                return Err(ClientError::Status {
                    status: 429,
                    body: "slow down".to_string(),
                });
            }
            Ok((7, json!({ "total": 7 })))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        areas: AreaLookup,
        schema_calls: Mutex<usize>,
        batches: Mutex<Vec<(Vec<CityCountResult>, RunContext)>>,
    }

    #[async_trait]
    impl ResultStore for RecordingStore {
        async fn ensure_schema(&self) -> Result<()> {
            *self.schema_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn load_areas(&self) -> Result<AreaLookup> {
            Ok(self.areas.clone())
        }

        async fn upsert_areas(&self, areas: &AreaLookup) -> Result<usize> {
            Ok(areas.len())
        }

        async fn save_city_results(
            &self,
            results: &[CityCountResult],
            ctx: &RunContext,
        ) -> Result<()> {
            self.batches
                .lock()
                .unwrap()
                .push((results.to_vec(), ctx.clone()));
            Ok(())
        }

        async fn heatmap_points(&self, _filter: &HeatmapFilter) -> Result<Vec<HeatmapPoint>> {
            Ok(Vec::new())
        }
    }

    fn test_config() -> CrawlerConfig {
        CrawlerConfig {
            base_url: "https://hiring.cafe".to_string(),
            timeout: Duration::from_secs(30),
            min_delay: Duration::from_millis(0),
            concurrency: 2,
            radius_miles: 25.0,
            min_radius: 5.0,
            max_radius: 50.0,
            density_per_sq_mile: 3000.0,
            auto_radius_from_population: false,
            map_nyc_boroughs: true,
            min_population: 50_000,
            city_limit: None,
            database_url: "postgres://unused".to_string(),
            results_table: "city_counts".to_string(),
            areas_table: "city_areas".to_string(),
            create_tables: true,
            load_gazetteer_to_store: false,
            seed_search_state_url: None,
        }
    }

    fn austin() -> City {
        City {
            name: "Austin".to_string(),
            state_code: "TX".to_string(),
            state_name: "Texas".to_string(),
            latitude: 30.2672,
            longitude: -97.7431,
            population: 961_855,
        }
    }

    #[tokio::test]
    async fn sweep_persists_one_batch_per_query() {
        let store = RecordingStore::default();
        let source = StaticCities(vec![austin()]);
        let cfg = test_config();

        run_categories(
            &FixedFetcher,
            &store,
            &source,
            None,
            &["mobile".to_string(), "bogus".to_string()],
            &cfg,
        )
        .await
        .unwrap();

        let batches = store.batches.lock().unwrap();
        // "mobile" has 3 queries; "bogus" is skipped.
        assert_eq!(batches.len(), 3);
        for (results, ctx) in batches.iter() {
            assert_eq!(results.len(), 1);
            assert_eq!(ctx.role.as_deref(), Some("mobile"));
            assert_eq!(ctx.seniority_level, None);
        }
        assert_eq!(*store.schema_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn area_cache_drives_the_saved_radius() {
        let mut store = RecordingStore::default();
        store
            .areas
            .insert(("austin".to_string(), "TX".to_string()), 326.0);
        let source = StaticCities(vec![austin()]);
        let cfg = test_config();

        run_categories(
            &FixedFetcher,
            &store,
            &source,
            None,
            &["fullstack".to_string()],
            &cfg,
        )
        .await
        .unwrap();

        let batches = store.batches.lock().unwrap();
        assert!(!batches.is_empty());
        for (results, _) in batches.iter() {
            assert_eq!(results[0].radius_miles, 10.0);
        }
    }

    #[tokio::test]
    async fn fetch_failures_are_recorded_not_fatal() {
        let store = RecordingStore::default();
        let source = StaticCities(vec![austin()]);
        let cfg = test_config();

        // "backend" includes a ruby query the fetcher rejects.
        run_categories(
            &FixedFetcher,
            &store,
            &source,
            None,
            &["backend".to_string()],
            &cfg,
        )
        .await
        .unwrap();

        let batches = store.batches.lock().unwrap();
        let ruby_batch = batches
            .iter()
            .find(|(_, ctx)| ctx.query.contains("ruby"))
            .expect("ruby batch saved");
        assert_eq!(ruby_batch.0[0].total, 0);
        assert!(ruby_batch.0[0].error.as_deref().unwrap().contains("429"));
    }

    #[test]
    fn bad_seed_url_falls_back_to_defaults() {
        let mut cfg = test_config();
        cfg.seed_search_state_url = Some("https://hiring.cafe/?nope=1".to_string());
        assert_eq!(base_search_state(&cfg), SearchState::default_us());
    }

    #[test]
    fn seed_url_overrides_base_fields() {
        let mut cfg = test_config();
        cfg.seed_search_state_url = Some(
            "https://hiring.cafe/?searchState=%7B%22searchQuery%22%3A%22sre%22%7D".to_string(),
        );
        let base = base_search_state(&cfg);
        assert_eq!(base.search_query, "sre");
        assert_eq!(base.locations, SearchState::default_us().locations);
    }
}
