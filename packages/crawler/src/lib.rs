//! Acquisition engine for geographic job-market demand.
//!
//! Issues one count query per (city, search query) pair against an
//! external job-search service, infers a sensible search radius per
//! city, and persists results idempotently for heatmap rendering. The
//! HTTP front end, CLI, and reference-data loaders are collaborators
//! behind the seams in [`sources`].

pub mod client;
pub mod config;
pub mod radius;
pub mod scheduler;
pub mod search_state;
pub mod sources;
pub mod storage;
pub mod sweep;
pub mod types;
pub mod util;

// Re-exports for clean API
pub use client::{extract_total, ClientError, CountClient};
pub use config::{category_queries, resolve_queries, CrawlerConfig, JOB_QUERIES, QUERY_CATEGORIES};
pub use radius::{
    build_area_lookup, estimate_radius_from_population, RadiusConfig, RadiusResolver,
};
pub use scheduler::{
    count_for_city, count_for_cluster, count_for_query, counts_for_cities, counts_for_queries,
    TotalCountFetcher,
};
pub use search_state::{
    deep_link_url, merge_overrides, search_state_for_city, search_state_for_cluster, Location,
    SearchState, SeniorityLevel,
};
pub use sources::{AreaSource, CitySource};
pub use storage::{
    HeatmapFilter, HeatmapPoint, PostgresResultStore, ResultStore, RunContext,
};
pub use sweep::{base_search_state, run_categories, run_category};
pub use types::{AreaKey, AreaLookup, City, CityCountResult, ClusterMember, CountResult};
pub use util::{normalize_place_name, parse_search_state_from_url};
