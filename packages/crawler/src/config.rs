//! Environment-driven configuration and the built-in query catalogs.

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::radius::RadiusConfig;

/// Predefined query sets, one per role category.
pub const QUERY_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "frontend",
        &[
            "frontend engineer",
            "frontend developer",
            "react developer",
            "javascript developer",
            "typescript developer",
            "ui engineer",
        ],
    ),
    (
        "fullstack",
        &[
            "full stack engineer",
            "full stack developer",
            "software engineer",
            "software developer",
        ],
    ),
    (
        "backend",
        &[
            "backend engineer",
            "backend developer",
            "python developer",
            "java developer",
            "golang developer",
            "ruby developer",
            "node.js developer",
        ],
    ),
    (
        "mobile",
        &["ios engineer", "android engineer", "mobile developer"],
    ),
    (
        "devops",
        &[
            "devops engineer",
            "site reliability engineer",
            "platform engineer",
            "cloud engineer",
        ],
    ),
    (
        "levels",
        &[
            "junior software engineer",
            "junior developer",
            "mid level software engineer",
            "mid-level software engineer",
            "software engineer ii",
            "software engineer 2",
            "senior software engineer",
            "lead engineer",
            "staff engineer",
            "principal engineer",
            "engineering manager",
            "tech lead",
        ],
    ),
    (
        "data",
        &["data engineer", "ml engineer", "machine learning engineer", "ml ops"],
    ),
];

/// Default query set for simple runs.
pub const JOB_QUERIES: &[&str] = &[
    "software engineer",
    "frontend engineer",
    "backend engineer",
    "react developer",
    "full stack engineer",
];

pub fn category_queries(category: &str) -> Option<&'static [&'static str]> {
    QUERY_CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, queries)| *queries)
}

/// Resolve the query list for a run. Priority: explicit comma-separated
/// list, then a predefined category, then a single query, then the
/// defaults.
pub fn resolve_queries(
    query_list: Option<&str>,
    query_set: Option<&str>,
    query: Option<&str>,
) -> Result<Vec<String>> {
    if let Some(list) = query_list {
        let queries: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();
        if queries.is_empty() {
            return Err(anyhow!("no queries found in the query list"));
        }
        return Ok(queries);
    }

    if let Some(set) = query_set {
        return category_queries(set)
            .map(|queries| queries.iter().map(|q| q.to_string()).collect())
            .ok_or_else(|| anyhow!("unknown query set: {set}"));
    }

    if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
        return Ok(vec![q.trim().to_string()]);
    }

    Ok(JOB_QUERIES.iter().map(|q| q.to_string()).collect())
}

/// Inputs the acquisition engine consumes, loaded from `JOBS_*`
/// environment variables (a `.env` file is honored in development).
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Minimum gap between consecutive requests through one client.
    pub min_delay: Duration,
    pub concurrency: usize,
    /// Static default radius when no area data applies.
    pub radius_miles: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    pub density_per_sq_mile: f64,
    pub auto_radius_from_population: bool,
    pub map_nyc_boroughs: bool,
    pub min_population: i64,
    /// `None` means all cities.
    pub city_limit: Option<usize>,
    pub database_url: String,
    pub results_table: String,
    pub areas_table: String,
    pub create_tables: bool,
    /// Allow a one-time bulk load of the area reference file into the
    /// store when the cache is empty.
    pub load_gazetteer_to_store: bool,
    /// Optional shared URL whose searchState seeds the base state.
    pub seed_search_state_url: Option<String>,
}

impl CrawlerConfig {
    /// Load configuration from environment variables. Missing required
    /// values are fatal before any fetch starts.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let city_limit: usize = env_parse("JOBS_CITY_LIMIT", 0)?;
        Ok(Self {
            base_url: env::var("JOBS_BASE_URL")
                .unwrap_or_else(|_| "https://hiring.cafe".to_string()),
            timeout: Duration::from_secs(env_parse("JOBS_TIMEOUT_S", 30u64)?),
            min_delay: Duration::from_millis(env_parse("JOBS_MIN_DELAY_MS", 350u64)?),
            concurrency: env_parse("JOBS_CONCURRENCY", 1usize)?,
            radius_miles: env_parse("JOBS_RADIUS_MILES", 25.0)?,
            min_radius: env_parse("JOBS_MIN_RADIUS", 5.0)?,
            max_radius: env_parse("JOBS_MAX_RADIUS", 50.0)?,
            density_per_sq_mile: env_parse("JOBS_DENSITY_PER_SQ_MILE", 3000.0)?,
            auto_radius_from_population: env_bool("JOBS_AUTO_RADIUS_FROM_POPULATION", false)?,
            map_nyc_boroughs: env_bool("JOBS_MAP_NYC_BORO_TO_CITY", true)?,
            min_population: env_parse("JOBS_MIN_POPULATION", 50_000i64)?,
            city_limit: (city_limit > 0).then_some(city_limit),
            database_url: env::var("JOBS_PG_URL").context("JOBS_PG_URL must be set")?,
            results_table: env::var("JOBS_PG_TABLE")
                .unwrap_or_else(|_| "city_counts".to_string()),
            areas_table: env::var("JOBS_PG_AREAS_TABLE")
                .unwrap_or_else(|_| "city_areas".to_string()),
            create_tables: env_bool("JOBS_PG_CREATE_TABLE", true)?,
            load_gazetteer_to_store: env_bool("JOBS_PG_LOAD_GAZETTEER_TO_PG", false)?,
            seed_search_state_url: env::var("JOBS_USE_URL_SEARCH_STATE").ok(),
        })
    }

    pub fn radius_config(&self) -> RadiusConfig {
        RadiusConfig {
            default_radius: self.radius_miles,
            min_radius: self.min_radius,
            max_radius: self.max_radius,
            map_boroughs: self.map_nyc_boroughs,
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid value, got {value:?}")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => {
            parse_bool(&value).ok_or_else(|| anyhow!("{key} must be a boolean, got {value:?}"))
        }
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
