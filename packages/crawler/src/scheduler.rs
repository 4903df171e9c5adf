//! Fetch scheduling: one count per (target, query) pair, bounded
//! parallelism, exactly one result per target no matter what fails.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ClientError, CountClient};
use crate::search_state::{search_state_for_city, SearchState};
use crate::types::{City, CityCountResult, CountResult};

/// Seam over the external client so schedulers and tests can swap the
/// transport.
#[async_trait]
pub trait TotalCountFetcher: Send + Sync {
    async fn fetch_total(&self, state: &SearchState) -> Result<(i64, Value), ClientError>;
}

#[async_trait]
impl TotalCountFetcher for CountClient {
    async fn fetch_total(&self, state: &SearchState) -> Result<(i64, Value), ClientError> {
        CountClient::fetch_total(self, state).await
    }
}

/// Count for one query over the base state's locations. Failures land in
/// the result, never in a return error.
pub async fn count_for_query(
    fetcher: &impl TotalCountFetcher,
    query: &str,
    base: &SearchState,
) -> CountResult {
    let state = base.with_query(query);
    match fetcher.fetch_total(&state).await {
        Ok((total, raw)) => CountResult {
            query: query.to_string(),
            total,
            raw: Some(raw),
            error: None,
        },
        Err(error) => {
            warn!(query, %error, "Count query failed");
            CountResult {
                query: query.to_string(),
                total: 0,
                raw: None,
                error: Some(error.to_string()),
            }
        }
    }
}

/// Sequential query-list mode; results keep the input order.
pub async fn counts_for_queries(
    fetcher: &impl TotalCountFetcher,
    queries: &[String],
    base: &SearchState,
) -> Vec<CountResult> {
    let mut results = Vec::with_capacity(queries.len());
    for query in queries {
        results.push(count_for_query(fetcher, query, base).await);
    }
    results
}

/// Combined count across a cluster of places, as one request.
pub async fn count_for_cluster(
    fetcher: &impl TotalCountFetcher,
    members: &[crate::types::ClusterMember],
    query: &str,
    default_radius: f64,
    base: &SearchState,
) -> CountResult {
    let state =
        crate::search_state::search_state_for_cluster(base, members, query, default_radius);
    match fetcher.fetch_total(&state).await {
        Ok((total, raw)) => CountResult {
            query: query.to_string(),
            total,
            raw: Some(raw),
            error: None,
        },
        Err(error) => {
            warn!(members = members.len(), %error, "Cluster count failed");
            CountResult {
                query: query.to_string(),
                total: 0,
                raw: None,
                error: Some(error.to_string()),
            }
        }
    }
}

/// Count for one city at the given radius.
pub async fn count_for_city(
    fetcher: &impl TotalCountFetcher,
    city: &City,
    radius_miles: f64,
    base: &SearchState,
    query: Option<&str>,
) -> CityCountResult {
    let state = search_state_for_city(base, city, radius_miles, query);
    match fetcher.fetch_total(&state).await {
        Ok((total, raw)) => {
            debug!(city = %city.name, state = %city.state_code, total, "City count fetched");
            CityCountResult {
                city: city.clone(),
                total,
                raw: Some(raw),
                error: None,
                radius_miles,
            }
        }
        Err(error) => {
            warn!(city = %city.name, state = %city.state_code, %error, "City count failed");
            CityCountResult {
                city: city.clone(),
                total: 0,
                raw: None,
                error: Some(error.to_string()),
                radius_miles,
            }
        }
    }
}

/// City-sweep mode: exactly one result per city, regardless of
/// individual failures.
///
/// `concurrency <= 1` runs strictly sequentially in input order; larger
/// pools dispatch through a bounded buffer and collect in completion
/// order. There is no cross-city cancellation and no batch timeout
/// beyond the client's per-request timeout.
pub async fn counts_for_cities<F>(
    fetcher: &impl TotalCountFetcher,
    cities: &[City],
    radius_for: F,
    concurrency: usize,
    base: &SearchState,
    query: Option<&str>,
) -> Vec<CityCountResult>
where
    F: Fn(&City) -> f64 + Sync,
{
    if concurrency <= 1 {
        let mut results = Vec::with_capacity(cities.len());
        for city in cities {
            let radius = radius_for(city);
            results.push(count_for_city(fetcher, city, radius, base, query).await);
        }
        return results;
    }

    let tasks: Vec<_> = cities
        .iter()
        .map(|city| {
            let radius = radius_for(city);
            async move { count_for_city(fetcher, city, radius, base, query).await }
        })
        .collect();

    stream::iter(tasks)
        .buffer_unordered(concurrency)
        .collect()
        .await
}
