//! Store tests against a disposable Postgres container.
//!
//! One shared container for the whole test binary; each test gets its
//! own tables, so they can run in parallel against the same database.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use demand_crawler::{
    City, CityCountResult, HeatmapFilter, PostgresResultStore, ResultStore, RunContext,
};

struct SharedDb {
    url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_DB: OnceCell<SharedDb> = OnceCell::const_new();

impl SharedDb {
    async fn init() -> Result<Self> {
        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;
        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        Ok(Self {
            url: format!("postgresql://postgres:postgres@{host}:{port}/postgres"),
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_DB
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize the test database")
            })
            .await
    }
}

async fn connect() -> Result<PgPool> {
    let db = SharedDb::get().await;
    PgPool::connect(&db.url)
        .await
        .context("Failed to connect to the test database")
}

async fn store_on(
    pool: PgPool,
    results_table: &str,
    areas_table: &str,
) -> Result<PostgresResultStore> {
    let store =
        PostgresResultStore::new(pool, results_table, areas_table, true, "https://hiring.cafe")?;
    store.ensure_schema().await?;
    Ok(store)
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

fn austin_result(total: i64) -> CityCountResult {
    CityCountResult {
        city: austin(),
        total,
        raw: None,
        error: None,
        radius_miles: 10.0,
    }
}

fn run_context(query: &str, seniority: Option<&str>, run_date: NaiveDate) -> RunContext {
    RunContext {
        query: query.to_string(),
        job_title_query: None,
        role: Some("backend".to_string()),
        seniority_level: seniority.map(str::to_string),
        default_radius_miles: 25.0,
        run_date,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
}

#[tokio::test]
async fn rerunning_a_day_updates_rows_in_place() -> Result<()> {
    let pool = connect().await?;
    let store = store_on(pool.clone(), "counts_rerun", "areas_rerun").await?;

    // NULL seniority on purpose: the natural key must treat it as a
    // value, not as always-distinct.
    let ctx = run_context("backend engineer", None, day(30));
    store.save_city_results(&[austin_result(100)], &ctx).await?;
    let first = sqlx::query("SELECT total, run_at FROM counts_rerun")
        .fetch_one(&pool)
        .await?;
    let first_run_at: DateTime<Utc> = first.get("run_at");
    assert_eq!(first.get::<i64, _>("total"), 100);

    tokio::time::sleep(Duration::from_millis(50)).await;
    store.save_city_results(&[austin_result(250)], &ctx).await?;

    let rows = sqlx::query("SELECT total, run_at FROM counts_rerun")
        .fetch_all(&pool)
        .await?;
    assert_eq!(rows.len(), 1, "same-day rerun must update, not duplicate");
    assert_eq!(rows[0].get::<i64, _>("total"), 250);
    assert!(rows[0].get::<DateTime<Utc>, _>("run_at") > first_run_at);

    // A different seniority on the same day is a separate row.
    let entry_ctx = run_context("backend engineer", Some("entry"), day(30));
    store
        .save_city_results(&[austin_result(40)], &entry_ctx)
        .await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM counts_rerun")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 2);
    Ok(())
}

#[tokio::test]
async fn heatmap_serves_the_latest_row_per_group() -> Result<()> {
    let pool = connect().await?;
    let store = store_on(pool.clone(), "counts_heatmap", "areas_heatmap").await?;

    store
        .save_city_results(
            &[austin_result(80)],
            &run_context("frontend developer", Some("entry"), day(29)),
        )
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .save_city_results(
            &[austin_result(120)],
            &run_context("frontend developer", Some("entry"), day(30)),
        )
        .await?;

    let points = store.heatmap_points(&HeatmapFilter::default()).await?;
    assert_eq!(points.len(), 1, "one point per (city, query, seniority)");
    assert_eq!(points[0].total, 120);
    assert_eq!(points[0].city, "Austin");
    assert_eq!(points[0].radius_miles, 10.0);
    assert!(points[0]
        .hiring_cafe_url
        .starts_with("https://hiring.cafe/?searchState="));
    Ok(())
}

#[tokio::test]
async fn area_upserts_round_trip_through_the_cache() -> Result<()> {
    let pool = connect().await?;
    let store = store_on(pool.clone(), "counts_areas", "areas_areas").await?;

    let mut areas = demand_crawler::AreaLookup::new();
    areas.insert(("austin".to_string(), "TX".to_string()), 326.0);
    areas.insert(("oklahoma city".to_string(), "OK".to_string()), 620.0);
    assert_eq!(store.upsert_areas(&areas).await?, 2);

    // Overwrite wins on re-upsert.
    areas.insert(("austin".to_string(), "TX".to_string()), 330.0);
    store.upsert_areas(&areas).await?;

    let loaded = store.load_areas().await?;
    assert_eq!(
        loaded.get(&("austin".to_string(), "TX".to_string())),
        Some(&330.0)
    );
    // The load double-keys normalized names ("oklahoma city" -> "oklahoma").
    assert_eq!(
        loaded.get(&("oklahoma".to_string(), "OK".to_string())),
        Some(&620.0)
    );
    Ok(())
}
