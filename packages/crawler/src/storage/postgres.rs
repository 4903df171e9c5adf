//! Postgres-backed `ResultStore` using plain sqlx queries.
//!
//! Table names are configurable, so statements are assembled with
//! validated identifiers rather than prepared-statement binds. Each
//! batch of upserts runs in a single transaction.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use super::{heatmap_search_state, HeatmapFilter, HeatmapPoint, ResultStore, RunContext};
use crate::search_state::deep_link_url;
use crate::types::{AreaLookup, CityCountResult};
use crate::util::normalize_place_name;

pub struct PostgresResultStore {
    pool: PgPool,
    results_table: String,
    areas_table: String,
    create_tables: bool,
    /// External site base for reconstructed deep links.
    site_base: String,
}

impl PostgresResultStore {
    pub fn new(
        pool: PgPool,
        results_table: &str,
        areas_table: &str,
        create_tables: bool,
        site_base: &str,
    ) -> Result<Self> {
        validate_identifier(results_table)?;
        validate_identifier(areas_table)?;
        Ok(Self {
            pool,
            results_table: results_table.to_string(),
            areas_table: areas_table.to_string(),
            create_tables,
            site_base: site_base.trim_end_matches('/').to_string(),
        })
    }
}

/// Table names come from configuration and end up interpolated into
/// SQL, so only plain identifiers are accepted.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(anyhow!("invalid table identifier: {name:?}"))
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn ensure_schema(&self) -> Result<()> {
        if !self.create_tables {
            return Ok(());
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {areas} (
                city TEXT NOT NULL,
                state_code TEXT NOT NULL,
                area_sqmi DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (city, state_code)
            )
            "#,
            areas = self.areas_table
        ))
        .execute(&self.pool)
        .await
        .context("Failed to create areas table")?;

        // NULLS NOT DISTINCT keeps the one-row-per-day invariant even
        // for rows written without a seniority filter.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {results} (
                id BIGSERIAL PRIMARY KEY,
                city TEXT NOT NULL,
                state_code TEXT NOT NULL,
                state_name TEXT NOT NULL,
                lat DOUBLE PRECISION NOT NULL,
                lon DOUBLE PRECISION NOT NULL,
                population BIGINT,
                radius_miles DOUBLE PRECISION,
                query TEXT,
                job_title_query TEXT,
                role TEXT,
                seniority_level TEXT,
                total BIGINT,
                error TEXT,
                run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                run_date DATE NOT NULL DEFAULT CURRENT_DATE,
                UNIQUE NULLS NOT DISTINCT (city, state_code, query, seniority_level, run_date)
            )
            "#,
            results = self.results_table
        ))
        .execute(&self.pool)
        .await
        .context("Failed to create results table")?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {results}_query_level_date_idx \
             ON {results} (query, seniority_level, run_date)",
            results = self.results_table
        ))
        .execute(&self.pool)
        .await
        .context("Failed to create results index")?;

        Ok(())
    }

    async fn load_areas(&self) -> Result<AreaLookup> {
        let rows = sqlx::query(&format!(
            "SELECT city, state_code, area_sqmi FROM {areas}",
            areas = self.areas_table
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load areas")?;

        let mut lookup = AreaLookup::new();
        for row in rows {
            let city: String = row.get("city");
            let state_code: String = row.get("state_code");
            let area_sqmi: f64 = row.get("area_sqmi");

            let state = state_code.trim().to_uppercase();
            if state.len() != 2 {
                continue;
            }
            lookup.insert((city.to_lowercase(), state.clone()), area_sqmi);
            lookup.insert((normalize_place_name(&city), state), area_sqmi);
        }
        debug!(entries = lookup.len(), "Loaded area lookup");
        Ok(lookup)
    }

    async fn upsert_areas(&self, areas: &AreaLookup) -> Result<usize> {
        if areas.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            INSERT INTO {areas} (city, state_code, area_sqmi)
            VALUES ($1, $2, $3)
            ON CONFLICT (city, state_code) DO UPDATE SET area_sqmi = EXCLUDED.area_sqmi
            "#,
            areas = self.areas_table
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin area upsert transaction")?;
        let mut written = 0;
        for ((city, state_code), area_sqmi) in areas {
            if state_code.len() != 2 {
                continue;
            }
            sqlx::query(&sql)
                .bind(city)
                .bind(state_code)
                .bind(area_sqmi)
                .execute(&mut *tx)
                .await
                .context("Failed to upsert area")?;
            written += 1;
        }
        tx.commit()
            .await
            .context("Failed to commit area upserts")?;
        Ok(written)
    }

    async fn save_city_results(
        &self,
        results: &[CityCountResult],
        ctx: &RunContext,
    ) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {results} (
                city, state_code, state_name, lat, lon, population,
                radius_miles, query, job_title_query, role, seniority_level,
                total, error, run_date
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
            )
            ON CONFLICT (city, state_code, query, seniority_level, run_date)
            DO UPDATE SET
                total = EXCLUDED.total,
                error = EXCLUDED.error,
                population = EXCLUDED.population,
                radius_miles = EXCLUDED.radius_miles,
                lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                state_name = EXCLUDED.state_name,
                job_title_query = EXCLUDED.job_title_query,
                role = EXCLUDED.role,
                run_at = NOW()
            "#,
            results = self.results_table
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin results transaction")?;
        for result in results {
            let radius = if result.radius_miles > 0.0 {
                result.radius_miles
            } else {
                ctx.default_radius_miles
            };
            sqlx::query(&sql)
                .bind(&result.city.name)
                .bind(&result.city.state_code)
                .bind(&result.city.state_name)
                .bind(result.city.latitude)
                .bind(result.city.longitude)
                .bind(result.city.population)
                .bind(radius)
                .bind(&ctx.query)
                .bind(&ctx.job_title_query)
                .bind(&ctx.role)
                .bind(&ctx.seniority_level)
                .bind(result.total)
                .bind(&result.error)
                .bind(ctx.run_date)
                .execute(&mut *tx)
                .await
                .context("Failed to upsert city result")?;
        }
        tx.commit()
            .await
            .context("Failed to commit city results")?;

        debug!(
            rows = results.len(),
            query = %ctx.query,
            run_date = %ctx.run_date,
            "Saved city results"
        );
        Ok(())
    }

    async fn heatmap_points(&self, filter: &HeatmapFilter) -> Result<Vec<HeatmapPoint>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT DISTINCT ON (city, state_code, query, seniority_level) \
             city, state_code, state_name, lat, lon, radius_miles, total, \
             query, job_title_query, role, seniority_level, run_at \
             FROM {results}",
            results = self.results_table
        ));

        let mut has_where = false;
        let mut clause = |builder: &mut QueryBuilder<Postgres>| {
            builder.push(if has_where { " AND " } else { " WHERE " });
            has_where = true;
        };

        if let Some(query) = &filter.query {
            clause(&mut builder);
            builder.push("query = ").push_bind(query);
        }
        if let Some(roles) = &filter.roles {
            clause(&mut builder);
            builder.push("role = ANY(").push_bind(roles).push(")");
        }
        if let Some(levels) = &filter.seniority_levels {
            clause(&mut builder);
            builder
                .push("seniority_level = ANY(")
                .push_bind(levels)
                .push(")");
        }
        if filter.min_total > 0 {
            clause(&mut builder);
            builder.push("total >= ").push_bind(filter.min_total);
        }

        builder
            .push(" ORDER BY city, state_code, query, seniority_level, run_at DESC LIMIT ")
            .push_bind(filter.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query heatmap points")?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let city: String = row.get("city");
            let state: String = row.get("state_code");
            let state_name: String = row.get("state_name");
            let lat: f64 = row.get("lat");
            let lon: f64 = row.get("lon");
            let radius_miles: f64 = row
                .get::<Option<f64>, _>("radius_miles")
                .unwrap_or(DEFAULT_LINK_RADIUS_MILES);
            let total: i64 = row.get::<Option<i64>, _>("total").unwrap_or(0);
            let query: Option<String> = row.get("query");
            let job_title_query: Option<String> = row.get("job_title_query");
            let role: Option<String> = row.get("role");
            let seniority_level: Option<String> = row.get("seniority_level");
            let run_at = row.get("run_at");

            let state_for_link = heatmap_search_state(
                &city,
                &state,
                &state_name,
                lat,
                lon,
                radius_miles,
                query.as_deref(),
                job_title_query.as_deref(),
                seniority_level.as_deref(),
            );
            let hiring_cafe_url = deep_link_url(&self.site_base, &state_for_link)?;

            points.push(HeatmapPoint {
                city,
                state,
                state_name,
                lat,
                lon,
                radius_miles,
                total,
                query,
                job_title_query,
                role,
                seniority_level,
                run_at,
                hiring_cafe_url,
            });
        }
        Ok(points)
    }
}

/// Radius shown in a link when a legacy row stored none.
const DEFAULT_LINK_RADIUS_MILES: f64 = 25.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for name in ["city_counts", "_staging", "Areas2"] {
            assert!(validate_identifier(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_injectable_identifiers() {
        for name in ["", "2fast", "city-counts", "counts; DROP TABLE x", "a b"] {
            assert!(validate_identifier(name).is_err(), "{name:?}");
        }
    }
}
