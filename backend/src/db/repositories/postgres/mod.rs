//! Postgres backend built on Diesel.
//!
//! Tables `hospitals`, `er_snapshots`, `forecasts` and `forecast_errors` are
//! created by the embedded migrations under `migrations/`, which run when the
//! repository is constructed. Idempotent ingestion and evaluate-once rely on
//! the unique constraints declared there (`ON CONFLICT DO NOTHING`).
//!
//! Every query runs on tokio's blocking pool through [`pool::run_blocking`];
//! see [`PostgresConfig::from_env`] for the `PG_*` settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::HashMap;

use crate::db::repository::forecast::validate_new_forecasts;
use crate::db::repository::snapshot::validate_ingestion_rows;
use crate::db::repository::{
    ErrorContext, ForecastRepository, HospitalRepository, RepositoryError, RepositoryResult,
    SnapshotRepository,
};
use crate::models::{
    Forecast, ForecastError, Hospital, HospitalId, IngestionRow, LatestForecast, NewForecast,
    NewForecastError, Snapshot,
};

mod models;
mod pool;
mod schema;

pub use pool::{PostgresConfig, RetryPolicy};

use models::*;
use pool::PgPool;
use schema::*;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Diesel-backed repository for Postgres.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("PostgresRepository")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .field("retry", &self.retry)
            .finish()
    }
}

impl PostgresRepository {
    /// Build the pool and apply pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let pool = config.build_pool()?;
        let mut conn = pool.get()?;
        let applied = conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;
        if !applied.is_empty() {
            log::info!("Applied {} database migration(s)", applied.len());
        }

        Ok(Self {
            pool,
            retry: config.retry,
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        pool::run_blocking(self.pool.clone(), self.retry, op).await
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn decode_forecasts(rows: Vec<ForecastRow>) -> RepositoryResult<Vec<Forecast>> {
    rows.into_iter().map(Forecast::try_from).collect()
}

/// Resolve the facility id for a permit, inserting the facility if unknown.
fn resolve_hospital(
    tx: &mut PgConnection,
    cache: &mut HashMap<String, i64>,
    row: &IngestionRow,
) -> RepositoryResult<i64> {
    let permit = &row.hospital.permit_id;
    if let Some(id) = cache.get(permit) {
        return Ok(*id);
    }

    let existing = hospitals::table
        .filter(hospitals::permit_id.eq(permit))
        .select(hospitals::id)
        .first::<i64>(tx)
        .optional()
        .map_err(map_diesel_error)?;

    let id = match existing {
        Some(id) => id,
        None => {
            let id = diesel::insert_into(hospitals::table)
                .values(NewHospitalRow::from(&row.hospital))
                .returning(hospitals::id)
                .get_result::<i64>(tx)
                .map_err(map_diesel_error)?;
            log::info!("Registered hospital {} (permit {})", id, permit);
            id
        }
    };
    cache.insert(permit.clone(), id);
    Ok(id)
}

#[async_trait]
impl HospitalRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_hospitals(&self) -> RepositoryResult<Vec<Hospital>> {
        self.with_conn(|conn| {
            hospitals::table
                .order(hospitals::id.asc())
                .select(HospitalRow::as_select())
                .load::<HospitalRow>(conn)
                .map(|rows| rows.into_iter().map(Hospital::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn get_hospital(&self, hospital_id: HospitalId) -> RepositoryResult<Hospital> {
        self.with_conn(move |conn| {
            hospitals::table
                .find(hospital_id.0)
                .select(HospitalRow::as_select())
                .first::<HospitalRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(Hospital::from)
                .ok_or_else(|| {
                    RepositoryError::not_found_with_context(
                        format!("Hospital {} not found", hospital_id),
                        ErrorContext::new("get_hospital")
                            .with_entity("hospital")
                            .with_entity_id(hospital_id),
                    )
                })
        })
        .await
    }

    async fn find_hospital_by_permit(&self, permit_id: &str) -> RepositoryResult<Option<Hospital>> {
        let permit_id = permit_id.to_string();
        self.with_conn(move |conn| {
            hospitals::table
                .filter(hospitals::permit_id.eq(&permit_id))
                .select(HospitalRow::as_select())
                .first::<HospitalRow>(conn)
                .optional()
                .map(|row| row.map(Hospital::from))
                .map_err(map_diesel_error)
        })
        .await
    }
}

#[async_trait]
impl SnapshotRepository for PostgresRepository {
    async fn ingest_snapshots(&self, rows: &[IngestionRow]) -> RepositoryResult<Vec<Snapshot>> {
        validate_ingestion_rows(rows)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let mut hospital_ids = HashMap::new();
                let mut inserted = Vec::new();
                for row in &rows {
                    let hospital_id = resolve_hospital(tx, &mut hospital_ids, row)?;
                    let stored = diesel::insert_into(er_snapshots::table)
                        .values(NewSnapshotRow::new(hospital_id, row))
                        .on_conflict((er_snapshots::hospital_id, er_snapshots::snapshot_time))
                        .do_nothing()
                        .returning(SnapshotRow::as_returning())
                        .get_result::<SnapshotRow>(tx)
                        .optional()
                        .map_err(map_diesel_error)?;
                    if let Some(stored) = stored {
                        inserted.push(Snapshot::from(stored));
                    }
                }
                Ok(inserted)
            })
        })
        .await
    }

    async fn list_snapshots(&self) -> RepositoryResult<Vec<Snapshot>> {
        self.with_conn(|conn| {
            er_snapshots::table
                .order((er_snapshots::hospital_id.asc(), er_snapshots::snapshot_time.asc()))
                .select(SnapshotRow::as_select())
                .load::<SnapshotRow>(conn)
                .map(|rows| rows.into_iter().map(Snapshot::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_snapshots_for_hospital(
        &self,
        hospital_id: HospitalId,
    ) -> RepositoryResult<Vec<Snapshot>> {
        self.with_conn(move |conn| {
            er_snapshots::table
                .filter(er_snapshots::hospital_id.eq(hospital_id.0))
                .order((er_snapshots::snapshot_time.asc(), er_snapshots::id.asc()))
                .select(SnapshotRow::as_select())
                .load::<SnapshotRow>(conn)
                .map(|rows| rows.into_iter().map(Snapshot::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }
}

#[async_trait]
impl ForecastRepository for PostgresRepository {
    async fn insert_forecasts(&self, forecasts: &[NewForecast]) -> RepositoryResult<Vec<Forecast>> {
        validate_new_forecasts(forecasts)?;
        if forecasts.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<NewForecastRow> = forecasts.iter().map(NewForecastRow::from).collect();
        let stored = self
            .with_conn(move |conn| {
                conn.transaction(|tx| {
                    diesel::insert_into(forecasts::table)
                        .values(&rows)
                        .returning(ForecastRow::as_returning())
                        .get_results::<ForecastRow>(tx)
                        .map_err(map_diesel_error)
                })
            })
            .await?;
        decode_forecasts(stored)
    }

    async fn latest_forecasts(&self, horizon_hours: i32) -> RepositoryResult<Vec<LatestForecast>> {
        let rows = self
            .with_conn(move |conn| {
                forecasts::table
                    .inner_join(hospitals::table)
                    .filter(forecasts::horizon_hours.eq(horizon_hours))
                    .distinct_on(forecasts::hospital_id)
                    .order((
                        forecasts::hospital_id.asc(),
                        forecasts::forecast_time.desc(),
                        forecasts::id.desc(),
                    ))
                    .select((ForecastRow::as_select(), hospitals::name))
                    .load::<(ForecastRow, String)>(conn)
                    .map_err(map_diesel_error)
            })
            .await?;

        rows.into_iter()
            .map(|(row, name)| {
                let forecast = Forecast::try_from(row)?;
                Ok(LatestForecast::from_parts(&forecast, name))
            })
            .collect()
    }

    async fn latest_forecasts_before(
        &self,
        hospital_id: HospitalId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Forecast>> {
        let rows = self
            .with_conn(move |conn| {
                forecasts::table
                    .filter(forecasts::hospital_id.eq(hospital_id.0))
                    .filter(forecasts::forecast_time.le(at))
                    .distinct_on(forecasts::horizon_hours)
                    .order((
                        forecasts::horizon_hours.asc(),
                        forecasts::forecast_time.desc(),
                        forecasts::id.desc(),
                    ))
                    .select(ForecastRow::as_select())
                    .load::<ForecastRow>(conn)
                    .map_err(map_diesel_error)
            })
            .await?;
        decode_forecasts(rows)
    }

    async fn list_forecasts(&self, hospital_id: Option<HospitalId>) -> RepositoryResult<Vec<Forecast>> {
        let rows = self
            .with_conn(move |conn| {
                let mut query = forecasts::table
                    .select(ForecastRow::as_select())
                    .order(forecasts::id.asc())
                    .into_boxed();
                if let Some(id) = hospital_id {
                    query = query.filter(forecasts::hospital_id.eq(id.0));
                }
                query.load::<ForecastRow>(conn).map_err(map_diesel_error)
            })
            .await?;
        decode_forecasts(rows)
    }

    async fn insert_forecast_error(
        &self,
        error: &NewForecastError,
    ) -> RepositoryResult<Option<ForecastError>> {
        let row = NewForecastErrorRow::from(error);
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let exists = forecasts::table
                    .find(row.forecast_id)
                    .select(forecasts::id)
                    .first::<i64>(tx)
                    .optional()
                    .map_err(map_diesel_error)?;
                if exists.is_none() {
                    return Err(RepositoryError::not_found_with_context(
                        format!("Forecast {} not found", row.forecast_id),
                        ErrorContext::new("insert_forecast_error")
                            .with_entity("forecast")
                            .with_entity_id(row.forecast_id),
                    ));
                }

                diesel::insert_into(forecast_errors::table)
                    .values(&row)
                    .on_conflict(forecast_errors::forecast_id)
                    .do_nothing()
                    .returning(ForecastErrorRow::as_returning())
                    .get_result::<ForecastErrorRow>(tx)
                    .optional()
                    .map(|stored| stored.map(ForecastError::from))
                    .map_err(map_diesel_error)
            })
        })
        .await
    }

    async fn list_forecast_errors(
        &self,
        hospital_id: Option<HospitalId>,
        horizon_hours: Option<i32>,
    ) -> RepositoryResult<Vec<ForecastError>> {
        self.with_conn(move |conn| {
            let mut query = forecast_errors::table
                .inner_join(forecasts::table)
                .select(ForecastErrorRow::as_select())
                .order(forecast_errors::id.asc())
                .into_boxed();
            if let Some(id) = hospital_id {
                query = query.filter(forecast_errors::hospital_id.eq(id.0));
            }
            if let Some(h) = horizon_hours {
                query = query.filter(forecasts::horizon_hours.eq(h));
            }
            query
                .load::<ForecastErrorRow>(conn)
                .map(|rows| rows.into_iter().map(ForecastError::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }
}
