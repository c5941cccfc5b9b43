//! In-memory local repository implementation.
//!
//! Implements every repository trait over plain collections behind one lock.
//! Suitable for unit tests, local runs and the default build; data does not
//! survive the process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::db::repository::forecast::validate_new_forecasts;
use crate::db::repository::snapshot::validate_ingestion_rows;
use crate::db::repository::*;
use crate::models::{
    Forecast, ForecastError, ForecastErrorId, ForecastId, Hospital, HospitalId, IngestionRow,
    LatestForecast, NewForecast, NewForecastError, Snapshot, SnapshotId,
};

/// In-memory repository.
///
/// Cloning shares the underlying store.
///
/// # Example
/// ```ignore
/// use er_pressure::db::{LocalRepository, SnapshotRepository};
///
/// let repo = LocalRepository::new();
/// let inserted = repo.ingest_snapshots(&rows).await?;
/// assert_eq!(repo.snapshot_count(), inserted.len());
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    hospitals: BTreeMap<HospitalId, Hospital>,
    permits: HashMap<String, HospitalId>,
    snapshots: Vec<Snapshot>,
    snapshot_keys: HashSet<(HospitalId, DateTime<Utc>)>,
    forecasts: Vec<Forecast>,
    forecast_errors: Vec<ForecastError>,

    next_hospital_id: i64,
    next_snapshot_id: i64,
    next_forecast_id: i64,
    next_error_id: i64,

    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            hospitals: BTreeMap::new(),
            permits: HashMap::new(),
            snapshots: Vec::new(),
            snapshot_keys: HashSet::new(),
            forecasts: Vec::new(),
            forecast_errors: Vec::new(),
            next_hospital_id: 1,
            next_snapshot_id: 1,
            next_forecast_id: 1,
            next_error_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn forecast(&self, id: ForecastId) -> Option<&Forecast> {
        self.forecasts.iter().find(|f| f.id == id)
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data, keeping the health flag.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    pub fn hospital_count(&self) -> usize {
        self.data.read().hospitals.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.data.read().snapshots.len()
    }

    pub fn forecast_count(&self) -> usize {
        self.data.read().forecasts.len()
    }

    pub fn forecast_error_count(&self) -> usize {
        self.data.read().forecast_errors.len()
    }

    /// Store a forecast row as-is, bypassing batch validation. Lets tests
    /// seed exact ids and timestamps.
    pub fn insert_forecast_raw(&self, forecast: NewForecast, created_at: DateTime<Utc>) -> Forecast {
        Self::store_forecast(&mut self.data.write(), forecast, created_at)
    }

    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection("Database is not healthy"));
        }
        Ok(())
    }

    fn store_forecast(data: &mut LocalData, row: NewForecast, created_at: DateTime<Utc>) -> Forecast {
        let id = ForecastId(data.next_forecast_id);
        data.next_forecast_id += 1;
        let stored = Forecast {
            id,
            hospital_id: row.hospital_id,
            horizon_hours: row.horizon_hours,
            predicted_pressure: row.predicted_pressure,
            lower_bound: row.lower_bound,
            upper_bound: row.upper_bound,
            forecast_time: row.forecast_time,
            risk_level: row.risk_level,
            created_at,
        };
        data.forecasts.push(stored.clone());
        stored
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HospitalRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn list_hospitals(&self) -> RepositoryResult<Vec<Hospital>> {
        self.check_health()?;
        Ok(self.data.read().hospitals.values().cloned().collect())
    }

    async fn get_hospital(&self, hospital_id: HospitalId) -> RepositoryResult<Hospital> {
        self.check_health()?;
        self.data
            .read()
            .hospitals
            .get(&hospital_id)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Hospital {} not found", hospital_id),
                    ErrorContext::new("get_hospital")
                        .with_entity("hospital")
                        .with_entity_id(hospital_id),
                )
            })
    }

    async fn find_hospital_by_permit(&self, permit_id: &str) -> RepositoryResult<Option<Hospital>> {
        self.check_health()?;
        let data = self.data.read();
        Ok(data
            .permits
            .get(permit_id)
            .and_then(|id| data.hospitals.get(id))
            .cloned())
    }
}

#[async_trait]
impl SnapshotRepository for LocalRepository {
    async fn ingest_snapshots(&self, rows: &[IngestionRow]) -> RepositoryResult<Vec<Snapshot>> {
        self.check_health()?;
        // Nothing below can fail, so validating first keeps the batch atomic.
        validate_ingestion_rows(rows)?;

        let mut data = self.data.write();
        let mut inserted = Vec::new();
        for row in rows {
            let hospital_id = match data.permits.get(&row.hospital.permit_id) {
                Some(id) => *id,
                None => {
                    let id = HospitalId(data.next_hospital_id);
                    data.next_hospital_id += 1;
                    data.permits.insert(row.hospital.permit_id.clone(), id);
                    data.hospitals
                        .insert(id, row.hospital.clone().into_hospital(id));
                    log::info!(
                        "Registered hospital {} (permit {})",
                        id,
                        row.hospital.permit_id
                    );
                    id
                }
            };

            if !data.snapshot_keys.insert((hospital_id, row.snapshot_time)) {
                continue;
            }
            let snapshot = Snapshot {
                id: SnapshotId(data.next_snapshot_id),
                hospital_id,
                occupancy: row.occupancy,
                snapshot_time: row.snapshot_time,
                updated_at: row.updated_at,
            };
            data.next_snapshot_id += 1;
            data.snapshots.push(snapshot.clone());
            inserted.push(snapshot);
        }
        Ok(inserted)
    }

    async fn list_snapshots(&self) -> RepositoryResult<Vec<Snapshot>> {
        self.check_health()?;
        Ok(self.data.read().snapshots.clone())
    }

    async fn list_snapshots_for_hospital(
        &self,
        hospital_id: HospitalId,
    ) -> RepositoryResult<Vec<Snapshot>> {
        self.check_health()?;
        let mut history: Vec<Snapshot> = self
            .data
            .read()
            .snapshots
            .iter()
            .filter(|s| s.hospital_id == hospital_id)
            .cloned()
            .collect();
        history.sort_by_key(|s| (s.snapshot_time, s.id));
        Ok(history)
    }
}

#[async_trait]
impl ForecastRepository for LocalRepository {
    async fn insert_forecasts(&self, forecasts: &[NewForecast]) -> RepositoryResult<Vec<Forecast>> {
        self.check_health()?;
        validate_new_forecasts(forecasts)?;

        let created_at = Utc::now();
        let mut data = self.data.write();
        Ok(forecasts
            .iter()
            .map(|row| Self::store_forecast(&mut data, row.clone(), created_at))
            .collect())
    }

    async fn latest_forecasts(&self, horizon_hours: i32) -> RepositoryResult<Vec<LatestForecast>> {
        self.check_health()?;
        let data = self.data.read();

        let mut latest: BTreeMap<HospitalId, &Forecast> = BTreeMap::new();
        for forecast in data.forecasts.iter().filter(|f| f.horizon_hours == horizon_hours) {
            latest
                .entry(forecast.hospital_id)
                .and_modify(|current| {
                    if (forecast.forecast_time, forecast.id) > (current.forecast_time, current.id) {
                        *current = forecast;
                    }
                })
                .or_insert(forecast);
        }

        Ok(latest
            .into_iter()
            .filter_map(|(hospital_id, forecast)| {
                data.hospitals
                    .get(&hospital_id)
                    .map(|h| LatestForecast::from_parts(forecast, h.name.clone()))
            })
            .collect())
    }

    async fn latest_forecasts_before(
        &self,
        hospital_id: HospitalId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Forecast>> {
        self.check_health()?;
        let data = self.data.read();

        let mut latest: BTreeMap<i32, &Forecast> = BTreeMap::new();
        for forecast in data
            .forecasts
            .iter()
            .filter(|f| f.hospital_id == hospital_id && f.forecast_time <= at)
        {
            let current = latest.entry(forecast.horizon_hours).or_insert(forecast);
            if (forecast.forecast_time, forecast.id) > (current.forecast_time, current.id) {
                *current = forecast;
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn list_forecasts(&self, hospital_id: Option<HospitalId>) -> RepositoryResult<Vec<Forecast>> {
        self.check_health()?;
        Ok(self
            .data
            .read()
            .forecasts
            .iter()
            .filter(|f| hospital_id.map_or(true, |id| f.hospital_id == id))
            .cloned()
            .collect())
    }

    async fn insert_forecast_error(
        &self,
        error: &NewForecastError,
    ) -> RepositoryResult<Option<ForecastError>> {
        self.check_health()?;
        let mut data = self.data.write();

        if data.forecast(error.forecast_id).is_none() {
            return Err(RepositoryError::not_found_with_context(
                format!("Forecast {} not found", error.forecast_id),
                ErrorContext::new("insert_forecast_error")
                    .with_entity("forecast")
                    .with_entity_id(error.forecast_id),
            ));
        }
        if data
            .forecast_errors
            .iter()
            .any(|e| e.forecast_id == error.forecast_id)
        {
            return Ok(None);
        }

        let stored = ForecastError {
            id: ForecastErrorId(data.next_error_id),
            forecast_id: error.forecast_id,
            hospital_id: error.hospital_id,
            observed_pressure: error.observed_pressure,
            predicted_pressure: error.predicted_pressure,
            absolute_error: error.absolute_error,
            squared_error: error.squared_error,
            evaluated_at: Utc::now(),
        };
        data.next_error_id += 1;
        data.forecast_errors.push(stored.clone());
        Ok(Some(stored))
    }

    async fn list_forecast_errors(
        &self,
        hospital_id: Option<HospitalId>,
        horizon_hours: Option<i32>,
    ) -> RepositoryResult<Vec<ForecastError>> {
        self.check_health()?;
        let data = self.data.read();
        Ok(data
            .forecast_errors
            .iter()
            .filter(|e| hospital_id.map_or(true, |id| e.hospital_id == id))
            .filter(|e| {
                horizon_hours.map_or(true, |h| {
                    data.forecast(e.forecast_id)
                        .is_some_and(|f| f.horizon_hours == h)
                })
            })
            .cloned()
            .collect())
    }
}
