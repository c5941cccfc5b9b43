use chrono::{DateTime, Utc};
use diesel::prelude::*;
use qtty::Hours;

use super::schema::{er_snapshots, forecast_errors, forecasts, hospitals};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{
    Forecast, ForecastError, ForecastErrorId, ForecastId, Hospital, HospitalId, IngestionRow,
    NewForecast, NewForecastError, NewHospital, Occupancy, RiskLevel, Snapshot, SnapshotId,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = hospitals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HospitalRow {
    pub id: i64,
    pub name: String,
    pub region: Option<String>,
    pub permit_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
}

impl From<HospitalRow> for Hospital {
    fn from(row: HospitalRow) -> Self {
        Hospital {
            id: HospitalId(row.id),
            name: row.name,
            region: row.region,
            permit_id: row.permit_id,
            latitude: row.latitude,
            longitude: row.longitude,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = hospitals)]
pub struct NewHospitalRow<'a> {
    pub name: &'a str,
    pub region: Option<&'a str>,
    pub permit_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
}

impl<'a> From<&'a NewHospital> for NewHospitalRow<'a> {
    fn from(h: &'a NewHospital) -> Self {
        Self {
            name: &h.name,
            region: h.region.as_deref(),
            permit_id: &h.permit_id,
            latitude: h.latitude,
            longitude: h.longitude,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = er_snapshots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SnapshotRow {
    pub id: i64,
    pub hospital_id: i64,
    pub functional_stretchers: i32,
    pub occupied_stretchers: i32,
    pub patients_total: i32,
    pub patients_waiting_mc: i32,
    pub patients_over_24h: i32,
    pub patients_over_48h: i32,
    pub avg_stay_stretcher: Hours,
    pub avg_stay_ambulatory: Hours,
    pub snapshot_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Snapshot {
            id: SnapshotId(row.id),
            hospital_id: HospitalId(row.hospital_id),
            occupancy: Occupancy {
                functional_stretchers: row.functional_stretchers,
                occupied_stretchers: row.occupied_stretchers,
                patients_total: row.patients_total,
                patients_waiting_mc: row.patients_waiting_mc,
                patients_over_24h: row.patients_over_24h,
                patients_over_48h: row.patients_over_48h,
                avg_stay_stretcher: row.avg_stay_stretcher,
                avg_stay_ambulatory: row.avg_stay_ambulatory,
            },
            snapshot_time: row.snapshot_time,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = er_snapshots)]
pub struct NewSnapshotRow {
    pub hospital_id: i64,
    pub functional_stretchers: i32,
    pub occupied_stretchers: i32,
    pub patients_total: i32,
    pub patients_waiting_mc: i32,
    pub patients_over_24h: i32,
    pub patients_over_48h: i32,
    pub avg_stay_stretcher: Hours,
    pub avg_stay_ambulatory: Hours,
    pub snapshot_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewSnapshotRow {
    pub fn new(hospital_id: i64, row: &IngestionRow) -> Self {
        let o = &row.occupancy;
        Self {
            hospital_id,
            functional_stretchers: o.functional_stretchers,
            occupied_stretchers: o.occupied_stretchers,
            patients_total: o.patients_total,
            patients_waiting_mc: o.patients_waiting_mc,
            patients_over_24h: o.patients_over_24h,
            patients_over_48h: o.patients_over_48h,
            avg_stay_stretcher: o.avg_stay_stretcher,
            avg_stay_ambulatory: o.avg_stay_ambulatory,
            snapshot_time: row.snapshot_time,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = forecasts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ForecastRow {
    pub id: i64,
    pub hospital_id: i64,
    pub horizon_hours: i32,
    pub predicted_pressure: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub forecast_time: DateTime<Utc>,
    pub risk_level: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ForecastRow> for Forecast {
    type Error = RepositoryError;

    fn try_from(row: ForecastRow) -> RepositoryResult<Self> {
        let risk_level: RiskLevel = row.risk_level.parse().map_err(|e: String| {
            RepositoryError::internal_with_context(
                e,
                ErrorContext::new("decode_forecast")
                    .with_entity("forecast")
                    .with_entity_id(row.id),
            )
        })?;
        Ok(Forecast {
            id: ForecastId(row.id),
            hospital_id: HospitalId(row.hospital_id),
            horizon_hours: row.horizon_hours,
            predicted_pressure: row.predicted_pressure,
            lower_bound: row.lower_bound,
            upper_bound: row.upper_bound,
            forecast_time: row.forecast_time,
            risk_level,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = forecasts)]
pub struct NewForecastRow {
    pub hospital_id: i64,
    pub horizon_hours: i32,
    pub predicted_pressure: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub forecast_time: DateTime<Utc>,
    pub risk_level: &'static str,
}

impl From<&NewForecast> for NewForecastRow {
    fn from(f: &NewForecast) -> Self {
        Self {
            hospital_id: f.hospital_id.0,
            horizon_hours: f.horizon_hours,
            predicted_pressure: f.predicted_pressure,
            lower_bound: f.lower_bound,
            upper_bound: f.upper_bound,
            forecast_time: f.forecast_time,
            risk_level: f.risk_level.as_str(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = forecast_errors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ForecastErrorRow {
    pub id: i64,
    pub forecast_id: i64,
    pub hospital_id: i64,
    pub observed_pressure: f64,
    pub predicted_pressure: f64,
    pub absolute_error: f64,
    pub squared_error: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl From<ForecastErrorRow> for ForecastError {
    fn from(row: ForecastErrorRow) -> Self {
        ForecastError {
            id: ForecastErrorId(row.id),
            forecast_id: ForecastId(row.forecast_id),
            hospital_id: HospitalId(row.hospital_id),
            observed_pressure: row.observed_pressure,
            predicted_pressure: row.predicted_pressure,
            absolute_error: row.absolute_error,
            squared_error: row.squared_error,
            evaluated_at: row.evaluated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = forecast_errors)]
pub struct NewForecastErrorRow {
    pub forecast_id: i64,
    pub hospital_id: i64,
    pub observed_pressure: f64,
    pub predicted_pressure: f64,
    pub absolute_error: f64,
    pub squared_error: f64,
}

impl From<&NewForecastError> for NewForecastErrorRow {
    fn from(e: &NewForecastError) -> Self {
        Self {
            forecast_id: e.forecast_id.0,
            hospital_id: e.hospital_id.0,
            observed_pressure: e.observed_pressure,
            predicted_pressure: e.predicted_pressure,
            absolute_error: e.absolute_error,
            squared_error: e.squared_error,
        }
    }
}
