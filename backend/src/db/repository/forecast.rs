//! Forecast and forecast-error repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{
    Forecast, ForecastError, HospitalId, LatestForecast, NewForecast, NewForecastError,
};

/// Storage for forecasts and their evaluated errors.
///
/// Forecasts are insert-only. Several rows may exist for the same
/// `(hospital_id, horizon_hours, forecast_time)`; readers resolve duplicates
/// by preferring the highest id.
#[async_trait]
pub trait ForecastRepository: Send + Sync {
    /// Insert a batch of forecasts atomically.
    ///
    /// # Returns
    /// * `Ok(Vec<Forecast>)` - The stored rows, in input order
    /// * `Err(RepositoryError)` - Nothing from the batch is stored
    async fn insert_forecasts(&self, forecasts: &[NewForecast]) -> RepositoryResult<Vec<Forecast>>;

    /// Latest forecast per facility for one horizon.
    ///
    /// Per facility, the row with the greatest `forecast_time` wins, ties
    /// going to the highest id. Facilities without a forecast for this
    /// horizon produce no row. Ordered by facility id.
    async fn latest_forecasts(&self, horizon_hours: i32) -> RepositoryResult<Vec<LatestForecast>>;

    /// For each horizon, the most recent forecast of a facility whose
    /// `forecast_time` is not after `at`. Ties on `forecast_time` go to the
    /// highest id. Ordered by horizon; empty when nothing qualifies.
    async fn latest_forecasts_before(
        &self,
        hospital_id: HospitalId,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Forecast>>;

    /// Forecasts, optionally restricted to one facility, ordered by id.
    async fn list_forecasts(&self, hospital_id: Option<HospitalId>)
        -> RepositoryResult<Vec<Forecast>>;

    /// Record the error of an evaluated forecast.
    ///
    /// # Returns
    /// * `Ok(Some(ForecastError))` - The stored row
    /// * `Ok(None)` - The forecast already has an error row; nothing stored
    async fn insert_forecast_error(
        &self,
        error: &NewForecastError,
    ) -> RepositoryResult<Option<ForecastError>>;

    /// Stored forecast errors, filtered by facility and by the horizon of
    /// the evaluated forecast. Ordered by id.
    async fn list_forecast_errors(
        &self,
        hospital_id: Option<HospitalId>,
        horizon_hours: Option<i32>,
    ) -> RepositoryResult<Vec<ForecastError>>;
}

/// Reject forecast rows whose predicted pressure is not a finite number.
pub(crate) fn validate_new_forecasts(forecasts: &[NewForecast]) -> RepositoryResult<()> {
    match forecasts.iter().find(|f| !f.predicted_pressure.is_finite()) {
        Some(bad) => Err(RepositoryError::validation_with_context(
            format!("predicted pressure must be finite, got {}", bad.predicted_pressure),
            ErrorContext::new("insert_forecasts")
                .with_entity("forecast")
                .with_entity_id(bad.hospital_id),
        )),
        None => Ok(()),
    }
}
