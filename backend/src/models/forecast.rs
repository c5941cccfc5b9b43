//! Forecast and forecast-error records.
//!
//! Three shapes of a forecast exist:
//! - [`ForecastCandidate`]: produced in memory by the per-facility forecaster;
//! - [`NewForecast`]: the normalized row handed to a repository for insertion;
//! - [`Forecast`]: a stored row, with its id and creation time.
//!
//! The conversion from candidate to [`NewForecast`] is the single place where
//! model output crosses into the persistence layer.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::hospital::HospitalId;
use crate::db::repository::{ErrorContext, RepositoryError};

crate::row_id!(ForecastId, ForecastErrorId);

/// Round `value` to `places` decimal digits.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Discrete overcrowding tier derived from a pressure value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            "UNKNOWN" => Ok(RiskLevel::Unknown),
            other => Err(format!("Unknown risk level: {}", other)),
        }
    }
}

/// One facility's forecast as produced by a batch, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastCandidate {
    pub hospital_id: HospitalId,
    pub horizon_hours: u32,
    pub predicted_pressure: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub forecast_time: DateTime<Utc>,
    pub risk_level: RiskLevel,
    /// Name of the model that produced the value (not persisted).
    pub model: String,
    /// Number of observations the model was fitted on (not persisted).
    pub observations: usize,
}

/// A forecast row ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewForecast {
    pub hospital_id: HospitalId,
    pub horizon_hours: i32,
    pub predicted_pressure: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub forecast_time: DateTime<Utc>,
    pub risk_level: RiskLevel,
}

impl TryFrom<&ForecastCandidate> for NewForecast {
    type Error = RepositoryError;

    fn try_from(candidate: &ForecastCandidate) -> Result<Self, Self::Error> {
        let context = || {
            ErrorContext::new("normalize_forecast")
                .with_entity("forecast")
                .with_entity_id(candidate.hospital_id)
        };

        if !candidate.predicted_pressure.is_finite() {
            return Err(RepositoryError::validation_with_context(
                format!(
                    "predicted pressure must be finite, got {}",
                    candidate.predicted_pressure
                ),
                context(),
            ));
        }

        let horizon_hours = i32::try_from(candidate.horizon_hours).map_err(|_| {
            RepositoryError::validation_with_context(
                format!("horizon {} does not fit the store", candidate.horizon_hours),
                context(),
            )
        })?;

        // Stores keep timestamps at microsecond resolution.
        let forecast_time = candidate
            .forecast_time
            .duration_trunc(TimeDelta::microseconds(1))
            .map_err(|e| {
                RepositoryError::validation_with_context(
                    format!("forecast_time cannot be normalized: {}", e),
                    context(),
                )
            })?;

        Ok(NewForecast {
            hospital_id: candidate.hospital_id,
            horizon_hours,
            predicted_pressure: candidate.predicted_pressure,
            lower_bound: candidate.lower_bound.filter(|v| v.is_finite()),
            upper_bound: candidate.upper_bound.filter(|v| v.is_finite()),
            forecast_time,
            risk_level: candidate.risk_level,
        })
    }
}

/// A stored forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: ForecastId,
    pub hospital_id: HospitalId,
    pub horizon_hours: i32,
    pub predicted_pressure: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub forecast_time: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

/// Comparison of a stored forecast against the pressure later observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewForecastError {
    pub forecast_id: ForecastId,
    pub hospital_id: HospitalId,
    pub observed_pressure: f64,
    pub predicted_pressure: f64,
    pub absolute_error: f64,
    pub squared_error: f64,
}

impl NewForecastError {
    pub fn compare(forecast: &Forecast, observed_pressure: f64) -> Self {
        let diff = observed_pressure - forecast.predicted_pressure;
        Self {
            forecast_id: forecast.id,
            hospital_id: forecast.hospital_id,
            observed_pressure,
            predicted_pressure: forecast.predicted_pressure,
            absolute_error: diff.abs(),
            squared_error: diff * diff,
        }
    }
}

/// A stored forecast error. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastError {
    pub id: ForecastErrorId,
    pub forecast_id: ForecastId,
    pub hospital_id: HospitalId,
    pub observed_pressure: f64,
    pub predicted_pressure: f64,
    pub absolute_error: f64,
    pub squared_error: f64,
    pub evaluated_at: DateTime<Utc>,
}

/// Row of the "latest forecast per facility" query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestForecast {
    pub hospital_id: HospitalId,
    pub hospital_name: String,
    /// Rounded to 3 decimals.
    pub predicted_pressure: f64,
    pub risk_level: RiskLevel,
    pub forecast_time: DateTime<Utc>,
}

impl LatestForecast {
    pub fn from_parts(forecast: &Forecast, hospital_name: impl Into<String>) -> Self {
        Self {
            hospital_id: forecast.hospital_id,
            hospital_name: hospital_name.into(),
            predicted_pressure: round_to(forecast.predicted_pressure, 3),
            risk_level: forecast.risk_level,
            forecast_time: forecast.forecast_time,
        }
    }
}

/// Aggregated accuracy of stored forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    pub hospital_id: Option<HospitalId>,
    pub horizon_hours: Option<i32>,
    pub count: usize,
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
}

impl ForecastAccuracy {
    /// Summarize `(absolute_error, squared_error)` pairs. `None` when empty.
    pub fn from_errors(
        hospital_id: Option<HospitalId>,
        horizon_hours: Option<i32>,
        errors: &[(f64, f64)],
    ) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let n = errors.len() as f64;
        let mae = errors.iter().map(|(abs, _)| abs).sum::<f64>() / n;
        let mse = errors.iter().map(|(_, sq)| sq).sum::<f64>() / n;
        Some(Self {
            hospital_id,
            horizon_hours,
            count: errors.len(),
            mae,
            rmse: mse.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(pressure: f64) -> ForecastCandidate {
        ForecastCandidate {
            hospital_id: HospitalId(3),
            horizon_hours: 1,
            predicted_pressure: pressure,
            lower_bound: Some(f64::NEG_INFINITY),
            upper_bound: Some(0.9),
            forecast_time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
                + TimeDelta::nanoseconds(1_234_567),
            risk_level: RiskLevel::Medium,
            model: "naive".to_string(),
            observations: 12,
        }
    }

    #[test]
    fn test_normalize_truncates_time_and_drops_non_finite_bounds() {
        let row = NewForecast::try_from(&candidate(0.55)).unwrap();
        assert_eq!(row.horizon_hours, 1);
        assert_eq!(row.lower_bound, None);
        assert_eq!(row.upper_bound, Some(0.9));
        assert_eq!(row.forecast_time.timestamp_subsec_nanos(), 1_234_000);
    }

    #[test]
    fn test_normalize_rejects_nan_prediction() {
        let err = NewForecast::try_from(&candidate(f64::NAN)).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }));
    }

    #[test]
    fn test_risk_level_round_trips_through_text() {
        for level in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Unknown,
        ] {
            assert_eq!(level.to_string().parse::<RiskLevel>().unwrap(), level);
        }
        assert!("SEVERE".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_accuracy_summary() {
        let acc = ForecastAccuracy::from_errors(None, Some(1), &[(0.1, 0.01), (0.3, 0.09)]).unwrap();
        assert_eq!(acc.count, 2);
        assert!((acc.mae - 0.2).abs() < 1e-12);
        assert!((acc.rmse - 0.05f64.sqrt()).abs() < 1e-12);
        assert!(ForecastAccuracy::from_errors(None, None, &[]).is_none());
    }
}
