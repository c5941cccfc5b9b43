//! Per-facility model fitting and one-step forecasting.
//!
//! Each facility is fitted independently on the blocking pool, at most
//! `workers` at a time. A facility's failure (model error, non-finite
//! output, panic) is recorded in its [`EntityOutcome`] and never aborts the
//! batch.

use chrono::TimeDelta;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::config::ForecastConfig;
use super::risk::classify_risk;
use crate::algorithms::{ModelSpec, TimeSeriesModel};
use crate::features::{group_by_hospital, SeriesPoint};
use crate::models::{ForecastCandidate, HospitalId};

/// Builds a fresh, unfitted model for one facility.
pub type ModelFactory = Arc<dyn Fn() -> Box<dyn TimeSeriesModel> + Send + Sync>;

/// Result for one facility in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntityOutcome {
    Forecasted(ForecastCandidate),
    /// Fewer rows than the configured minimum history.
    Skipped { rows: usize, required: usize },
    Failed { reason: String },
}

/// Outcomes of one batch, keyed by facility.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub horizon_hours: u32,
    pub outcomes: BTreeMap<HospitalId, EntityOutcome>,
}

impl BatchReport {
    pub fn new(horizon_hours: u32) -> Self {
        Self {
            horizon_hours,
            outcomes: BTreeMap::new(),
        }
    }

    /// Successful forecasts in facility order.
    pub fn forecasts(&self) -> Vec<ForecastCandidate> {
        self.outcomes
            .values()
            .filter_map(|o| match o {
                EntityOutcome::Forecasted(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn forecasted_count(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Forecasted(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&EntityOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o)).count()
    }
}

#[derive(Clone)]
pub struct PerEntityForecaster {
    factory: ModelFactory,
    min_history: usize,
    workers: usize,
}

impl PerEntityForecaster {
    pub fn new(model: ModelSpec, min_history: usize, workers: usize) -> Self {
        Self {
            factory: Arc::new(move || model.build()),
            min_history,
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.model.clone(), config.min_history, config.worker_count())
    }

    /// Use a custom model constructor instead of a [`ModelSpec`].
    pub fn with_model_factory(mut self, factory: ModelFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Fit and forecast every facility present in `rows`.
    ///
    /// `forecast_time` of each candidate is the facility's latest
    /// `snapshot_time` plus `horizon_hours`.
    pub async fn forecast<R: SeriesPoint>(&self, rows: &[R], horizon_hours: u32) -> BatchReport {
        let mut report = BatchReport::new(horizon_hours);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut pending = Vec::new();

        for (hospital_id, series) in group_by_hospital(rows) {
            if series.len() < self.min_history {
                log::debug!(
                    "Skipping hospital {}: {} rows, {} required",
                    hospital_id,
                    series.len(),
                    self.min_history
                );
                report.outcomes.insert(
                    hospital_id,
                    EntityOutcome::Skipped {
                        rows: series.len(),
                        required: self.min_history,
                    },
                );
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    report.outcomes.insert(
                        hospital_id,
                        EntityOutcome::Failed {
                            reason: format!("worker pool unavailable: {}", e),
                        },
                    );
                    continue;
                }
            };
            let factory = self.factory.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                forecast_entity(factory.as_ref(), hospital_id, &series, horizon_hours)
            });
            pending.push((hospital_id, handle));
        }

        for (hospital_id, handle) in pending {
            let outcome = match handle.await {
                Ok(Ok(candidate)) => EntityOutcome::Forecasted(candidate),
                Ok(Err(reason)) => {
                    log::warn!("Forecast failed for hospital {}: {}", hospital_id, reason);
                    EntityOutcome::Failed { reason }
                }
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        format!("model panicked: {}", panic_message(join_err.into_panic()))
                    } else {
                        format!("worker cancelled: {}", join_err)
                    };
                    log::warn!("Forecast failed for hospital {}: {}", hospital_id, reason);
                    EntityOutcome::Failed { reason }
                }
            };
            report.outcomes.insert(hospital_id, outcome);
        }

        log::info!(
            "Batch for horizon {}h: {} forecasted, {} skipped, {} failed",
            horizon_hours,
            report.forecasted_count(),
            report.skipped_count(),
            report.failed_count()
        );
        report
    }
}

fn forecast_entity<R: SeriesPoint>(
    factory: &(dyn Fn() -> Box<dyn TimeSeriesModel> + Send + Sync),
    hospital_id: HospitalId,
    series: &[R],
    horizon_hours: u32,
) -> Result<ForecastCandidate, String> {
    let last_time = series
        .iter()
        .map(SeriesPoint::snapshot_time)
        .max()
        .ok_or_else(|| "empty series".to_string())?;
    let values: Vec<f64> = series.iter().map(SeriesPoint::pressure).collect();

    let mut model = factory();
    model.fit(&values).map_err(|e| e.to_string())?;
    let step = model
        .forecast(1)
        .map_err(|e| e.to_string())?
        .into_iter()
        .next()
        .ok_or_else(|| format!("{} returned no forecast", model.name()))?;

    if !step.mean.is_finite() {
        return Err(format!("{} produced a non-finite prediction", model.name()));
    }

    Ok(ForecastCandidate {
        hospital_id,
        horizon_hours,
        predicted_pressure: step.mean,
        lower_bound: step.lower,
        upper_bound: step.upper,
        forecast_time: last_time + TimeDelta::hours(i64::from(horizon_hours)),
        risk_level: classify_risk(Some(step.mean)),
        model: model.name(),
        observations: values.len(),
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
