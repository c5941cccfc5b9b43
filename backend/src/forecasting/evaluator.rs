//! Reconciliation of stored forecasts against observed snapshots.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::repository::{FullRepository, RepositoryResult};
use crate::features::pressure_score;
use crate::models::{ForecastError, ForecastId, NewForecastError, Snapshot};

/// What happened to one observed snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No forecast for the facility targets a time at or before the snapshot.
    NoPriorForecast,
    /// One outcome per horizon that has such a forecast, ordered by horizon.
    Reconciled(Vec<HorizonEvaluation>),
}

/// Outcome for the latest forecast of one horizon.
#[derive(Debug, Clone, PartialEq)]
pub enum HorizonEvaluation {
    Recorded {
        horizon_hours: i32,
        error: ForecastError,
    },
    /// The forecast already has an error row.
    AlreadyEvaluated {
        horizon_hours: i32,
        forecast_id: ForecastId,
    },
}

impl HorizonEvaluation {
    pub fn horizon_hours(&self) -> i32 {
        match self {
            HorizonEvaluation::Recorded { horizon_hours, .. }
            | HorizonEvaluation::AlreadyEvaluated { horizon_hours, .. } => *horizon_hours,
        }
    }
}

/// Per-horizon counts inside an [`EvaluationSummary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HorizonCounts {
    pub evaluated: usize,
    pub already_evaluated: usize,
}

/// Counts from [`ForecastErrorEvaluator::evaluate_batch`].
///
/// `evaluated` and `already_evaluated` count forecasts, summed over
/// horizons; `missed` counts snapshots with no prior forecast at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub missed: usize,
    pub already_evaluated: usize,
    pub by_horizon: BTreeMap<i32, HorizonCounts>,
}

impl EvaluationSummary {
    fn record(&mut self, evaluation: &Evaluation) {
        let Evaluation::Reconciled(horizons) = evaluation else {
            self.missed += 1;
            return;
        };
        for outcome in horizons {
            let counts = self.by_horizon.entry(outcome.horizon_hours()).or_default();
            match outcome {
                HorizonEvaluation::Recorded { .. } => {
                    self.evaluated += 1;
                    counts.evaluated += 1;
                }
                HorizonEvaluation::AlreadyEvaluated { .. } => {
                    self.already_evaluated += 1;
                    counts.already_evaluated += 1;
                }
            }
        }
    }
}

/// Compares each observed snapshot with the most recent forecast of every
/// horizon made for its facility and records the error once per forecast.
#[derive(Clone)]
pub struct ForecastErrorEvaluator {
    repo: Arc<dyn FullRepository>,
}

impl ForecastErrorEvaluator {
    pub fn new(repo: Arc<dyn FullRepository>) -> Self {
        Self { repo }
    }

    pub async fn evaluate(&self, snapshot: &Snapshot) -> RepositoryResult<Evaluation> {
        let forecasts = self
            .repo
            .latest_forecasts_before(snapshot.hospital_id, snapshot.snapshot_time)
            .await?;
        if forecasts.is_empty() {
            log::debug!(
                "No forecast for hospital {} before {}",
                snapshot.hospital_id,
                snapshot.snapshot_time
            );
            return Ok(Evaluation::NoPriorForecast);
        }

        let observed = pressure_score(&snapshot.occupancy);
        let mut outcomes = Vec::with_capacity(forecasts.len());
        for forecast in &forecasts {
            let error = NewForecastError::compare(forecast, observed);
            let outcome = match self.repo.insert_forecast_error(&error).await? {
                Some(stored) => {
                    log::debug!(
                        "Forecast {} (+{}h) for hospital {}: predicted {:.3}, observed {:.3}",
                        forecast.id,
                        forecast.horizon_hours,
                        forecast.hospital_id,
                        forecast.predicted_pressure,
                        observed
                    );
                    HorizonEvaluation::Recorded {
                        horizon_hours: forecast.horizon_hours,
                        error: stored,
                    }
                }
                None => HorizonEvaluation::AlreadyEvaluated {
                    horizon_hours: forecast.horizon_hours,
                    forecast_id: forecast.id,
                },
            };
            outcomes.push(outcome);
        }
        Ok(Evaluation::Reconciled(outcomes))
    }

    /// Evaluate snapshots in time order. Stops at the first repository error.
    pub async fn evaluate_batch(&self, snapshots: &[Snapshot]) -> RepositoryResult<EvaluationSummary> {
        let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
        ordered.sort_by_key(|s| (s.snapshot_time, s.id));

        let mut summary = EvaluationSummary::default();
        for snapshot in ordered {
            summary.record(&self.evaluate(snapshot).await?);
        }

        log::info!(
            "Evaluated {} snapshots: {} forecasts recorded over {} horizons, {} snapshots without forecast, {} already evaluated",
            snapshots.len(),
            summary.evaluated,
            summary.by_horizon.len(),
            summary.missed,
            summary.already_evaluated
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{ForecastRepository, SnapshotRepository};
    use crate::db::LocalRepository;
    use crate::models::{HospitalId, IngestionRow, NewForecast, NewHospital, Occupancy, RiskLevel};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use qtty::Hours;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    /// Every ratio at 0.6, so the pressure score is 0.6.
    fn occupancy_at_0_6() -> Occupancy {
        Occupancy {
            functional_stretchers: 10,
            occupied_stretchers: 6,
            patients_total: 10,
            patients_waiting_mc: 6,
            patients_over_24h: 6,
            patients_over_48h: 6,
            avg_stay_stretcher: Hours::new(20.0),
            avg_stay_ambulatory: Hours::new(4.0),
        }
    }

    async fn seeded() -> (LocalRepository, Vec<Snapshot>) {
        let repo = LocalRepository::new();
        let rows: Vec<IngestionRow> = (0..2)
            .map(|h| IngestionRow {
                hospital: NewHospital::new("P-1", "North"),
                occupancy: occupancy_at_0_6(),
                snapshot_time: t0() + Duration::hours(h),
                updated_at: t0() + Duration::hours(h),
            })
            .collect();
        let snapshots = repo.ingest_snapshots(&rows).await.unwrap();
        (repo, snapshots)
    }

    fn forecast_at(hour: i64, pressure: f64) -> NewForecast {
        forecast_for(1, hour, pressure)
    }

    fn forecast_for(horizon_hours: i32, hour: i64, pressure: f64) -> NewForecast {
        NewForecast {
            hospital_id: HospitalId(1),
            horizon_hours,
            predicted_pressure: pressure,
            lower_bound: None,
            upper_bound: None,
            forecast_time: t0() + Duration::hours(hour),
            risk_level: RiskLevel::Medium,
        }
    }

    #[tokio::test]
    async fn test_records_absolute_and_squared_error() {
        let (repo, snapshots) = seeded().await;
        assert!((pressure_score(&snapshots[0].occupancy) - 0.6).abs() < 1e-9);
        repo.insert_forecasts(&[forecast_at(0, 0.5)]).await.unwrap();

        let evaluator = ForecastErrorEvaluator::new(Arc::new(repo.clone()));
        let Evaluation::Reconciled(outcomes) = evaluator.evaluate(&snapshots[0]).await.unwrap()
        else {
            panic!("expected a reconciled snapshot");
        };
        let [HorizonEvaluation::Recorded { horizon_hours: 1, error: err }] = outcomes.as_slice()
        else {
            panic!("expected one recorded error, got {:?}", outcomes);
        };
        assert!((err.absolute_error - 0.1).abs() < 1e-9);
        assert!((err.squared_error - 0.01).abs() < 1e-9);
        assert_eq!(err.predicted_pressure, 0.5);
    }

    #[tokio::test]
    async fn test_missing_forecast_is_not_an_error() {
        let (repo, snapshots) = seeded().await;
        repo.insert_forecasts(&[forecast_at(5, 0.5)]).await.unwrap();

        let evaluator = ForecastErrorEvaluator::new(Arc::new(repo.clone()));
        assert_eq!(
            evaluator.evaluate(&snapshots[0]).await.unwrap(),
            Evaluation::NoPriorForecast
        );
        assert_eq!(repo.forecast_error_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_evaluates_each_forecast_once() {
        let (repo, snapshots) = seeded().await;
        repo.insert_forecasts(&[forecast_at(0, 0.5)]).await.unwrap();

        let evaluator = ForecastErrorEvaluator::new(Arc::new(repo.clone()));
        // Both snapshots resolve to the same forecast; only the earlier one
        // records an error.
        let summary = evaluator.evaluate_batch(&snapshots).await.unwrap();
        assert_eq!(
            summary,
            EvaluationSummary {
                evaluated: 1,
                missed: 0,
                already_evaluated: 1,
                by_horizon: BTreeMap::from([(
                    1,
                    HorizonCounts {
                        evaluated: 1,
                        already_evaluated: 1
                    }
                )]),
            }
        );
        let errors = repo.list_forecast_errors(None, None).await.unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_each_horizon_is_reconciled_separately() {
        let (repo, snapshots) = seeded().await;
        // The +3h forecast targets an hour earlier than the +1h one; both
        // precede the snapshot and each is evaluated.
        repo.insert_forecasts(&[forecast_for(3, -1, 0.4), forecast_for(1, 0, 0.5)])
            .await
            .unwrap();

        let evaluator = ForecastErrorEvaluator::new(Arc::new(repo.clone()));
        let summary = evaluator.evaluate_batch(&snapshots[..1]).await.unwrap();
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.by_horizon[&1].evaluated, 1);
        assert_eq!(summary.by_horizon[&3].evaluated, 1);

        let three = repo.list_forecast_errors(None, Some(3)).await.unwrap();
        assert_eq!(three.len(), 1);
        assert!((three[0].absolute_error - 0.2).abs() < 1e-9);
    }
}
