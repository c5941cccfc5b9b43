//! Batch forecasting run.
//!
//! ```text
//! list_snapshots ─► build_features ─┬─► (fit_on = observations) ──────────┐
//!                                   └─► assemble_dataset(H) ─► (training) ┤
//!                                                                         ▼
//!                       store_forecasts ◄── risk tier ◄── PerEntityForecaster(H)
//! ```
//!
//! One batch runs per configured horizon. The successful forecasts of every
//! horizon are written together in one atomic insert at the end of the run;
//! facility failures stay in the batch report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::run_tracker::{LogLevel, RunTracker, RunTrigger};
use crate::db::repository::{FullRepository, RepositoryError};
use crate::db::services::store_forecasts;
use crate::features::{assemble_dataset, build_features, FeatureRow};
use crate::forecasting::{BatchReport, ConfigError, FitSeries, ForecastConfig, PerEntityForecaster};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage failure: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Outcome of one forecasting run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshots: usize,
    pub hospitals: usize,
    /// One report per horizon, in configuration order.
    pub batches: Vec<BatchReport>,
    /// Forecast rows written across all horizons.
    pub stored: usize,
}

impl PipelineReport {
    pub fn forecasted_count(&self) -> usize {
        self.batches.iter().map(BatchReport::forecasted_count).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.batches.iter().map(BatchReport::skipped_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.batches.iter().map(BatchReport::failed_count).sum()
    }

    /// Compact JSON summary for run tracking.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshots": self.snapshots,
            "hospitals": self.hospitals,
            "horizons": self.batches.iter().map(|b| b.horizon_hours).collect::<Vec<_>>(),
            "forecasted": self.forecasted_count(),
            "skipped": self.skipped_count(),
            "failed": self.failed_count(),
            "stored": self.stored,
        })
    }
}

/// Forecasting pipeline over an explicit repository handle.
#[derive(Clone)]
pub struct ForecastPipeline {
    repo: Arc<dyn FullRepository>,
    config: ForecastConfig,
    forecaster: PerEntityForecaster,
}

impl ForecastPipeline {
    pub fn new(repo: Arc<dyn FullRepository>, config: ForecastConfig) -> Self {
        let forecaster = PerEntityForecaster::from_config(&config);
        Self {
            repo,
            config,
            forecaster,
        }
    }

    /// Replace the forecaster built from the configuration.
    pub fn with_forecaster(mut self, forecaster: PerEntityForecaster) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn FullRepository> {
        &self.repo
    }

    /// Forecast every configured horizon, then store all candidates at once.
    /// A storage failure leaves no rows from this run.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        self.config.validate()?;
        let started_at = Utc::now();

        let snapshots = self.repo.list_snapshots().await?;
        let features = build_features(&snapshots);
        let hospitals = features
            .iter()
            .map(|f| f.hospital_id)
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        log::info!(
            "Forecasting run: {} snapshots from {} hospitals, horizons {:?}",
            snapshots.len(),
            hospitals,
            self.config.horizons
        );

        let mut batches = Vec::with_capacity(self.config.horizons.len());
        for &horizon in &self.config.horizons {
            let batch = self.forecast_horizon(&features, horizon).await;
            log::info!(
                "Horizon {}h: {} forecasted, {} skipped, {} failed",
                horizon,
                batch.forecasted_count(),
                batch.skipped_count(),
                batch.failed_count()
            );
            batches.push(batch);
        }

        let candidates: Vec<_> = batches.iter().flat_map(BatchReport::forecasts).collect();
        let stored = store_forecasts(self.repo.as_ref(), &candidates).await?.len();

        Ok(PipelineReport {
            started_at,
            finished_at: Utc::now(),
            snapshots: snapshots.len(),
            hospitals,
            batches,
            stored,
        })
    }

    async fn forecast_horizon(&self, features: &[FeatureRow], horizon: u32) -> BatchReport {
        match self.config.fit_on {
            FitSeries::Observations => self.forecaster.forecast(features, horizon).await,
            FitSeries::TrainingRows => {
                let dataset = assemble_dataset(features, horizon);
                self.forecaster.forecast(&dataset, horizon).await
            }
        }
    }

    /// Run and record the outcome in `tracker`.
    ///
    /// Returns the run id together with the result.
    pub async fn run_tracked(
        &self,
        tracker: &RunTracker,
        trigger: RunTrigger,
    ) -> (Uuid, Result<PipelineReport, PipelineError>) {
        let run_id = tracker.start_run(trigger);
        tracker.log(
            run_id,
            LogLevel::Info,
            format!("Forecasting horizons {:?}", self.config.horizons),
        );

        let result = self.run().await;
        match &result {
            Ok(report) => {
                for batch in &report.batches {
                    let level = if batch.failed_count() > 0 {
                        LogLevel::Warning
                    } else {
                        LogLevel::Success
                    };
                    tracker.log(
                        run_id,
                        level,
                        format!(
                            "Horizon {}h: {} forecasted, {} skipped, {} failed",
                            batch.horizon_hours,
                            batch.forecasted_count(),
                            batch.skipped_count(),
                            batch.failed_count()
                        ),
                    );
                }
                tracker.complete_run(run_id, Some(report.summary()));
            }
            Err(e) => {
                log::error!("Forecasting run {} failed: {}", run_id, e);
                tracker.fail_run(run_id, e.to_string());
            }
        }
        (run_id, result)
    }
}

/// Run one forecasting batch per configured horizon.
pub async fn run_forecasting(
    repo: Arc<dyn FullRepository>,
    config: &ForecastConfig,
) -> Result<PipelineReport, PipelineError> {
    ForecastPipeline::new(repo, config.clone()).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::ModelSpec;
    use crate::db::repository::{ForecastRepository, SnapshotRepository};
    use crate::db::LocalRepository;
    use crate::forecasting::EntityOutcome;
    use crate::models::{IngestionRow, NewHospital, Occupancy};
    use crate::services::run_tracker::RunStatus;
    use chrono::{Duration, TimeZone};
    use qtty::Hours;

    fn rows(permit: &str, count: i64) -> Vec<IngestionRow> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| IngestionRow {
                hospital: NewHospital::new(permit, format!("Hospital {}", permit)),
                occupancy: Occupancy {
                    functional_stretchers: 30,
                    occupied_stretchers: 10 + (i as i32 % 5),
                    patients_total: 40,
                    patients_waiting_mc: 8,
                    patients_over_24h: 3,
                    patients_over_48h: 1,
                    avg_stay_stretcher: Hours::new(12.0),
                    avg_stay_ambulatory: Hours::new(3.5),
                },
                snapshot_time: t0 + Duration::hours(i),
                updated_at: t0 + Duration::hours(i),
            })
            .collect()
    }

    fn naive_config(horizons: Vec<u32>) -> ForecastConfig {
        ForecastConfig {
            horizons,
            model: ModelSpec::Naive,
            workers: Some(2),
            ..ForecastConfig::default()
        }
    }

    #[tokio::test]
    async fn test_run_stores_one_forecast_per_eligible_hospital_and_horizon() {
        let repo = LocalRepository::new();
        let mut all = rows("A", 12);
        all.extend(rows("B", 3));
        repo.ingest_snapshots(&all).await.unwrap();

        let report = run_forecasting(Arc::new(repo.clone()), &naive_config(vec![1, 4]))
            .await
            .unwrap();

        assert_eq!(report.snapshots, 15);
        assert_eq!(report.hospitals, 2);
        assert_eq!(report.batches.len(), 2);
        assert_eq!(report.stored, 2);
        assert_eq!(report.skipped_count(), 2);
        assert!(matches!(
            report.batches[0].outcomes.values().nth(1),
            Some(EntityOutcome::Skipped { rows: 3, required: 10 })
        ));

        let stored = repo.list_forecasts(None).await.unwrap();
        let horizons: Vec<i32> = stored.iter().map(|f| f.horizon_hours).collect();
        assert_eq!(horizons, vec![1, 4]);
    }

    #[tokio::test]
    async fn test_store_failure_on_one_horizon_stores_no_horizon() {
        let repo = LocalRepository::new();
        repo.ingest_snapshots(&rows("A", 12)).await.unwrap();

        // The second horizon forecasts fine but does not fit the store's
        // horizon column, so the single insert is rejected as a whole.
        let err = run_forecasting(
            Arc::new(repo.clone()),
            &naive_config(vec![1, 2_200_000_000]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Repository(ref e) if e.is_validation()));
        assert_eq!(repo.forecast_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_reading() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        let err = run_forecasting(Arc::new(repo), &naive_config(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn test_tracked_run_records_failure() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        let tracker = RunTracker::new();
        let pipeline = ForecastPipeline::new(Arc::new(repo), naive_config(vec![1]));

        let (run_id, result) = pipeline.run_tracked(&tracker, RunTrigger::Manual).await;
        assert!(matches!(result, Err(PipelineError::Repository(_))));
        let run = tracker.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }
}
