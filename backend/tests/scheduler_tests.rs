//! Scheduler lifecycle and single-flight behaviour.

mod support;

use std::sync::Arc;
use std::time::Duration;

use er_pressure::algorithms::{ModelResult, NaiveLastValue, PointForecast, TimeSeriesModel};
use er_pressure::db::{ForecastRepository, FullRepository, LocalRepository, SnapshotRepository};
use er_pressure::forecasting::{ForecastConfig, PerEntityForecaster};
use er_pressure::services::{
    ForecastPipeline, ForecastScheduler, RunStatus, RunTracker, RunTrigger,
};
use support::{hourly_rows, wavy};

/// Naive model that takes a while to fit.
struct SlowNaive(NaiveLastValue);

impl TimeSeriesModel for SlowNaive {
    fn name(&self) -> String {
        "slow naive".to_string()
    }

    fn fit(&mut self, series: &[f64]) -> ModelResult<()> {
        std::thread::sleep(Duration::from_millis(100));
        self.0.fit(series)
    }

    fn forecast(&self, steps: usize) -> ModelResult<Vec<PointForecast>> {
        self.0.forecast(steps)
    }
}

async fn seeded_repo() -> Arc<dyn FullRepository> {
    let repo = LocalRepository::new();
    repo.ingest_snapshots(&hourly_rows("1001", 0, &wavy(12)))
        .await
        .unwrap();
    Arc::new(repo)
}

fn slow_scheduler(repo: Arc<dyn FullRepository>, interval: Duration) -> ForecastScheduler {
    let config = ForecastConfig::default();
    let forecaster = PerEntityForecaster::from_config(&config).with_model_factory(Arc::new(|| {
        Box::new(SlowNaive(NaiveLastValue::default())) as Box<dyn TimeSeriesModel>
    }));
    let pipeline = ForecastPipeline::new(repo, config).with_forecaster(forecaster);
    ForecastScheduler::with_pipeline(pipeline, RunTracker::new(), interval)
}

#[tokio::test]
async fn test_concurrent_triggers_run_once() {
    let repo = seeded_repo().await;
    let scheduler = slow_scheduler(repo.clone(), Duration::from_secs(3600));

    let (a, b) = tokio::join!(
        scheduler.trigger(RunTrigger::Manual),
        scheduler.trigger(RunTrigger::Manual)
    );
    assert!(a.is_some());
    assert!(b.is_none());

    let runs = scheduler.tracker().list_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].result.as_ref().unwrap()["stored"], 1);
    assert_eq!(repo.list_forecasts(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_scheduler_ticks_until_stopped() {
    let repo = seeded_repo().await;
    let scheduler = slow_scheduler(repo.clone(), Duration::from_millis(50));
    let handle = scheduler.start();

    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.stop().await;

    let runs = scheduler.tracker().list_runs();
    assert!(!runs.is_empty());
    assert!(runs.iter().all(|r| r.trigger == RunTrigger::Schedule));
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
    assert!(!scheduler.is_running());

    // Nothing runs after stop.
    let count = repo.list_forecasts(None).await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(repo.list_forecasts(None).await.unwrap().len(), count);
    assert_eq!(count, runs.len());
}
