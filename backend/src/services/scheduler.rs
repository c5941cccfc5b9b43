//! Periodic forecasting.
//!
//! The scheduler owns a [`ForecastPipeline`] and a [`RunTracker`]. Runs are
//! single-flight: a tick or trigger arriving while a run is active is
//! skipped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::pipeline::{ForecastPipeline, PipelineError, PipelineReport};
use super::run_tracker::{RunTracker, RunTrigger};
use crate::db::repository::FullRepository;
use crate::forecasting::ForecastConfig;

#[derive(Clone)]
pub struct ForecastScheduler {
    pipeline: ForecastPipeline,
    tracker: RunTracker,
    interval: Duration,
    active: Arc<Mutex<()>>,
}

/// Handle to a started scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for it and any in-flight run.
    pub async fn stop(self) {
        // The loop may already have exited; a closed channel is fine.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::error!("Forecast scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ForecastScheduler {
    pub fn new(repo: Arc<dyn FullRepository>, config: ForecastConfig, tracker: RunTracker) -> Self {
        let interval = config.schedule_interval();
        Self::with_pipeline(ForecastPipeline::new(repo, config), tracker, interval)
    }

    pub fn with_pipeline(pipeline: ForecastPipeline, tracker: RunTracker, interval: Duration) -> Self {
        Self {
            pipeline,
            tracker,
            interval,
            active: Arc::new(Mutex::new(())),
        }
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Run one batch now.
    ///
    /// Returns `None` without running when another run is active.
    pub async fn trigger(
        &self,
        trigger: RunTrigger,
    ) -> Option<(Uuid, Result<PipelineReport, PipelineError>)> {
        let Ok(_guard) = self.active.try_lock() else {
            log::warn!("Forecasting run already in progress; skipping {:?} trigger", trigger);
            return None;
        };
        Some(self.pipeline.run_tracked(&self.tracker, trigger).await)
    }

    /// Spawn the timer loop. The first tick fires immediately.
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut runs = JoinSet::new();
            log::info!("Forecast scheduler started (every {:?})", scheduler.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduler = scheduler.clone();
                        runs.spawn(async move {
                            scheduler.trigger(RunTrigger::Schedule).await;
                        });
                    }
                    Some(joined) = runs.join_next(), if !runs.is_empty() => {
                        if let Err(e) = joined {
                            log::error!("Scheduled forecasting run panicked: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            while let Some(joined) = runs.join_next().await {
                if let Err(e) = joined {
                    log::error!("Scheduled forecasting run panicked: {}", e);
                }
            }
            log::info!("Forecast scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}
