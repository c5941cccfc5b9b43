//! Orchestration on top of the storage and forecasting layers.
//!
//! - [`pipeline`]: one forecasting run over every configured horizon
//! - [`scheduler`]: periodic, single-flight runs
//! - [`run_tracker`]: in-memory run status and logs

pub mod pipeline;
pub mod run_tracker;
pub mod scheduler;

pub use pipeline::{run_forecasting, ForecastPipeline, PipelineError, PipelineReport};
pub use run_tracker::{LogEntry, LogLevel, Run, RunStatus, RunTracker, RunTrigger, DEFAULT_MAX_RUNS};
pub use scheduler::{ForecastScheduler, SchedulerHandle};
