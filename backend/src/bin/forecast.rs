//! ER pressure forecasting runner.
//!
//! # Usage
//!
//! ```bash
//! # One forecasting run against the in-memory store (default)
//! cargo run --bin er-forecast -- run
//!
//! # Periodic runs against PostgreSQL until Ctrl-C
//! DATABASE_URL=postgres://er:er@localhost/er_pressure \
//!   cargo run --bin er-forecast --features postgres-repo -- schedule
//!
//! # Ingest a JSON array of rows, reconcile them, then forecast
//! cargo run --bin er-forecast -- ingest rows.json
//!
//! # MAE / RMSE of evaluated forecasts, optionally for one horizon
//! cargo run --bin er-forecast -- accuracy 1
//! ```
//!
//! # Environment Variables
//!
//! - `REPOSITORY_TYPE`, `DATABASE_URL`, `PG_*`: storage selection
//! - `FORECAST_*`: overrides for `forecasting.toml`
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use er_pressure::db::{self, RepositoryFactory};
use er_pressure::forecasting::ForecastConfig;
use er_pressure::models::IngestionRow;
use er_pressure::services::{ForecastScheduler, RunTracker, RunTrigger};

enum Command {
    Run,
    Schedule,
    Ingest(PathBuf),
    Accuracy(Option<i32>),
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let command = match args.next().as_deref() {
            None | Some("run") => Command::Run,
            Some("schedule") => Command::Schedule,
            Some("ingest") => {
                let path = args.next().context("usage: er-forecast ingest <rows.json>")?;
                Command::Ingest(PathBuf::from(path))
            }
            Some("accuracy") => {
                let horizon = args
                    .next()
                    .map(|h| h.parse::<i32>())
                    .transpose()
                    .context("horizon must be an integer number of hours")?;
                Command::Accuracy(horizon)
            }
            Some(other) => bail!(
                "unknown command '{}' (expected run, schedule, ingest or accuracy)",
                other
            ),
        };
        if let Some(extra) = args.next() {
            bail!("unexpected argument '{}'", extra);
        }
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let command = Command::parse(env::args().skip(1))?;
    let config = ForecastConfig::load().context("Failed to load forecasting configuration")?;
    let repo = RepositoryFactory::from_default_config()
        .await
        .context("Failed to initialize repository")?;
    if !db::health_check(repo.as_ref()).await? {
        warn!("Repository reports itself unhealthy");
    }

    let scheduler = ForecastScheduler::new(repo.clone(), config, RunTracker::new());

    match command {
        Command::Run => run_once(&scheduler, RunTrigger::Manual).await,
        Command::Schedule => {
            let handle = scheduler.start();
            info!("Press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Stopping scheduler");
            handle.stop().await;
            Ok(())
        }
        Command::Ingest(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let rows: Vec<IngestionRow> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;

            let summary = db::ingest_and_evaluate(repo.clone(), &rows).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            run_once(&scheduler, RunTrigger::Ingestion).await
        }
        Command::Accuracy(horizon) => {
            match db::forecast_accuracy(repo.as_ref(), None, horizon).await? {
                Some(accuracy) => println!("{}", serde_json::to_string_pretty(&accuracy)?),
                None => println!("No evaluated forecasts yet"),
            }
            Ok(())
        }
    }
}

async fn run_once(scheduler: &ForecastScheduler, trigger: RunTrigger) -> anyhow::Result<()> {
    let Some((run_id, result)) = scheduler.trigger(trigger).await else {
        bail!("a forecasting run is already in progress");
    };
    let report = result.with_context(|| format!("Forecasting run {} failed", run_id))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
