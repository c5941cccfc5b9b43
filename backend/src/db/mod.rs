//! Storage for facilities, snapshots, forecasts and forecast errors.
//!
//! Storage goes through the repository traits in [`repository`], so the
//! forecasting code never sees which backend it talks to:
//!
//! - `repositories::local`: in-memory implementation (default feature)
//! - `repositories::postgres`: Postgres implementation with Diesel ORM
//!   (`postgres-repo` feature)
//! - `factory`: picks and builds a backend from the environment or
//!   `repository.toml`
//! - `services`: backend-independent operations built on the traits
//!
//! There is no process-wide repository. Build one with
//! [`RepositoryFactory`] and hand the `Arc<dyn FullRepository>` to whatever
//! needs it:
//!
//! ```ignore
//! use er_pressure::db::{services, RepositoryFactory};
//!
//! let repo = RepositoryFactory::from_default_config().await?;
//! let latest = services::latest_forecasts(repo.as_ref(), 1).await?;
//! ```

// When both backend features are enabled, the factory can build either.
#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;
pub mod services;

#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::{PostgresConfig, RetryPolicy};
/// Placeholder so configuration code compiles without the Postgres backend.
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use services::{
    forecast_accuracy, health_check, ingest, ingest_and_evaluate, latest_forecasts,
    store_forecasts, IngestionSummary,
};

pub use factory::{Backend, RepositoryFactory, RepositoryType};
pub use repo_config::RepositoryConfig;
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    ErrorContext, ForecastRepository, FullRepository, HospitalRepository, RepositoryError,
    RepositoryResult, SnapshotRepository,
};
