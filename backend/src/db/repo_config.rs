//! `repository.toml` support.
//!
//! ```toml
//! [repository]
//! type = "postgres"
//!
//! [postgres]
//! database_url = "postgres://er:er@localhost:5432/er_pressure"
//! pool_max = 10
//! ```
//!
//! An empty `database_url` falls back to `DATABASE_URL` / `PG_DATABASE_URL`.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::factory::RepositoryType;
use super::repository::{ErrorContext, RepositoryError};
use crate::db::PostgresConfig;

const SEARCH_PATHS: [&str; 3] = ["repository.toml", "backend/repository.toml", "../repository.toml"];

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub repository: RepositorySection,
    #[serde(default)]
    pub postgres: PostgresSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySection {
    #[serde(rename = "type")]
    pub kind: RepositoryType,
}

/// `[postgres]`; every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresSection {
    pub database_url: String,
    pub pool_max: u32,
    pub pool_min: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PostgresSection {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            pool_max: 10,
            pool_min: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl PostgresSection {
    fn database_url(&self) -> Option<String> {
        let configured = self.database_url.trim();
        if !configured.is_empty() {
            return Some(configured.to_string());
        }
        std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .ok()
    }
}

impl RepositoryConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let fail = |what: &str, e: &dyn std::fmt::Display| {
            RepositoryError::configuration_with_context(
                format!("Failed to {} config file: {}", what, e),
                ErrorContext::new("load_repository_config").with_details(path.display().to_string()),
            )
        };

        let content = fs::read_to_string(path).map_err(|e| fail("read", &e))?;
        toml::from_str(&content).map_err(|e| fail("parse", &e))
    }

    /// First existing file among `repository.toml`, `backend/repository.toml`
    /// and `../repository.toml`.
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        let path = SEARCH_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or_else(|| {
                RepositoryError::configuration("No repository.toml found in standard locations")
            })?;
        log::info!("Loading repository configuration from {}", path.display());
        Self::from_file(&path)
    }

    pub fn repository_type(&self) -> RepositoryType {
        self.repository.kind
    }

    /// `Ok(None)` for the local backend.
    #[cfg(feature = "postgres-repo")]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        use crate::db::RetryPolicy;
        use std::time::Duration;

        if self.repository.kind != RepositoryType::Postgres {
            return Ok(None);
        }
        let pg = &self.postgres;
        let database_url = pg.database_url().ok_or_else(|| {
            RepositoryError::configuration(
                "Postgres repository requires 'postgres.database_url' or DATABASE_URL",
            )
        })?;

        Ok(Some(PostgresConfig {
            database_url,
            pool_max: pg.pool_max,
            pool_min: pg.pool_min,
            connect_timeout: Duration::from_secs(pg.connect_timeout_secs),
            idle_timeout: Duration::from_secs(pg.idle_timeout_secs),
            retry: RetryPolicy {
                max_retries: pg.max_retries,
                initial_delay: Duration::from_millis(pg.retry_delay_ms),
            },
        }))
    }

    #[cfg(not(feature = "postgres-repo"))]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        match self.repository.kind {
            RepositoryType::Postgres => Err(RepositoryError::configuration(
                "Postgres repository feature not enabled",
            )),
            RepositoryType::Local => Ok(None),
        }
    }
}
