//! Repository selection and construction.
//!
//! The backend is picked from `REPOSITORY_TYPE`, from the presence of a
//! database URL, or from a `repository.toml` file. Callers receive an
//! `Arc<dyn FullRepository>` and pass it explicitly to the pipeline,
//! evaluator and scheduler.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::repo_config::RepositoryConfig;
use super::repositories::LocalRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;

/// Storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RepositoryType {
    Postgres,
    /// In-memory, lost on exit.
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Case-insensitive: `postgres`/`pg` or `local`/`memory`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" | "memory" => Ok(Self::Local),
            other => Err(format!("Unknown repository type: {}", other)),
        }
    }
}

impl TryFrom<String> for RepositoryType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl RepositoryType {
    /// `REPOSITORY_TYPE` wins; otherwise a `DATABASE_URL` or
    /// `PG_DATABASE_URL` selects Postgres. An unparseable value falls back
    /// to Local with a warning.
    pub fn from_env() -> Self {
        match std::env::var("REPOSITORY_TYPE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                log::warn!("{}; falling back to the local repository", e);
                Self::Local
            }),
            Err(_) if has_database_url_env() => Self::Postgres,
            Err(_) => Self::Local,
        }
    }
}

fn has_database_url_env() -> bool {
    ["DATABASE_URL", "PG_DATABASE_URL"]
        .iter()
        .any(|key| std::env::var(key).is_ok())
}

/// A fully resolved backend choice.
#[derive(Debug, Clone)]
pub enum Backend {
    Local,
    Postgres(PostgresConfig),
}

impl Backend {
    pub fn kind(&self) -> RepositoryType {
        match self {
            Backend::Local => RepositoryType::Local,
            Backend::Postgres(_) => RepositoryType::Postgres,
        }
    }

    pub fn from_env() -> RepositoryResult<Self> {
        match RepositoryType::from_env() {
            RepositoryType::Local => Ok(Backend::Local),
            RepositoryType::Postgres => postgres_config_from_env().map(Backend::Postgres),
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> RepositoryResult<Self> {
        match config.to_postgres_config()? {
            Some(pg) => Ok(Backend::Postgres(pg)),
            None => Ok(Backend::Local),
        }
    }

    pub fn from_config_file(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        Self::from_config(&RepositoryConfig::from_file(path)?)
    }

    /// Open the backend. Postgres runs pending migrations first.
    pub async fn connect(self) -> RepositoryResult<Arc<dyn FullRepository>> {
        match self {
            Backend::Local => Ok(RepositoryFactory::create_local()),
            Backend::Postgres(config) => connect_postgres(config).await,
        }
    }
}

#[cfg(feature = "postgres-repo")]
async fn connect_postgres(config: PostgresConfig) -> RepositoryResult<Arc<dyn FullRepository>> {
    let (pool_max, pool_min) = (config.pool_max, config.pool_min);
    let repo = tokio::task::spawn_blocking(move || {
        super::repositories::PostgresRepository::new(config)
    })
    .await
    .map_err(|e| RepositoryError::internal(format!("connect task failed: {}", e)))??;
    log::info!("Connected to Postgres (pool max {}, min {})", pool_max, pool_min);
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "postgres-repo"))]
async fn connect_postgres(_config: PostgresConfig) -> RepositoryResult<Arc<dyn FullRepository>> {
    Err(postgres_disabled())
}

#[cfg(feature = "postgres-repo")]
fn postgres_config_from_env() -> RepositoryResult<PostgresConfig> {
    PostgresConfig::from_env().map_err(RepositoryError::configuration)
}

#[cfg(not(feature = "postgres-repo"))]
fn postgres_config_from_env() -> RepositoryResult<PostgresConfig> {
    Err(postgres_disabled())
}

#[cfg(not(feature = "postgres-repo"))]
fn postgres_disabled() -> RepositoryError {
    RepositoryError::configuration("Postgres repository feature not enabled")
}

/// Entry points for opening a repository.
///
/// ```ignore
/// let repo = RepositoryFactory::from_default_config().await?;
/// assert!(repo.health_check().await?);
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn create_local() -> Arc<dyn FullRepository> {
        log::info!("Using in-memory local repository");
        Arc::new(LocalRepository::new())
    }

    /// See [`RepositoryType::from_env`] and [`PostgresConfig::from_env`].
    pub async fn from_env() -> RepositoryResult<Arc<dyn FullRepository>> {
        Backend::from_env()?.connect().await
    }

    pub async fn from_config_file(
        path: impl AsRef<Path>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        Backend::from_config_file(path)?.connect().await
    }

    /// `repository.toml` from a standard location when present, the
    /// environment otherwise.
    pub async fn from_default_config() -> RepositoryResult<Arc<dyn FullRepository>> {
        let backend = match RepositoryConfig::from_default_location() {
            Ok(config) => Backend::from_config(&config)?,
            Err(e) => {
                log::debug!("{}; using environment configuration", e);
                Backend::from_env()?
            }
        };
        backend.connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_type_aliases() {
        assert_eq!(RepositoryType::from_str(" Memory ").unwrap(), RepositoryType::Local);
        assert_eq!(RepositoryType::from_str("Pg").unwrap(), RepositoryType::Postgres);
        assert!(RepositoryType::from_str("sqlite").is_err());
    }

    #[tokio::test]
    async fn test_local_backend_connects() {
        let repo = Backend::Local.connect().await.unwrap();
        assert!(repo.health_check().await.unwrap());
        assert!(repo.list_hospitals().await.unwrap().is_empty());
    }

    #[test]
    fn test_local_config_resolves_to_local_backend() {
        let config: RepositoryConfig = toml::from_str("[repository]\ntype = \"memory\"\n").unwrap();
        let backend = Backend::from_config(&config).unwrap();
        assert_eq!(backend.kind(), RepositoryType::Local);
    }
}
