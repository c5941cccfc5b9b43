//! Connection settings, pool construction and the retrying blocking executor.

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use std::str::FromStr;
use std::time::Duration;
use tokio::task;

use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

pub(super) type PgPool = Pool<ConnectionManager<PgConnection>>;

/// How transient failures are retried: `max_retries` extra attempts,
/// sleeping `initial_delay` before the first and doubling after each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
        }
    }
}

/// Settings for the Postgres backend.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub pool_max: u32,
    pub pool_min: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            pool_max: 10,
            pool_min: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl PostgresConfig {
    /// Read `DATABASE_URL` (or `PG_DATABASE_URL`) plus the optional
    /// `PG_POOL_MAX`, `PG_POOL_MIN`, `PG_CONN_TIMEOUT_SEC`,
    /// `PG_IDLE_TIMEOUT_SEC`, `PG_MAX_RETRIES` and `PG_RETRY_DELAY_MS`.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let mut config = Self::with_url(database_url);
        if let Some(v) = env_parse("PG_POOL_MAX") {
            config.pool_max = v;
        }
        if let Some(v) = env_parse("PG_POOL_MIN") {
            config.pool_min = v;
        }
        if let Some(secs) = env_parse("PG_CONN_TIMEOUT_SEC") {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("PG_IDLE_TIMEOUT_SEC") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = env_parse("PG_MAX_RETRIES") {
            config.retry.max_retries = v;
        }
        if let Some(ms) = env_parse("PG_RETRY_DELAY_MS") {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    pub(super) fn build_pool(&self) -> RepositoryResult<PgPool> {
        Pool::builder()
            .max_size(self.pool_max)
            .min_idle(Some(self.pool_min))
            .connection_timeout(self.connect_timeout)
            .idle_timeout(Some(self.idle_timeout))
            .test_on_check_out(true)
            .build(ConnectionManager::<PgConnection>::new(&self.database_url))
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("build_pool")
                        .with_details(format!("pool_max {}", self.pool_max)),
                )
            })
    }
}

/// Run `op` on the blocking pool with a pooled connection. Checkout failures
/// and retryable errors are retried according to `policy`.
pub(super) async fn run_blocking<T, F>(
    pool: PgPool,
    policy: RetryPolicy,
    op: F,
) -> RepositoryResult<T>
where
    T: Send + 'static,
    F: Fn(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
{
    task::spawn_blocking(move || {
        let mut delay = policy.initial_delay;
        let mut attempt = 0;
        loop {
            let result = pool
                .get()
                .map_err(RepositoryError::from)
                .and_then(|mut conn| op(&mut conn));

            match result {
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Postgres attempt {} of {} failed, retrying in {:?}: {}",
                        attempt,
                        policy.max_retries + 1,
                        delay,
                        e
                    );
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                other => return other,
            }
        }
    })
    .await
    .map_err(|e| {
        RepositoryError::internal_with_context(
            format!("blocking task failed: {}", e),
            ErrorContext::new("run_blocking"),
        )
    })?
}
