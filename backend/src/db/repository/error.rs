//! Error types for repository operations.
//!
//! Every variant carries an [`ErrorContext`] naming the operation and entity
//! involved, so a failed ingestion or forecast write can be traced without
//! parsing the message.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a repository error happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Repository operation, e.g. `ingest_snapshots`.
    pub operation: Option<String>,
    /// Entity kind, e.g. `hospital`, `snapshot`, `forecast`.
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<String>,
    /// Set for transient storage faults.
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    fn is_empty(&self) -> bool {
        self.operation.is_none()
            && self.entity.is_none()
            && self.details.is_none()
            && !self.retryable
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        let mut sep = "";
        if let Some(op) = &self.operation {
            write!(f, "in {}", op)?;
            sep = "; ";
        }
        match (&self.entity, &self.entity_id) {
            (Some(entity), Some(id)) => write!(f, "{}{} {}", sep, entity, id)?,
            (Some(entity), None) => write!(f, "{}{}", sep, entity)?,
            _ => {}
        }
        if self.entity.is_some() {
            sep = "; ";
        }
        if let Some(details) = &self.details {
            write!(f, "{}{}", sep, details)?;
            sep = "; ";
        }
        if self.retryable {
            write!(f, "{}retryable", sep)?;
        }
        f.write_str(")")
    }
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Pool or connection failure. Transient.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    #[error("Query error: {message} {context}")]
    QueryError {
        message: String,
        context: ErrorContext,
    },

    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Input rejected before anything was written.
    #[error("Validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },

    /// Stored data that no longer decodes, or a broken internal invariant.
    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },
}

macro_rules! constructors {
    ($($variant:ident => $plain:ident, $with:ident;)*) => {
        $(
            pub fn $plain(message: impl Into<String>) -> Self {
                Self::$with(message, ErrorContext::default())
            }

            pub fn $with(message: impl Into<String>, context: ErrorContext) -> Self {
                Self::$variant {
                    message: message.into(),
                    context,
                }
            }
        )*
    };
}

impl RepositoryError {
    constructors! {
        QueryError => query, query_with_context;
        NotFound => not_found, not_found_with_context;
        ValidationError => validation, validation_with_context;
        ConfigurationError => configuration, configuration_with_context;
        InternalError => internal, internal_with_context;
    }

    /// Connection errors are always retryable.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::connection_with_context(message, ErrorContext::default())
    }

    pub fn connection_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::ConnectionError {
            message: message.into(),
            context: context.retryable(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError { .. })
    }

    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::NotFound { context, .. }
            | Self::ValidationError { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. } => context,
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => RepositoryError::not_found("no matching row"),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info)
            | Error::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                RepositoryError::validation_with_context(
                    info.message().to_string(),
                    ErrorContext::default().with_details(format!(
                        "constraint {}",
                        info.constraint_name().unwrap_or("unknown")
                    )),
                )
            }
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                RepositoryError::not_found_with_context(
                    info.message().to_string(),
                    ErrorContext::default().with_details(format!(
                        "constraint {}",
                        info.constraint_name().unwrap_or("unknown")
                    )),
                )
            }
            Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                RepositoryError::connection(info.message().to_string())
            }
            Error::DatabaseError(kind, info) => {
                let context = ErrorContext::default().with_details(format!("{:?}", kind));
                let context = if matches!(kind, DatabaseErrorKind::SerializationFailure) {
                    context.retryable()
                } else {
                    context
                };
                RepositoryError::query_with_context(info.message().to_string(), context)
            }
            Error::DeserializationError(e) => RepositoryError::internal(e.to_string()),
            other => RepositoryError::query(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::r2d2::PoolError> for RepositoryError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        RepositoryError::connection_with_context(
            err.to_string(),
            ErrorContext::new("checkout").with_details("connection pool"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext::new("ingest_snapshots")
            .with_entity("snapshot")
            .with_entity_id(42)
            .with_details("negative occupied_stretchers");
        assert_eq!(
            ctx.to_string(),
            "(in ingest_snapshots; snapshot 42; negative occupied_stretchers)"
        );
        assert_eq!(ErrorContext::default().to_string(), "");
    }

    #[test]
    fn test_retryable_classification() {
        let err = RepositoryError::connection("pool exhausted");
        assert!(err.is_retryable());
        assert!(err.to_string().ends_with("(retryable)"));
        assert!(!RepositoryError::validation("bad row").is_retryable());
        assert!(RepositoryError::validation("bad row").is_validation());
        assert!(!RepositoryError::not_found("gone").is_validation());
    }

    #[test]
    fn test_context_is_exposed() {
        let err = RepositoryError::not_found_with_context(
            "no such forecast",
            ErrorContext::new("insert_forecast_error")
                .with_entity("forecast")
                .with_entity_id(7),
        );
        assert_eq!(err.context().entity_id.as_deref(), Some("7"));
        assert!(err.to_string().contains("forecast 7"));
    }
}
