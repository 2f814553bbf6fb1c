//! Error types for the xavyo-db crate.
//!
//! Wraps `SQLx` errors with enough context for callers to tell an outage from
//! a conflicting write.

use thiserror::Error;

/// Database operation errors.
///
/// ```rust
/// use xavyo_db::DbError;
///
/// fn describe(err: &DbError) -> &'static str {
///     match err {
///         DbError::ConnectionFailed(_) => "database unreachable",
///         DbError::MigrationFailed(_) => "schema out of date",
///         DbError::QueryFailed(_) => "query failed",
///         DbError::UniqueViolation(_) => "duplicate",
///         DbError::NotFound(_) => "missing",
///         DbError::ValidationFailed(_) => "rejected",
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A unique constraint rejected the write; carries the constraint name.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation failed.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl DbError {
    /// Classify a query error, lifting unique-constraint violations out of
    /// the generic bucket.
    #[must_use]
    pub fn from_query(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return DbError::UniqueViolation(constraint);
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::ConnectionFailed(err)
            }
            other => DbError::QueryFailed(other),
        }
    }

    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// Check if this error is a unique-constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation(_))
    }

    /// Check if this error indicates a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from_query(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_query_error() {
        let err = DbError::from_query(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::QueryFailed(_)));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_display_not_found() {
        let err = DbError::NotFound("relying party urn:acme:app".to_string());
        assert_eq!(err.to_string(), "Not found: relying party urn:acme:app");
        assert!(err.is_not_found());
    }
}
