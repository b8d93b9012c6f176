use sqlx::error::ErrorKind;

/// Errors from the persistence gateway.
///
/// `Configuration`, `Io`, `Connection` and `SchemaInitialization` are raised
/// while the handle is being opened and initialized; the process must not
/// serve traffic after any of them. `QueryFailed` and `Column` are per-call
/// failures returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("invalid database configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot reach database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("schema initialization failed on `{object}`: {source}")]
    SchemaInitialization {
        object: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("query failed: {message}")]
    QueryFailed {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("column `{column}`: {reason}")]
    Column { column: String, reason: String },
}

impl DbError {
    pub(crate) fn query(message: impl Into<String>) -> Self {
        DbError::QueryFailed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn column(column: &str, reason: impl Into<String>) -> Self {
        DbError::Column {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the statement was rejected by a UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        self.database_error_kind() == Some(ErrorKind::UniqueViolation)
    }

    /// True when the statement was rejected by a FOREIGN KEY constraint.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.database_error_kind() == Some(ErrorKind::ForeignKeyViolation)
    }

    fn database_error_kind(&self) -> Option<ErrorKind> {
        match self {
            DbError::QueryFailed {
                source: Some(err), ..
            } => err.as_database_error().map(|e| e.kind()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Connection(err),
            other => DbError::QueryFailed {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_loss_is_not_a_query_failure() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Connection(_)));
    }

    #[test]
    fn test_driver_message_is_kept() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        match err {
            DbError::QueryFailed { message, source } => {
                assert_eq!(message, sqlx::Error::RowNotFound.to_string());
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_adapter_errors_have_no_constraint_kind() {
        let err = DbError::query("2 placeholders but 1 parameter");
        assert!(!err.is_unique_violation());
        assert!(!err.is_foreign_key_violation());
    }
}
