//! Error types for store operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for store/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/foreign-key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// SQL protocol/driver error.
    Protocol,
    /// Unclassified database failure.
    Other,
}

impl StoreDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StoreDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> StoreDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return StoreDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_foreign_key_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return StoreDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("database is busy")
    {
        return StoreDbErrorKind::BusyOrLocked;
    }

    StoreDbErrorKind::Other
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        kind: StoreDbErrorKind,
        message: String,
    },

    /// A batch persist failed and was rolled back; nothing from the batch was stored.
    #[error(
        "persist rolled back ({kind}): {message}\n  Suggestion: No records from this run were stored; rerun to retry the batch"
    )]
    PersistenceConflict {
        kind: StoreDbErrorKind,
        message: String,
    },

    /// No record exists with the given identity.
    #[error("record not found: '{0}'")]
    NotFound(String),

    /// A stored row could not be turned back into a record.
    #[error("stored record '{identity}' is invalid: {reason}")]
    InvalidRow { identity: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: StoreDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Wraps a failure inside a batch transaction.
    #[must_use]
    pub fn conflict(err: &sqlx::Error) -> Self {
        Self::PersistenceConflict {
            kind: StoreDbErrorKind::from_sqlx(err),
            message: err.to_string(),
        }
    }

    /// Returns the typed database error kind, when one is known.
    #[must_use]
    pub fn database_kind(&self) -> Option<StoreDbErrorKind> {
        match self {
            Self::Database { kind, .. } | Self::PersistenceConflict { kind, .. } => Some(*kind),
            Self::NotFound(_) | Self::InvalidRow { .. } => None,
        }
    }

    /// Returns true when a batch persist was rolled back.
    #[must_use]
    pub fn is_persistence_conflict(&self) -> bool {
        matches!(self, Self::PersistenceConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_database_message() {
        let err = StoreError::Database {
            kind: StoreDbErrorKind::Other,
            message: "connection failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("database error"));
        assert!(msg.contains("other"));
        assert!(msg.contains("connection failed"));
        assert!(!err.is_persistence_conflict());
    }

    #[test]
    fn test_store_error_conflict_from_row_not_found() {
        let err = StoreError::conflict(&sqlx::Error::RowNotFound);
        assert!(err.is_persistence_conflict());
        assert_eq!(err.database_kind(), Some(StoreDbErrorKind::RowNotFound));
        assert!(err.to_string().contains("rolled back"));
    }

    #[test]
    fn test_store_error_busy_kind() {
        let err = StoreError::Database {
            kind: StoreDbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        assert_eq!(err.database_kind(), Some(StoreDbErrorKind::BusyOrLocked));
    }

    #[test]
    fn test_store_error_not_found_message() {
        let err = StoreError::NotFound("attention is all you need".to_string());
        assert!(err.to_string().contains("attention is all you need"));
        assert_eq!(err.database_kind(), None);
    }

    #[test]
    fn test_from_sqlx_pool_kinds() {
        assert_eq!(
            StoreDbErrorKind::from_sqlx(&sqlx::Error::PoolTimedOut),
            StoreDbErrorKind::PoolTimeout
        );
        assert_eq!(
            StoreDbErrorKind::from_sqlx(&sqlx::Error::PoolClosed),
            StoreDbErrorKind::PoolClosed
        );
    }
}
