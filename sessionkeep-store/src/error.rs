//! Store error types
//!
//! `BackendError` describes a fault inside one storage medium. It is always
//! returned as a value and recorded in the fan-out outcome, never propagated
//! out of `save`/`load`/`clear`. `StoreError` covers the few operations that
//! report failure to the caller.

use sessionkeep_core::SessionKeepError;
use thiserror::Error;

/// Fault raised by a single backend adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The medium rejected or failed the call
    #[error("I/O failure: {0}")]
    Io(String),

    /// Permanent database fault: bad SQL, missing table, constraint, decode
    #[error("Database error: {0}")]
    Database(String),

    /// Database locked, busy or out of pooled connections
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The medium exists but cannot serve calls right now
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Subject-keyed media need a subject to address
    #[error("No subject available to address the session")]
    MissingSubject,

    #[error("Encoding failed: {0}")]
    Codec(String),
}

impl BackendError {
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable(message.into())
    }

    /// Transient faults are worth retrying against the same medium
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Busy(_) | Self::Timeout { .. })
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes
#[cfg(feature = "sqlite")]
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|code| matches!(code & 0xff, 5 | 6))
        .unwrap_or(false)
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for BackendError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(e) => Self::Io(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::Busy("timed out waiting for a connection".into()),
            sqlx::Error::PoolClosed => Self::Unavailable("connection pool is closed".into()),
            sqlx::Error::Database(db) if db.code().is_some_and(|code| is_busy_code(&code)) => {
                Self::Busy(db.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

/// Error returned to callers of the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Core error: {0}")]
    Core(#[from] SessionKeepError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type SessionResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::io("socket closed").is_transient());
        assert!(BackendError::Timeout {
            operation: "database.save".to_string(),
            timeout_ms: 10
        }
        .is_transient());
        assert!(!BackendError::MissingSubject.is_transient());
        assert!(!BackendError::unavailable("cookie bridge not ready").is_transient());
        assert!(BackendError::Busy("database is locked".into()).is_transient());
        assert!(!BackendError::Database("no such table".into()).is_transient());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlx_errors_classified_by_kind() {
        assert!(BackendError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(BackendError::from(sqlx::Error::Io(std::io::Error::other("reset"))).is_transient());

        for permanent in [
            sqlx::Error::RowNotFound,
            sqlx::Error::ColumnNotFound("record_blob".into()),
            sqlx::Error::Protocol("bad frame".into()),
        ] {
            let error = BackendError::from(permanent);
            assert!(matches!(error, BackendError::Database(_)));
            assert!(!error.is_transient());
        }
        assert!(matches!(
            BackendError::from(sqlx::Error::PoolClosed),
            BackendError::Unavailable(_)
        ));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_busy_codes() {
        for code in ["5", "6", "261", "517", "262"] {
            assert!(is_busy_code(code), "{code}");
        }
        for code in ["1", "19", "2067", "SQLITE_ERROR"] {
            assert!(!is_busy_code(code), "{code}");
        }
    }

    #[test]
    fn test_store_error_display() {
        let error: StoreError =
            sessionkeep_core::validation_error!("must not be empty", "subject_id", "test").into();
        assert_eq!(
            error.to_string(),
            "Core error: Invalid subject_id: must not be empty"
        );

        let error: StoreError = BackendError::MissingSubject.into();
        assert!(error.to_string().contains("No subject"));
    }
}
