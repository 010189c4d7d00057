//! Error types for the persistence layer.
//!
//! All store failures surface as [`StoreError`]. Callers decide whether to
//! retry with [`StoreError::is_transient`].

use citadel_types::ClaimId;

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A claim with this ID already exists.
    #[error("claim already stored: {0}")]
    Duplicate(ClaimId),

    /// No claim with this ID is stored.
    #[error("claim not stored: {0}")]
    NotFound(ClaimId),

    /// The backend is temporarily unable to serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A transient failure persisted through every retry.
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// The operation that was retried.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// The final error's message.
        last_error: String,
    },
}

/// SQLSTATE for a serialization failure.
const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE for a detected deadlock.
const DEADLOCK_DETECTED: &str = "40P01";

impl StoreError {
    /// Whether retrying the same operation might succeed.
    ///
    /// I/O errors, pool timeouts, serialization failures and deadlocks are
    /// transient. Constraint violations, decode errors, and exhausted
    /// retries are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(err) => is_transient_sqlx(err),
            Self::Unavailable(_) => true,
            Self::Migration(_)
            | Self::Corrupt(_)
            | Self::Duplicate(_)
            | Self::NotFound(_)
            | Self::Config(_)
            | Self::RetryExhausted { .. } => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}
