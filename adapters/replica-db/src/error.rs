//! Error taxonomy for the replicated database layer.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by [`crate::ReplicaDb`] and its transactions.
///
/// Configuration problems are fatal at startup and never retried. Connection
/// and statement failures wrap the underlying driver error verbatim so they
/// carry enough context to log. Fan-out operations aggregate without
/// per-replica attribution: callers learn that at least one replica failed,
/// not which one.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database configuration: {0}")]
    Configuration(String),

    #[error("failed to open replica connection: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Failed To Begin Transaction")]
    TransactionBegin(#[source] sqlx::Error),

    /// A terminal transaction (committed or rolled back) was used again.
    #[error("transaction is already closed")]
    TransactionClosed,

    #[error("statement failed: {0}")]
    Statement(#[source] sqlx::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A scatter worker terminated without reporting a result.
    #[error("concurrent task aborted before completion")]
    TaskAborted,
}

impl DbError {
    /// True for errors that indicate a bad configuration rather than a
    /// runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DbError::Configuration(_))
    }
}
