//! Transaction handle bound to the primary replica.

use sqlx::any::{Any, AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::{Query, QueryAs};
use sqlx::FromRow;
use tracing::warn;

use crate::error::DbError;

/// Lifecycle of a [`Transaction`]. Both `Committed` and `RolledBack` are
/// terminal; no transitions are allowed out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// A transaction on the primary, owned exclusively by one caller until it
/// reaches a terminal state.
///
/// Statements issued through the handle observe the transaction's own
/// uncommitted writes, which is what the write path's read-back relies on.
/// Calling [`commit`](Transaction::commit) after a terminal operation returns
/// [`DbError::TransactionClosed`]; [`rollback`](Transaction::rollback) is
/// idempotent and best-effort, logging its own failures instead of
/// propagating them so they never mask the original cause.
pub struct Transaction {
    inner: Option<sqlx::Transaction<'static, Any>>,
    state: TxState,
}

impl Transaction {
    pub(crate) fn new(inner: sqlx::Transaction<'static, Any>) -> Self {
        Self {
            inner: Some(inner),
            state: TxState::Open,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    fn open_inner(&mut self) -> Result<&mut sqlx::Transaction<'static, Any>, DbError> {
        self.inner.as_mut().ok_or(DbError::TransactionClosed)
    }

    /// Execute a mutating statement inside the transaction.
    pub async fn execute<'q>(
        &mut self,
        query: Query<'q, Any, AnyArguments<'q>>,
    ) -> Result<AnyQueryResult, DbError> {
        let tx = self.open_inner()?;
        query.execute(&mut **tx).await.map_err(DbError::Statement)
    }

    /// Fetch all rows through the transaction, observing its uncommitted
    /// writes.
    pub async fn fetch_all<'q, T>(
        &mut self,
        query: QueryAs<'q, Any, T, AnyArguments<'q>>,
    ) -> Result<Vec<T>, DbError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let tx = self.open_inner()?;
        query.fetch_all(&mut **tx).await.map_err(DbError::Statement)
    }

    /// Fetch at most one row through the transaction.
    pub async fn fetch_optional<'q, T>(
        &mut self,
        query: QueryAs<'q, Any, T, AnyArguments<'q>>,
    ) -> Result<Option<T>, DbError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let tx = self.open_inner()?;
        query
            .fetch_optional(&mut **tx)
            .await
            .map_err(DbError::Statement)
    }

    /// Commit the transaction. A failed commit leaves the transaction rolled
    /// back (the driver discards it) and surfaces [`DbError::Commit`].
    pub async fn commit(&mut self) -> Result<(), DbError> {
        match self.inner.take() {
            Some(tx) => match tx.commit().await {
                Ok(()) => {
                    self.state = TxState::Committed;
                    Ok(())
                }
                Err(e) => {
                    self.state = TxState::RolledBack;
                    Err(DbError::Commit(e))
                }
            },
            None => Err(DbError::TransactionClosed),
        }
    }

    /// Roll the transaction back. Safe to call in any state; a rollback
    /// failure is logged and swallowed.
    pub async fn rollback(&mut self) {
        if let Some(tx) = self.inner.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "transaction rollback failed");
            }
            self.state = TxState::RolledBack;
        }
    }
}
