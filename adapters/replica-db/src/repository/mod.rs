//! SQL repositories for the two resources.
//!
//! Repositories take a [`Transaction`](crate::Transaction) for every write
//! and for single-row reads, so the service layer controls atomicity;
//! listing reads go straight to a secondary through the facade.
//!
//! Timestamps are stored as RFC 3339 text, which keeps the schema portable
//! across the drivers the `Any` connection supports.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::ReplicaDb;
use crate::error::DbError;

mod activity;
mod todo;

pub use activity::ActivityRepository;
pub use todo::TodoRepository;

/// Create the tables on the primary if they do not exist yet.
pub async fn ensure_schema(db: &ReplicaDb) -> Result<(), DbError> {
    db.execute(sqlx::query(todo::ENSURE_TODOS)).await?;
    db.execute(sqlx::query(activity::ENSURE_ACTIVITIES)).await?;
    Ok(())
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}
