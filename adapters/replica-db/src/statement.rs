//! Per-query prepared statement sets, one member statement per replica.

use std::sync::Arc;

use sqlx::any::AnyStatement;
use sqlx::AnyPool;

use crate::db::ReplicaDb;

/// A statement prepared on every physical replica.
///
/// Created by [`ReplicaDb::prepare`], which fans the prepare out to all
/// replicas and fails as a whole if any replica rejects the query. Execution
/// picks a logical target; the member statement and pool belonging to that
/// replica are handed back together so the statement always runs where it
/// was prepared. Dropping the set releases the statements.
pub struct PreparedSet {
    db: ReplicaDb,
    sql: Arc<str>,
    statements: Vec<AnyStatement<'static>>,
}

impl std::fmt::Debug for PreparedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedSet")
            .field("db", &self.db)
            .field("sql", &self.sql)
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// One replica's member statement paired with that replica's pool.
pub struct PreparedTarget<'a> {
    pub statement: &'a AnyStatement<'static>,
    pub pool: AnyPool,
}

impl PreparedSet {
    pub(crate) fn new(
        db: ReplicaDb,
        sql: Arc<str>,
        statements: Vec<AnyStatement<'static>>,
    ) -> Self {
        Self { db, sql, statements }
    }

    /// The SQL text this set was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of member statements (equals the replica count at prepare
    /// time).
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The primary's member statement, for writes.
    pub fn on_primary(&self) -> PreparedTarget<'_> {
        self.target(0)
    }

    /// A round-robin-selected secondary's member statement, for reads.
    pub fn on_secondary(&self) -> PreparedTarget<'_> {
        self.target(self.db.secondary_index())
    }

    fn target(&self, idx: usize) -> PreparedTarget<'_> {
        PreparedTarget {
            statement: &self.statements[idx],
            pool: self.db.pool_at(idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ReplicaDb;
    use crate::test_util::sqlite_config;
    use sqlx::{Row, Statement};

    #[tokio::test]
    async fn prepares_one_member_statement_per_replica() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 3)).await.expect("open");
        db.execute(sqlx::query(
            "CREATE TABLE kv (k TEXT NOT NULL, v INTEGER NOT NULL)",
        ))
        .await
        .expect("create table");

        let set = db.prepare("SELECT v FROM kv WHERE k = ?").await.expect("prepare");
        assert_eq!(set.len(), 3);
        assert_eq!(set.sql(), "SELECT v FROM kv WHERE k = ?");
    }

    #[tokio::test]
    async fn prepare_fails_as_a_whole_on_bad_sql() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 2)).await.expect("open");

        let err = db
            .prepare("SELECT nope FROM missing_table")
            .await
            .expect_err("prepare must fail on every replica");
        assert!(matches!(err, crate::DbError::Statement(_)));
    }

    #[tokio::test]
    async fn dispatch_routes_writes_to_primary_and_reads_round_robin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 3)).await.expect("open");
        db.execute(sqlx::query(
            "CREATE TABLE kv (k TEXT NOT NULL, v INTEGER NOT NULL)",
        ))
        .await
        .expect("create table");

        let insert = db.prepare("INSERT INTO kv (k, v) VALUES (?, ?)").await.expect("prepare");
        let write = insert.on_primary();
        write
            .statement
            .query()
            .bind("a")
            .bind(7_i64)
            .execute(&write.pool)
            .await
            .expect("insert via prepared statement");

        let select = db.prepare("SELECT v FROM kv WHERE k = ?").await.expect("prepare");
        for _ in 0..4 {
            let read = select.on_secondary();
            let row = read
                .statement
                .query()
                .bind("a")
                .fetch_one(&read.pool)
                .await
                .expect("select via prepared statement");
            let v: i64 = row.try_get("v").expect("decode v");
            assert_eq!(v, 7);
        }
    }
}
