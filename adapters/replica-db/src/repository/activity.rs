//! Repository for activity groups.

use chrono::{DateTime, Utc};
use domain::{Activity, CreateActivity, UpdateActivity};
use sqlx::any::{Any, AnyRow};
use sqlx::{FromRow, Row};

use super::{format_ts, parse_ts};
use crate::db::ReplicaDb;
use crate::error::DbError;
use crate::tx::Transaction;

pub(super) const ENSURE_ACTIVITIES: &str = "\
CREATE TABLE IF NOT EXISTS activities (
    activity_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    email TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

const CREATE_ACTIVITY: &str = "\
INSERT INTO activities (title, email, updated_at, created_at) VALUES (?, ?, ?, ?)";

const GET_ALL_ACTIVITY: &str = "\
SELECT activity_id AS id, title, email, updated_at, created_at FROM activities";

const GET_ONE_ACTIVITY: &str = "\
SELECT activity_id AS id, title, email, updated_at, created_at
FROM activities
WHERE activity_id = ?";

const UPDATE_ACTIVITY: &str = "\
UPDATE activities SET title = ?, updated_at = ? WHERE activity_id = ?";

const DELETE_ACTIVITY: &str = "DELETE FROM activities WHERE activity_id = ?";

struct ActivityRow {
    id: i64,
    title: String,
    email: String,
    updated_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for ActivityRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let updated_at: String = row.try_get("updated_at")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            email: row.try_get("email")?,
            updated_at: parse_ts("updated_at", &updated_at)?,
            created_at: parse_ts("created_at", &created_at)?,
        })
    }
}

impl ActivityRow {
    fn into_activity(self) -> Activity {
        Activity {
            id: self.id,
            title: self.title,
            email: self.email,
            updated_at: self.updated_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct ActivityRepository {
    db: ReplicaDb,
}

impl ActivityRepository {
    pub fn new(db: ReplicaDb) -> Self {
        Self { db }
    }

    /// Insert an activity group inside the caller's transaction and return
    /// the generated id.
    pub async fn create(
        &self,
        tx: &mut Transaction,
        data: &CreateActivity,
        now: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let ts = format_ts(now);
        let result = tx
            .execute(
                sqlx::query(CREATE_ACTIVITY)
                    .bind(data.title.clone())
                    .bind(data.email.clone())
                    .bind(ts.clone())
                    .bind(ts),
            )
            .await?;
        result
            .last_insert_id()
            .ok_or(DbError::Statement(sqlx::Error::RowNotFound))
    }

    /// List every activity group from a router-selected secondary.
    pub async fn get_all(&self) -> Result<Vec<Activity>, DbError> {
        let rows: Vec<ActivityRow> = self
            .db
            .fetch_all(sqlx::query_as::<Any, ActivityRow>(GET_ALL_ACTIVITY))
            .await?;
        Ok(rows.into_iter().map(ActivityRow::into_activity).collect())
    }

    /// Fetch one activity group by id through the caller's transaction.
    pub async fn get_one(
        &self,
        tx: &mut Transaction,
        id: i64,
    ) -> Result<Option<Activity>, DbError> {
        let row: Option<ActivityRow> = tx
            .fetch_optional(sqlx::query_as::<Any, ActivityRow>(GET_ONE_ACTIVITY).bind(id))
            .await?;
        Ok(row.map(ActivityRow::into_activity))
    }

    /// Update an activity group's title; returns the number of affected
    /// rows.
    pub async fn update(
        &self,
        tx: &mut Transaction,
        id: i64,
        data: &UpdateActivity,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let result = tx
            .execute(
                sqlx::query(UPDATE_ACTIVITY)
                    .bind(data.title.clone())
                    .bind(format_ts(now))
                    .bind(id),
            )
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, tx: &mut Transaction, id: i64) -> Result<(), DbError> {
        tx.execute(sqlx::query(DELETE_ACTIVITY).bind(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ensure_schema;
    use crate::test_util::sqlite_config;

    #[tokio::test]
    async fn crud_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ReplicaDb::open(&sqlite_config(&dir, 1)).await.expect("open");
        ensure_schema(&db).await.expect("schema");
        let repo = ActivityRepository::new(db.clone());

        let data = CreateActivity {
            title: "Groceries".into(),
            email: "user@example.com".into(),
        };
        let mut tx = db.begin().await.expect("begin");
        let id = repo.create(&mut tx, &data, Utc::now()).await.expect("create");
        tx.commit().await.expect("commit");

        let all = repo.get_all().await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Groceries");
        assert_eq!(all[0].email, "user@example.com");

        let mut tx = db.begin().await.expect("begin");
        let affected = repo
            .update(&mut tx, id, &UpdateActivity { title: "Errands".into() }, Utc::now())
            .await
            .expect("update");
        assert_eq!(affected, 1);
        repo.delete(&mut tx, id).await.expect("delete");
        assert!(repo.get_one(&mut tx, id).await.expect("get").is_none());
        tx.commit().await.expect("commit");
    }
}
