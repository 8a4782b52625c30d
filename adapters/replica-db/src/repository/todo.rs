//! Repository for todo items.

use chrono::{DateTime, Utc};
use domain::{CreateTodo, Todo, UpdateTodo};
use sqlx::any::{Any, AnyRow};
use sqlx::{FromRow, Row};

use super::{format_ts, parse_ts};
use crate::db::ReplicaDb;
use crate::error::DbError;
use crate::tx::Transaction;

pub(super) const ENSURE_TODOS: &str = "\
CREATE TABLE IF NOT EXISTS todos (
    todo_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    activity_group_id INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    priority TEXT NOT NULL DEFAULT 'very-high',
    updated_at TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

const CREATE_TODO: &str = "\
INSERT INTO todos (title, activity_group_id, is_active, priority, updated_at, created_at)
VALUES (?, ?, ?, ?, ?, ?)";

const GET_ALL_TODO: &str = "\
SELECT todo_id AS id, title, activity_group_id, is_active, priority, updated_at, created_at
FROM todos";

const GET_ONE_TODO: &str = "\
SELECT todo_id AS id, title, activity_group_id, is_active, priority, updated_at, created_at
FROM todos
WHERE todo_id = ?";

const UPDATE_TODO: &str = "\
UPDATE todos SET title = ?, is_active = ?, priority = ?, updated_at = ? WHERE todo_id = ?";

const DELETE_TODO: &str = "DELETE FROM todos WHERE todo_id = ?";

struct TodoRow {
    id: i64,
    title: String,
    activity_group_id: i64,
    is_active: i64,
    priority: String,
    updated_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for TodoRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let updated_at: String = row.try_get("updated_at")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            activity_group_id: row.try_get("activity_group_id")?,
            is_active: row.try_get("is_active")?,
            priority: row.try_get("priority")?,
            updated_at: parse_ts("updated_at", &updated_at)?,
            created_at: parse_ts("created_at", &created_at)?,
        })
    }
}

impl TodoRow {
    fn into_todo(self) -> Todo {
        Todo {
            id: self.id,
            title: self.title,
            activity_group_id: self.activity_group_id,
            is_active: self.is_active != 0,
            priority: self.priority,
            updated_at: self.updated_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct TodoRepository {
    db: ReplicaDb,
}

impl TodoRepository {
    pub fn new(db: ReplicaDb) -> Self {
        Self { db }
    }

    /// Insert a todo inside the caller's transaction and return the
    /// generated id. `data.priority` must already be resolved.
    pub async fn create(
        &self,
        tx: &mut Transaction,
        data: &CreateTodo,
        now: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let ts = format_ts(now);
        let result = tx
            .execute(
                sqlx::query(CREATE_TODO)
                    .bind(data.title.clone())
                    .bind(data.activity_group_id)
                    .bind(i64::from(data.is_active))
                    .bind(data.priority.clone())
                    .bind(ts.clone())
                    .bind(ts),
            )
            .await?;
        result
            .last_insert_id()
            .ok_or(DbError::Statement(sqlx::Error::RowNotFound))
    }

    /// List every todo from a router-selected secondary. No transaction.
    pub async fn get_all(&self) -> Result<Vec<Todo>, DbError> {
        let rows: Vec<TodoRow> = self
            .db
            .fetch_all(sqlx::query_as::<Any, TodoRow>(GET_ALL_TODO))
            .await?;
        Ok(rows.into_iter().map(TodoRow::into_todo).collect())
    }

    /// Fetch one todo by id through the caller's transaction.
    pub async fn get_one(&self, tx: &mut Transaction, id: i64) -> Result<Option<Todo>, DbError> {
        let row: Option<TodoRow> = tx
            .fetch_optional(sqlx::query_as::<Any, TodoRow>(GET_ONE_TODO).bind(id))
            .await?;
        Ok(row.map(TodoRow::into_todo))
    }

    /// Update a todo; returns the number of affected rows.
    pub async fn update(
        &self,
        tx: &mut Transaction,
        id: i64,
        data: &UpdateTodo,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let result = tx
            .execute(
                sqlx::query(UPDATE_TODO)
                    .bind(data.title.clone())
                    .bind(i64::from(data.is_active))
                    .bind(data.priority.clone())
                    .bind(format_ts(now))
                    .bind(id),
            )
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, tx: &mut Transaction, id: i64) -> Result<(), DbError> {
        tx.execute(sqlx::query(DELETE_TODO).bind(id)).await?;
        Ok(())
    }
}
