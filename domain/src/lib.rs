//! Domain library for the todolist API.
//!
//! This crate holds the resource types, request objects, and domain error
//! definitions shared by the repository and service layers. Keep database and
//! HTTP concerns out of this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Priority applied when a todo is created or updated without one.
pub const DEFAULT_PRIORITY: &str = "very-high";

/// A todo item belonging to an activity group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub activity_group_id: i64,
    pub is_active: bool,
    pub priority: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// An activity group that todos are organized under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub id: i64,
    pub title: String,
    pub email: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Input data for creating a todo.
///
/// An empty `priority` means "use [`DEFAULT_PRIORITY`]".
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateTodo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub activity_group_id: i64,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub priority: String,
}

/// Input data for updating a todo.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateTodo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub priority: String,
}

/// Input data for creating an activity group.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateActivity {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub email: String,
}

/// Input data for updating an activity group.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateActivity {
    #[serde(default)]
    pub title: String,
}

/// Domain precondition failures. These never reach the database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("title cannot be null")]
    TitleRequired,
}

pub mod validate;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn todo_serializes_with_camel_case_timestamps() {
        let t = Todo {
            id: 1,
            title: "Buy milk".into(),
            activity_group_id: 2,
            is_active: true,
            priority: DEFAULT_PRIORITY.into(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let v = serde_json::to_value(&t).expect("serialize");
        assert_eq!(v["title"], "Buy milk");
        assert_eq!(v["priority"], "very-high");
        assert!(v.get("createdAt").is_some());
        assert!(v.get("updatedAt").is_some());
        assert!(v.get("created_at").is_none());
    }

    #[test]
    fn create_todo_fields_default_when_absent() {
        let req: CreateTodo = serde_json::from_str(r#"{"title":"x"}"#).expect("deserialize");
        assert_eq!(req.title, "x");
        assert_eq!(req.activity_group_id, 0);
        assert!(!req.is_active);
        assert!(req.priority.is_empty());
    }
}
