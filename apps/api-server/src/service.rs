//! Write-path orchestration for the two resources.
//!
//! Every mutation runs as begin, validate, execute, read back through the
//! same transaction, commit. Any failure after begin rolls the transaction
//! back before the error is returned, so a client never observes a partial
//! write. Listing reads skip transactions entirely and go to a secondary.

use chrono::Utc;
use domain::validate::{effective_priority, validate_title};
use domain::{
    Activity, CreateActivity, CreateTodo, DomainError, Todo, UpdateActivity, UpdateTodo,
};
use replica_db::repository::{ActivityRepository, TodoRepository};
use replica_db::{DbError, ReplicaDb};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("{entity} with ID {id} Not Found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Db(#[from] DbError),
}

fn todo_not_found(id: i64) -> ServiceError {
    ServiceError::NotFound { entity: "Todo", id }
}

fn activity_not_found(id: i64) -> ServiceError {
    ServiceError::NotFound {
        entity: "Activity",
        id,
    }
}

#[derive(Clone)]
pub struct TodoService {
    db: ReplicaDb,
    repo: TodoRepository,
}

impl TodoService {
    pub fn new(db: ReplicaDb) -> Self {
        let repo = TodoRepository::new(db.clone());
        Self { db, repo }
    }

    pub async fn create(&self, mut data: CreateTodo) -> Result<Todo, ServiceError> {
        let mut tx = self.db.begin().await?;
        if let Err(e) = validate_title(&data.title) {
            tx.rollback().await;
            return Err(e.into());
        }
        data.priority = effective_priority(&data.priority);

        let now = Utc::now();
        let id = match self.repo.create(&mut tx, &data, now).await {
            Ok(id) => id,
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        // Read back through the same transaction so the response reflects
        // column defaults applied by the database.
        let todo = match self.repo.get_one(&mut tx, id).await {
            Ok(Some(todo)) => todo,
            Ok(None) => {
                tx.rollback().await;
                return Err(todo_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(todo)
    }

    pub async fn get_all(&self) -> Result<Vec<Todo>, ServiceError> {
        Ok(self.repo.get_all().await?)
    }

    pub async fn get_one(&self, id: i64) -> Result<Todo, ServiceError> {
        let mut tx = self.db.begin().await?;
        let todo = match self.repo.get_one(&mut tx, id).await {
            Ok(Some(todo)) => todo,
            Ok(None) => {
                tx.rollback().await;
                return Err(todo_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(todo)
    }

    pub async fn update(&self, id: i64, mut data: UpdateTodo) -> Result<Todo, ServiceError> {
        let mut tx = self.db.begin().await?;
        if let Err(e) = validate_title(&data.title) {
            tx.rollback().await;
            return Err(e.into());
        }
        data.priority = effective_priority(&data.priority);

        match self.repo.update(&mut tx, id, &data, Utc::now()).await {
            Ok(0) => {
                tx.rollback().await;
                return Err(todo_not_found(id));
            }
            Ok(_) => {}
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        }
        let todo = match self.repo.get_one(&mut tx, id).await {
            Ok(Some(todo)) => todo,
            Ok(None) => {
                tx.rollback().await;
                return Err(todo_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(todo)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        // Fetch first so a missing id reports Not Found instead of silently
        // deleting nothing.
        match self.repo.get_one(&mut tx, id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tx.rollback().await;
                return Err(todo_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        }
        if let Err(e) = self.repo.delete(&mut tx, id).await {
            tx.rollback().await;
            return Err(e.into());
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ActivityService {
    db: ReplicaDb,
    repo: ActivityRepository,
}

impl ActivityService {
    pub fn new(db: ReplicaDb) -> Self {
        let repo = ActivityRepository::new(db.clone());
        Self { db, repo }
    }

    pub async fn create(&self, data: CreateActivity) -> Result<Activity, ServiceError> {
        let mut tx = self.db.begin().await?;
        if let Err(e) = validate_title(&data.title) {
            tx.rollback().await;
            return Err(e.into());
        }

        let id = match self.repo.create(&mut tx, &data, Utc::now()).await {
            Ok(id) => id,
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        let activity = match self.repo.get_one(&mut tx, id).await {
            Ok(Some(activity)) => activity,
            Ok(None) => {
                tx.rollback().await;
                return Err(activity_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(activity)
    }

    pub async fn get_all(&self) -> Result<Vec<Activity>, ServiceError> {
        Ok(self.repo.get_all().await?)
    }

    pub async fn get_one(&self, id: i64) -> Result<Activity, ServiceError> {
        let mut tx = self.db.begin().await?;
        let activity = match self.repo.get_one(&mut tx, id).await {
            Ok(Some(activity)) => activity,
            Ok(None) => {
                tx.rollback().await;
                return Err(activity_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(activity)
    }

    pub async fn update(&self, id: i64, data: UpdateActivity) -> Result<Activity, ServiceError> {
        let mut tx = self.db.begin().await?;
        if let Err(e) = validate_title(&data.title) {
            tx.rollback().await;
            return Err(e.into());
        }

        match self.repo.update(&mut tx, id, &data, Utc::now()).await {
            Ok(0) => {
                tx.rollback().await;
                return Err(activity_not_found(id));
            }
            Ok(_) => {}
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        }
        let activity = match self.repo.get_one(&mut tx, id).await {
            Ok(Some(activity)) => activity,
            Ok(None) => {
                tx.rollback().await;
                return Err(activity_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok(activity)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        match self.repo.get_one(&mut tx, id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tx.rollback().await;
                return Err(activity_not_found(id));
            }
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        }
        if let Err(e) = self.repo.delete(&mut tx, id).await {
            tx.rollback().await;
            return Err(e.into());
        }
        tx.commit().await?;
        Ok(())
    }
}
