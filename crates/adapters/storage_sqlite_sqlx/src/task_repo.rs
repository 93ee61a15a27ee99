//! `SQLite` implementation of [`TaskRepository`].
//!
//! The idempotency key is enforced by a partial unique index over
//! `(tenant_id, related_model, related_id, instance_key)` on
//! non-cancelled rows. The upsert inserts with `ON CONFLICT … DO
//! NOTHING` and falls through to a status-guarded update, so a
//! duplicate create detected by the index is resolved as an update and
//! never surfaces to callers.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use taskflow_app::ports::{TaskDraft, TaskRepository, UpsertOutcome};
use taskflow_domain::entity::{EntityModel, EntityRef};
use taskflow_domain::error::TaskflowError;
use taskflow_domain::id::{EntityId, LinkId, TaskId, TenantId, UserId};
use taskflow_domain::task::{Task, TaskPriority, TaskStatus};
use taskflow_domain::time::Timestamp;

use crate::error::StorageError;

struct Wrapper(Task);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Task> {
        value.map(|w| w.0)
    }
}

fn decode<T, E>(result: Result<T, E>) -> Result<T, sqlx::Error>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

fn status_from_str(text: &str) -> Result<TaskStatus, sqlx::Error> {
    match text {
        "open" => Ok(TaskStatus::Open),
        "in_progress" => Ok(TaskStatus::InProgress),
        "blocked" => Ok(TaskStatus::Blocked),
        "done" => Ok(TaskStatus::Done),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(sqlx::Error::Decode(
            format!("unknown task status: {other}").into(),
        )),
    }
}

fn priority_from_str(text: &str) -> Result<TaskPriority, sqlx::Error> {
    match text {
        "low" => Ok(TaskPriority::Low),
        "medium" => Ok(TaskPriority::Medium),
        "high" => Ok(TaskPriority::High),
        "urgent" => Ok(TaskPriority::Urgent),
        other => Err(sqlx::Error::Decode(
            format!("unknown task priority: {other}").into(),
        )),
    }
}

fn timestamp_from_str(text: &str) -> Result<Timestamp, sqlx::Error> {
    decode(chrono::DateTime::parse_from_rfc3339(text)).map(|dt| dt.to_utc())
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let tenant_id: String = row.try_get("tenant_id")?;
        let title: String = row.try_get("title")?;
        let description: Option<String> = row.try_get("description")?;
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let priority: String = row.try_get("priority")?;
        let related_model: String = row.try_get("related_model")?;
        let related_id: String = row.try_get("related_id")?;
        let assigned_to: Option<String> = row.try_get("assigned_to")?;
        let due_at: Option<String> = row.try_get("due_at")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;
        let instance_key: String = row.try_get("instance_key")?;
        let linked_field: Option<String> = row.try_get("linked_field")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self(Task {
            id: decode(TaskId::from_str(&id))?,
            tenant_id: decode(TenantId::from_str(&tenant_id))?,
            title,
            description,
            kind,
            status: status_from_str(&status)?,
            priority: priority_from_str(&priority)?,
            related: EntityRef::new(
                decode(EntityModel::from_str(&related_model))?,
                decode(EntityId::from_str(&related_id))?,
            ),
            assigned_to: assigned_to
                .map(|value| decode(UserId::from_str(&value)))
                .transpose()?,
            due_at: due_at
                .map(|value| timestamp_from_str(&value))
                .transpose()?,
            completed_at: completed_at
                .map(|value| timestamp_from_str(&value))
                .transpose()?,
            instance_key,
            linked_field: linked_field
                .map(|value| decode(LinkId::from_str(&value)))
                .transpose()?,
            created_at: timestamp_from_str(&created_at)?,
            updated_at: timestamp_from_str(&updated_at)?,
        }))
    }
}

/// `SQLite`-backed task repository.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_new(&self, task: &Task) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT INTO tasks (id, tenant_id, title, description, kind, status, priority, \
             related_model, related_id, assigned_to, due_at, completed_at, instance_key, \
             linked_field, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (tenant_id, related_model, related_id, instance_key) \
             WHERE status != 'cancelled' DO NOTHING",
        )
        .bind(task.id.to_string())
        .bind(task.tenant_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.kind)
        .bind(task.status.to_string())
        .bind(task.priority.to_string())
        .bind(task.related.model.to_string())
        .bind(task.related.entity_id.to_string())
        .bind(task.assigned_to.map(|id| id.to_string()))
        .bind(task.due_at.map(|ts| ts.to_rfc3339()))
        .bind(task.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(&task.instance_key)
        .bind(task.linked_field.map(|id| id.to_string()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_by_key(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        instance_key: &str,
    ) -> Result<Option<Task>, StorageError> {
        let row: Option<Wrapper> = sqlx::query_as(
            "SELECT * FROM tasks WHERE tenant_id = ? AND related_model = ? AND related_id = ? \
             AND instance_key = ? AND status != 'cancelled'",
        )
        .bind(tenant_id.to_string())
        .bind(related.model.to_string())
        .bind(related.entity_id.to_string())
        .bind(instance_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(Wrapper::maybe(row))
    }
}

impl TaskRepository for SqliteTaskRepository {
    async fn upsert(
        &self,
        draft: TaskDraft,
        reschedule: bool,
    ) -> Result<UpsertOutcome, TaskflowError> {
        let task = draft.into_task()?;
        if self.insert_new(&task).await.map_err(StorageError::from)? {
            return Ok(UpsertOutcome::Created(task));
        }

        // The unique index absorbed a duplicate create; resolve it as an
        // update against the surviving row.
        if reschedule {
            let now = taskflow_domain::time::now();
            let updated = sqlx::query(
                "UPDATE tasks SET due_at = ?, updated_at = ? \
                 WHERE tenant_id = ? AND related_model = ? AND related_id = ? \
                 AND instance_key = ? \
                 AND status IN ('open', 'in_progress', 'blocked') \
                 AND due_at IS NOT ?",
            )
            .bind(task.due_at.map(|ts| ts.to_rfc3339()))
            .bind(now.to_rfc3339())
            .bind(task.tenant_id.to_string())
            .bind(task.related.model.to_string())
            .bind(task.related.entity_id.to_string())
            .bind(&task.instance_key)
            .bind(task.due_at.map(|ts| ts.to_rfc3339()))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

            if updated.rows_affected() == 1 {
                let stored = self
                    .fetch_by_key(task.tenant_id, task.related, &task.instance_key)
                    .await
                    .map_err(StorageError::from)?
                    .ok_or_else(|| StorageError::Database(sqlx::Error::RowNotFound))?;
                return Ok(UpsertOutcome::Rescheduled(stored));
            }
        }

        match self
            .fetch_by_key(task.tenant_id, task.related, &task.instance_key)
            .await
            .map_err(StorageError::from)?
        {
            Some(stored) => Ok(UpsertOutcome::Unchanged(stored)),
            // The conflicting row was cancelled in between; retry the
            // insert once.
            None => {
                if self.insert_new(&task).await.map_err(StorageError::from)? {
                    Ok(UpsertOutcome::Created(task))
                } else {
                    Err(StorageError::Database(sqlx::Error::RowNotFound).into())
                }
            }
        }
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, TaskflowError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn update(&self, task: Task) -> Result<Task, TaskflowError> {
        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, kind = ?, status = ?, priority = ?, \
             assigned_to = ?, due_at = ?, completed_at = ?, linked_field = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.kind)
        .bind(task.status.to_string())
        .bind(task.priority.to_string())
        .bind(task.assigned_to.map(|id| id.to_string()))
        .bind(task.due_at.map(|ts| ts.to_rfc3339()))
        .bind(task.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(task.linked_field.map(|id| id.to_string()))
        .bind(task.updated_at.to_rfc3339())
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(task)
    }

    async fn find_by_instance_key(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        instance_key: &str,
    ) -> Result<Option<Task>, TaskflowError> {
        Ok(self
            .fetch_by_key(tenant_id, related, instance_key)
            .await
            .map_err(StorageError::from)?)
    }

    async fn find_open_by_link(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        link: LinkId,
    ) -> Result<Vec<Task>, TaskflowError> {
        let rows: Vec<Wrapper> = sqlx::query_as(
            "SELECT * FROM tasks WHERE tenant_id = ? AND related_model = ? AND related_id = ? \
             AND linked_field = ? AND status IN ('open', 'in_progress', 'blocked') \
             ORDER BY created_at",
        )
        .bind(tenant_id.to_string())
        .bind(related.model.to_string())
        .bind(related.entity_id.to_string())
        .bind(link.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
